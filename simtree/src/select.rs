//! Selection Controller: selected-flag transitions, deletions and
//! user-authored nodes, each checked against the selected-path invariants.

use tracing::{info, instrument};

use crate::core::invariants::validate_tree;
use crate::core::selection::{check_select, created_after, descendants, trim_cutoff};
use crate::error::{EngineError, EngineResult, ResultExt};
use crate::io::store::{BatchTarget, NodeStore};
use crate::reader::{require_node, require_tree};
use crate::tree::{NewNode, Node, NodeId, ParentRef, TreeId};

/// Mark a node selected.
///
/// Fails with `Validation` when its parent is unselected or a sibling is
/// already selected. Never unselects anything.
#[instrument(skip(store))]
pub fn select<S: NodeStore + ?Sized>(store: &S, node_id: NodeId) -> EngineResult<Node> {
    let node = require_node(store, node_id)?;
    let (parent, siblings) = match node.parent_id {
        Some(parent_id) => (
            store.node(parent_id).or_storage()?,
            store.children_of(parent_id).or_storage()?,
        ),
        None => {
            let roots = store
                .nodes_in_tree(node.tree_id)
                .or_storage()?
                .into_iter()
                .filter(Node::is_root)
                .collect();
            (None, roots)
        }
    };
    check_select(&node, parent.as_ref(), &siblings).map_err(EngineError::validation)?;
    store.set_selected(node_id, true).or_storage()
}

/// Delete everything in the node's tree created after its newest direct
/// child (or after the node itself when it has none). Returns the count.
#[instrument(skip(store))]
pub fn trim_after_children<S: NodeStore + ?Sized>(store: &S, node_id: NodeId) -> EngineResult<usize> {
    let target = require_node(store, node_id)?;
    let children = store.children_of(node_id).or_storage()?;
    let cutoff = trim_cutoff(&target, &children);
    let nodes = store.nodes_in_tree(target.tree_id).or_storage()?;
    let doomed = created_after(&nodes, cutoff);
    if doomed.is_empty() {
        return Ok(0);
    }
    let deleted = store.delete_nodes(&doomed).or_storage()?;
    info!(tree_id = target.tree_id, cutoff, deleted, "trimmed tree");
    Ok(deleted)
}

/// Delete every descendant of a node, keeping the node. Returns the count.
#[instrument(skip(store))]
pub fn prune_children<S: NodeStore + ?Sized>(store: &S, node_id: NodeId) -> EngineResult<usize> {
    let target = require_node(store, node_id)?;
    let nodes = store.nodes_in_tree(target.tree_id).or_storage()?;
    let doomed = descendants(&nodes, node_id);
    if doomed.is_empty() {
        return Ok(0);
    }
    let deleted = store.delete_nodes(&doomed).or_storage()?;
    info!(tree_id = target.tree_id, deleted, "pruned subtree");
    Ok(deleted)
}

/// Add a single user-authored node, always selected.
///
/// With `parent: None` the node becomes the root of an empty tree.
#[instrument(skip(store, content, role))]
pub fn create_custom_node<S: NodeStore + ?Sized>(
    store: &S,
    tree_id: TreeId,
    parent: Option<NodeId>,
    content: &str,
    role: &str,
) -> EngineResult<Node> {
    require_tree(store, tree_id)?;
    if content.trim().is_empty() {
        return Err(EngineError::validation("message content must not be empty"));
    }
    if role.trim().is_empty() {
        return Err(EngineError::validation("message role must not be empty"));
    }

    let parent_ref = match parent {
        Some(parent_id) => {
            let parent = require_node(store, parent_id)?;
            if parent.tree_id != tree_id {
                return Err(EngineError::validation(format!(
                    "message {parent_id} belongs to tree {}, not tree {tree_id}",
                    parent.tree_id
                )));
            }
            if !parent.selected {
                return Err(EngineError::validation(format!(
                    "cannot add a selected message under unselected message {parent_id}"
                )));
            }
            let siblings = store.children_of(parent_id).or_storage()?;
            if let Some(sibling) = siblings.iter().find(|s| s.selected) {
                return Err(EngineError::validation(format!(
                    "message {parent_id} already has selected child {}",
                    sibling.id
                )));
            }
            ParentRef::Node(parent_id)
        }
        None => {
            let nodes = store.nodes_in_tree(tree_id).or_storage()?;
            if let Some(root) = nodes.iter().find(|n| n.is_root()) {
                return Err(EngineError::validation(format!(
                    "tree {tree_id} already has root {}",
                    root.id
                )));
            }
            ParentRef::Root
        }
    };

    let inserted = store
        .insert_nodes(
            BatchTarget::Existing(tree_id),
            &[NewNode {
                parent: parent_ref,
                content: content.to_string(),
                role: role.trim().to_string(),
                selected: true,
            }],
        )
        .or_storage()?;
    let id = inserted.node_ids[0];
    info!(node_id = id, "custom message added");
    require_node(store, id)
}

/// Invariant violations of a stored tree; empty when well-formed.
pub fn check_tree<S: NodeStore + ?Sized>(store: &S, tree_id: TreeId) -> EngineResult<Vec<String>> {
    require_tree(store, tree_id)?;
    let nodes = store.nodes_in_tree(tree_id).or_storage()?;
    Ok(validate_tree(tree_id, &nodes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{seed_child, seed_root, store_with_case};
    use crate::tree::TreeMeta;
    use crate::writer::create_tree;

    #[test]
    fn select_enforces_parent_and_sibling_rules() {
        let (store, case_id) = store_with_case("facts");
        let (tree_id, root) = seed_root(&store, case_id, "open", "Party A");
        let a = seed_child(&store, tree_id, root, "a", false);
        let b = seed_child(&store, tree_id, root, "b", false);
        let a1 = seed_child(&store, tree_id, a, "a1", false);

        let err = select(&store, a1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert!(select(&store, a).expect("select a").selected);
        let err = select(&store, b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains(&format!("sibling {a}")));

        assert!(select(&store, a1).is_ok());
        assert!(check_tree(&store, tree_id).expect("check").is_empty());
        assert_eq!(select(&store, 999).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn trim_deletes_later_nodes_once() {
        let (store, case_id) = store_with_case("facts");
        let (tree_id, root) = seed_root(&store, case_id, "open", "Party A");
        let a = seed_child(&store, tree_id, root, "a", true);
        seed_child(&store, tree_id, root, "b", false);
        seed_child(&store, tree_id, a, "a1", false);
        seed_child(&store, tree_id, a, "a2", false);

        // cutoff is b; a1 and a2 were created later
        assert_eq!(trim_after_children(&store, root).expect("trim"), 2);
        assert_eq!(trim_after_children(&store, root).expect("trim"), 0);
        assert_eq!(store.nodes_in_tree(tree_id).expect("nodes").len(), 3);
    }

    #[test]
    fn trim_leaves_other_trees_alone() {
        let (store, case_id) = store_with_case("facts");
        let (first, root) = seed_root(&store, case_id, "open", "Party A");
        let (second, other_root) = seed_root(&store, case_id, "other", "Party A");
        seed_child(&store, second, other_root, "later", false);

        assert_eq!(trim_after_children(&store, root).expect("trim"), 0);
        assert_eq!(store.nodes_in_tree(first).expect("nodes").len(), 1);
        assert_eq!(store.nodes_in_tree(second).expect("nodes").len(), 2);
    }

    #[test]
    fn prune_removes_whole_subtree() {
        let (store, case_id) = store_with_case("facts");
        let (tree_id, root) = seed_root(&store, case_id, "open", "Party A");
        let a = seed_child(&store, tree_id, root, "a", true);
        let a1 = seed_child(&store, tree_id, a, "a1", false);
        seed_child(&store, tree_id, a1, "a1x", false);
        let b = seed_child(&store, tree_id, root, "b", false);

        assert_eq!(prune_children(&store, a).expect("prune"), 2);
        let remaining: Vec<NodeId> = store
            .nodes_in_tree(tree_id)
            .expect("nodes")
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(remaining, vec![root, a, b]);
    }

    #[test]
    fn custom_node_extends_selected_path_only() {
        let (store, case_id) = store_with_case("facts");
        let (tree_id, root) = seed_root(&store, case_id, "open", "Party A");

        let custom =
            create_custom_node(&store, tree_id, Some(root), "My own reply", "Party B").expect("add");
        assert!(custom.selected);
        assert_eq!(custom.parent_id, Some(root));

        let err = create_custom_node(&store, tree_id, Some(root), "Another", "Party B").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = create_custom_node(&store, tree_id, None, "Second root", "Party A").unwrap_err();
        assert!(err.to_string().contains("already has root"));

        let err = create_custom_node(&store, tree_id, Some(custom.id), "  ", "Party A").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(check_tree(&store, tree_id).expect("check").is_empty());
    }

    #[test]
    fn custom_root_opens_an_empty_tree() {
        let (store, case_id) = store_with_case("facts");
        let tree = create_tree(&store, case_id, TreeMeta::default()).expect("tree");

        let root = create_custom_node(&store, tree.id, None, "We demand the deposit back.", "Client")
            .expect("root");
        assert!(root.selected);
        assert!(root.is_root());
        assert_eq!(root.role, "Client");

        let err = create_custom_node(&store, tree.id, None, "Again", "Client").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(check_tree(&store, tree.id).expect("check").is_empty());
    }
}
