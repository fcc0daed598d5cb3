//! Tree Writer: commits candidate subtrees as single all-or-nothing batches.

use tracing::{info, instrument};

use crate::core::candidate::{SelectionPolicy, flatten, flatten_responses};
use crate::core::types::TreeNode;
use crate::error::{EngineError, EngineResult, ResultExt};
use crate::io::store::{BatchTarget, Inserted, NodeStore};
use crate::reader::{require_node, require_tree};
use crate::tree::{CaseId, NewNode, Node, NodeId, ParentRef, Tree, TreeId, TreeMeta};

/// Create an empty tree for `case_id`, to be opened with a user-authored root.
#[instrument(skip(store, meta))]
pub fn create_tree<S: NodeStore + ?Sized>(
    store: &S,
    case_id: CaseId,
    meta: TreeMeta,
) -> EngineResult<Tree> {
    if store.case(case_id).or_storage()?.is_none() {
        return Err(EngineError::not_found(format!("case {case_id}")));
    }
    let tree = store.insert_tree(case_id, meta).or_storage()?;
    info!(tree_id = tree.id, "empty tree created");
    Ok(tree)
}

/// Create a tree for `case_id` whose root is the candidate's level-1 line.
#[instrument(skip(store, candidate, meta))]
pub fn commit_new_tree<S: NodeStore + ?Sized>(
    store: &S,
    case_id: CaseId,
    candidate: &TreeNode,
    policy: SelectionPolicy,
    meta: TreeMeta,
) -> EngineResult<Inserted> {
    if store.case(case_id).or_storage()?.is_none() {
        return Err(EngineError::not_found(format!("case {case_id}")));
    }
    let batch = flatten(candidate, ParentRef::Root, policy);
    let inserted = store
        .insert_nodes(BatchTarget::NewTree { case_id, meta }, &batch)
        .or_storage()?;
    info!(tree_id = inserted.tree_id, nodes = inserted.node_ids.len(), "tree committed");
    Ok(inserted)
}

/// Graft the whole candidate under `parent_id`.
#[instrument(skip(store, candidate))]
pub fn commit_under<S: NodeStore + ?Sized>(
    store: &S,
    tree_id: TreeId,
    parent_id: NodeId,
    candidate: &TreeNode,
    policy: SelectionPolicy,
) -> EngineResult<Inserted> {
    let parent = require_anchor(store, tree_id, parent_id, policy)?;
    let batch = flatten(candidate, ParentRef::Node(parent.id), policy);
    insert_existing(store, tree_id, &batch)
}

/// Graft only the candidate's responses under `anchor_id`, which already
/// holds the candidate's level-1 line.
#[instrument(skip(store, candidate))]
pub fn commit_responses<S: NodeStore + ?Sized>(
    store: &S,
    tree_id: TreeId,
    anchor_id: NodeId,
    candidate: &TreeNode,
    policy: SelectionPolicy,
) -> EngineResult<Inserted> {
    let anchor = require_anchor(store, tree_id, anchor_id, policy)?;
    let batch = flatten_responses(candidate, anchor.id, policy);
    insert_existing(store, tree_id, &batch)
}

fn insert_existing<S: NodeStore + ?Sized>(
    store: &S,
    tree_id: TreeId,
    batch: &[NewNode],
) -> EngineResult<Inserted> {
    let inserted = store
        .insert_nodes(BatchTarget::Existing(tree_id), batch)
        .or_storage()?;
    info!(tree_id, nodes = inserted.node_ids.len(), "subtree committed");
    Ok(inserted)
}

/// Load the node a batch hangs off and check that a deterministic batch,
/// which selects its first branch, keeps the selected path contiguous.
fn require_anchor<S: NodeStore + ?Sized>(
    store: &S,
    tree_id: TreeId,
    anchor_id: NodeId,
    policy: SelectionPolicy,
) -> EngineResult<Node> {
    require_tree(store, tree_id)?;
    let anchor = require_node(store, anchor_id)?;
    if anchor.tree_id != tree_id {
        return Err(EngineError::validation(format!(
            "message {anchor_id} belongs to tree {}, not tree {tree_id}",
            anchor.tree_id
        )));
    }
    if policy == SelectionPolicy::Deterministic {
        if !anchor.selected {
            return Err(EngineError::validation(format!(
                "cannot commit selected messages under unselected message {anchor_id}"
            )));
        }
        let children = store.children_of(anchor_id).or_storage()?;
        if let Some(selected) = children.iter().find(|c| c.selected) {
            return Err(EngineError::validation(format!(
                "message {anchor_id} already has selected child {}",
                selected.id
            )));
        }
    }
    Ok(anchor)
}
