//! Structural and selection invariants of a stored tree.

use std::collections::{HashMap, HashSet};

use crate::tree::{Node, NodeId, TreeId};

/// Check every invariant of one tree's nodes:
/// - exactly one root
/// - no duplicate ids
/// - parents exist in the same tree
/// - a selected node is the root or has a selected parent
/// - at most one selected child per parent
///
/// Returns stable error messages, ordered by node id.
pub fn validate_tree(tree_id: TreeId, nodes: &[Node]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut sorted: Vec<&Node> = nodes.iter().collect();
    sorted.sort_by_key(|n| n.id);

    let mut seen = HashSet::new();
    let mut by_id: HashMap<NodeId, &Node> = HashMap::new();
    for node in &sorted {
        if !seen.insert(node.id) {
            errors.push(format!("duplicate node id {}", node.id));
        }
        by_id.insert(node.id, node);
    }

    let roots: Vec<NodeId> = sorted.iter().filter(|n| n.is_root()).map(|n| n.id).collect();
    if !sorted.is_empty() && roots.len() != 1 {
        errors.push(format!(
            "tree {} must have exactly one root, found {}",
            tree_id,
            roots.len()
        ));
    }

    let mut selected_children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for node in &sorted {
        if node.tree_id != tree_id {
            errors.push(format!("node {} belongs to tree {}", node.id, node.tree_id));
        }
        let Some(parent_id) = node.parent_id else {
            continue;
        };
        let Some(parent) = by_id.get(&parent_id) else {
            errors.push(format!(
                "node {} references parent {} outside tree {}",
                node.id, parent_id, tree_id
            ));
            continue;
        };
        if node.selected && !parent.selected {
            errors.push(format!(
                "node {} is selected but its parent {} is not",
                node.id, parent_id
            ));
        }
        if node.selected {
            selected_children.entry(parent_id).or_default().push(node.id);
        }
    }

    let mut parents: Vec<_> = selected_children
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .collect();
    parents.sort_by_key(|(parent, _)| *parent);
    for (parent, ids) in parents {
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        errors.push(format!(
            "node {} has more than one selected child: {}",
            parent,
            ids.join(", ")
        ));
    }

    errors
}
