//! Frontier search over the selected path.

use std::collections::HashSet;

use crate::tree::{Node, NodeId};

/// Find the selected node with no selected child.
///
/// Selected nodes are checked in creation order and the first one without a
/// selected child wins. On a well-formed tree that is the end of the selected
/// path. If every selected node has a selected child (a corrupted tree), falls
/// back to the selected node created last. Returns `None` when nothing is
/// selected.
pub fn find_frontier(nodes: &[Node]) -> Option<NodeId> {
    let mut selected: Vec<&Node> = nodes.iter().filter(|n| n.selected).collect();
    if selected.is_empty() {
        return None;
    }
    selected.sort_by_key(|n| (n.seq, n.id));

    let selected_parents: HashSet<NodeId> = selected.iter().filter_map(|n| n.parent_id).collect();
    if let Some(found) = selected.iter().find(|n| !selected_parents.contains(&n.id)) {
        return Some(found.id);
    }

    selected.last().map(|n| n.id)
}

/// True if `id` has no children at all, selected or not.
pub fn is_leaf(nodes: &[Node], id: NodeId) -> bool {
    !nodes.iter().any(|n| n.parent_id == Some(id))
}
