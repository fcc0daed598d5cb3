//! Selection preconditions and deletion sets.

use std::collections::HashMap;

use crate::tree::{Node, NodeId};

/// Check whether `node` may become selected.
///
/// `parent` is `None` only for a root. `siblings` may include `node` itself.
pub fn check_select(node: &Node, parent: Option<&Node>, siblings: &[Node]) -> Result<(), String> {
    if let Some(parent_id) = node.parent_id {
        match parent {
            Some(parent) if parent.id == parent_id && parent.selected => {}
            Some(parent) if parent.id == parent_id => {
                return Err(format!(
                    "cannot select node {} because its parent {} is not selected",
                    node.id, parent_id
                ));
            }
            _ => {
                return Err(format!(
                    "cannot select node {} because its parent {} is missing",
                    node.id, parent_id
                ));
            }
        }
    }

    if let Some(sibling) = siblings.iter().find(|s| {
        s.id != node.id && s.selected && s.tree_id == node.tree_id && s.parent_id == node.parent_id
    }) {
        return Err(format!(
            "cannot select node {} because sibling {} is already selected",
            node.id, sibling.id
        ));
    }

    Ok(())
}

/// Creation-sequence cutoff for trimming: the newest direct child of
/// `target`, or `target` itself when it has none.
pub fn trim_cutoff(target: &Node, children: &[Node]) -> u64 {
    children.iter().map(|c| c.seq).max().unwrap_or(target.seq)
}

/// Ids of every node created after `cutoff`.
pub fn created_after(nodes: &[Node], cutoff: u64) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = nodes
        .iter()
        .filter(|n| n.seq > cutoff)
        .map(|n| n.id)
        .collect();
    ids.sort_unstable();
    ids
}

/// Ids of every descendant of `id` (not including `id`), found iteratively.
pub fn descendants(nodes: &[Node], id: NodeId) -> Vec<NodeId> {
    let mut by_parent: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for node in nodes {
        if let Some(parent) = node.parent_id {
            by_parent.entry(parent).or_default().push(node.id);
        }
    }

    let mut found = Vec::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        if let Some(children) = by_parent.get(&current) {
            for &child in children {
                found.push(child);
                stack.push(child);
            }
        }
    }
    found.sort_unstable();
    found
}
