//! Frontier Locator over stored trees.

use tracing::{debug, instrument};

use crate::core::frontier::find_frontier;
use crate::error::{EngineError, EngineResult, ResultExt};
use crate::io::store::NodeStore;
use crate::reader::{require_node, require_tree};
use crate::tree::{Node, NodeId, TreeId};

/// The selected node with no selected child: the live edge of exploration.
#[instrument(skip(store))]
pub fn frontier<S: NodeStore + ?Sized>(store: &S, tree_id: TreeId) -> EngineResult<Node> {
    require_tree(store, tree_id)?;
    let nodes = store.nodes_in_tree(tree_id).or_storage()?;
    let id = find_frontier(&nodes).ok_or_else(|| {
        EngineError::not_found(format!("selected messages in tree {tree_id}"))
    })?;
    debug!(frontier = id, "frontier located");
    nodes
        .into_iter()
        .find(|n| n.id == id)
        .ok_or_else(|| EngineError::not_found(format!("message {id}")))
}

/// True iff the node has no children at all.
pub fn is_frontier_leaf<S: NodeStore + ?Sized>(store: &S, node_id: NodeId) -> EngineResult<bool> {
    require_node(store, node_id)?;
    Ok(store.children_of(node_id).or_storage()?.is_empty())
}
