//! Tree Reader: ordered, hierarchical and ranged views over stored nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use crate::core::index::{ChildIndex, IntoDepthFirst};
use crate::core::types::{MessageView, RangeEntry, RoleLabels};
use crate::error::{EngineError, EngineResult, ResultExt};
use crate::io::store::NodeStore;
use crate::tree::{CaseId, Node, NodeId, Tree, TreeId};

/// A tree's nodes, traversed depth-first on demand.
///
/// Every call to [`OrderedNodes::iter`] starts a fresh traversal.
#[derive(Debug, Clone)]
pub struct OrderedNodes {
    nodes: Vec<Node>,
}

impl OrderedNodes {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Root first, then each child's subtree in creation order.
    pub fn iter(&self) -> IntoDepthFirst<'_> {
        ChildIndex::build(&self.nodes).into_depth_first()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Header information about one tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSummary {
    pub id: TreeId,
    pub case_id: CaseId,
    pub headline: Option<String>,
    pub brief: Option<String>,
    pub created_at: DateTime<Utc>,
    pub node_count: usize,
}

pub(crate) fn require_tree<S: NodeStore + ?Sized>(store: &S, tree_id: TreeId) -> EngineResult<Tree> {
    store
        .tree(tree_id)
        .or_storage()?
        .ok_or_else(|| EngineError::not_found(format!("tree {tree_id}")))
}

pub(crate) fn require_node<S: NodeStore + ?Sized>(store: &S, node_id: NodeId) -> EngineResult<Node> {
    store
        .node(node_id)
        .or_storage()?
        .ok_or_else(|| EngineError::not_found(format!("message {node_id}")))
}

/// Every node of a tree in depth-first order.
#[instrument(skip(store))]
pub fn ordered_nodes<S: NodeStore + ?Sized>(store: &S, tree_id: TreeId) -> EngineResult<OrderedNodes> {
    require_tree(store, tree_id)?;
    Ok(OrderedNodes::new(store.nodes_in_tree(tree_id).or_storage()?))
}

/// The selected path of a tree, root first.
#[instrument(skip(store))]
pub fn selected_only<S: NodeStore + ?Sized>(store: &S, tree_id: TreeId) -> EngineResult<OrderedNodes> {
    require_tree(store, tree_id)?;
    let selected = store
        .nodes_in_tree(tree_id)
        .or_storage()?
        .into_iter()
        .filter(|n| n.selected)
        .collect();
    Ok(OrderedNodes::new(selected))
}

/// Selected nodes of any tree with `start <= id <= end`, in creation order.
///
/// An empty result, including any range with `start > end`, is NotFound.
pub fn selected_range<S: NodeStore + ?Sized>(
    store: &S,
    start: NodeId,
    end: NodeId,
) -> EngineResult<Vec<RangeEntry>> {
    let mut nodes: Vec<Node> = store
        .nodes_in_id_range(start, end)
        .or_storage()?
        .into_iter()
        .filter(|n| n.selected)
        .collect();
    if nodes.is_empty() {
        return Err(EngineError::not_found(format!(
            "selected messages in range {start}..={end}"
        )));
    }
    nodes.sort_by_key(|n| (n.seq, n.id));
    Ok(nodes.iter().map(RangeEntry::from).collect())
}

/// Direct children of a node, any selection state, in creation order.
pub fn children_of<S: NodeStore + ?Sized>(store: &S, node_id: NodeId) -> EngineResult<Vec<Node>> {
    require_node(store, node_id)?;
    let mut children = store.children_of(node_id).or_storage()?;
    children.sort_by_key(|n| (n.seq, n.id));
    Ok(children)
}

/// Nested `{id, role, content, selected, children}` view of a whole tree.
pub fn tree_view<S: NodeStore + ?Sized>(store: &S, tree_id: TreeId) -> EngineResult<Vec<MessageView>> {
    let nodes = store.nodes_in_tree(tree_id).or_storage()?;
    if nodes.is_empty() {
        return Err(EngineError::not_found(format!("messages for tree {tree_id}")));
    }
    Ok(ChildIndex::build(&nodes).to_views())
}

pub fn tree_summary<S: NodeStore + ?Sized>(store: &S, tree_id: TreeId) -> EngineResult<TreeSummary> {
    let tree = require_tree(store, tree_id)?;
    let node_count = store.nodes_in_tree(tree_id).or_storage()?.len();
    Ok(TreeSummary {
        id: tree.id,
        case_id: tree.case_id,
        headline: tree.headline,
        brief: tree.brief,
        created_at: tree.created_at,
        node_count,
    })
}

/// Render a path of nodes as the JSON list of `{party, statement}` turns fed
/// to the model. Roles matching a configured label are normalised to it.
pub fn render_history<'a>(path: impl IntoIterator<Item = &'a Node>, labels: &RoleLabels) -> String {
    let turns: Vec<_> = path
        .into_iter()
        .map(|node| {
            let party = labels
                .party_of(&node.role)
                .map_or(node.role.as_str(), |p| labels.label(p));
            json!({ "party": party, "statement": node.content })
        })
        .collect();
    serde_json::Value::Array(turns).to_string()
}

/// The selected path of a tree rendered as prompt history.
pub fn selected_history<S: NodeStore + ?Sized>(
    store: &S,
    tree_id: TreeId,
    labels: &RoleLabels,
) -> EngineResult<String> {
    let path = selected_only(store, tree_id)?;
    Ok(render_history(path.iter(), labels))
}
