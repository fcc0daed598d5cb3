//! Parent-to-children index and iterative depth-first traversal.
//!
//! Stored nodes are flat; every hierarchical view is rebuilt from a
//! [`ChildIndex`]. Traversal uses an explicit stack because accumulated rounds
//! can nest arbitrarily deep.

use std::collections::HashMap;

use crate::core::types::MessageView;
use crate::tree::{Node, NodeId};

/// Children grouped by parent, each group sorted by creation order.
#[derive(Debug, Clone)]
pub struct ChildIndex<'a> {
    by_parent: HashMap<Option<NodeId>, Vec<&'a Node>>,
}

impl<'a> ChildIndex<'a> {
    pub fn build(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let mut by_parent: HashMap<Option<NodeId>, Vec<&'a Node>> = HashMap::new();
        for node in nodes {
            by_parent.entry(node.parent_id).or_default().push(node);
        }
        for group in by_parent.values_mut() {
            group.sort_by_key(|n| (n.seq, n.id));
        }
        Self { by_parent }
    }

    /// Nodes without a parent. A well-formed tree has exactly one.
    pub fn roots(&self) -> &[&'a Node] {
        self.by_parent.get(&None).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn children(&self, id: NodeId) -> &[&'a Node] {
        self.by_parent
            .get(&Some(id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        !self.children(id).is_empty()
    }

    /// Pre-order traversal: a parent, then each child's subtree in creation order.
    ///
    /// Nodes whose parent is absent from the index are never reached.
    pub fn depth_first(&self) -> DepthFirst<'_, 'a> {
        DepthFirst {
            index: self,
            stack: self.roots().iter().rev().copied().collect(),
        }
    }

    /// Like [`ChildIndex::depth_first`], but the iterator owns the index.
    pub fn into_depth_first(self) -> IntoDepthFirst<'a> {
        let stack = self.roots().iter().rev().copied().collect();
        IntoDepthFirst { index: self, stack }
    }

    /// Build nested message views for every root, without recursion.
    pub fn to_views(&self) -> Vec<MessageView> {
        let order: Vec<&Node> = self.depth_first().collect();
        let mut pending: HashMap<NodeId, Vec<MessageView>> = HashMap::new();
        let mut roots = Vec::new();

        // Reverse pre-order guarantees every child is finished before its parent.
        for node in order.into_iter().rev() {
            let mut view = MessageView::leaf(node);
            if let Some(mut children) = pending.remove(&node.id) {
                children.reverse();
                view.children = children;
            }
            match node.parent_id {
                Some(parent) => pending.entry(parent).or_default().push(view),
                None => roots.push(view),
            }
        }

        roots.reverse();
        roots
    }
}

/// Lazy pre-order iterator over a [`ChildIndex`]. Clone it to restart.
#[derive(Debug, Clone)]
pub struct DepthFirst<'i, 'a> {
    index: &'i ChildIndex<'a>,
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for DepthFirst<'_, 'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        step(self.index, &mut self.stack)
    }
}

/// Owning counterpart of [`DepthFirst`].
#[derive(Debug, Clone)]
pub struct IntoDepthFirst<'a> {
    index: ChildIndex<'a>,
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for IntoDepthFirst<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        step(&self.index, &mut self.stack)
    }
}

fn step<'a>(index: &ChildIndex<'a>, stack: &mut Vec<&'a Node>) -> Option<&'a Node> {
    let node = stack.pop()?;
    stack.extend(index.children(node.id).iter().rev().copied());
    Some(node)
}
