//! Node store contract and the document both bundled backends operate on.
//!
//! Backends only decide where the [`StoreDocument`] lives; every read and
//! mutation is implemented once here. Mutations run against a staged copy and
//! are only published when the whole operation succeeds, which makes each
//! call (including a full insertion batch) all-or-nothing.

use std::collections::{BTreeMap, HashSet};

use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::tree::{
    Bookmark, BookmarkId, Case, CaseId, NewCase, NewNode, Node, NodeId, ParentRef, Tree, TreeId,
    TreeMeta,
};

/// Where an insertion batch goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchTarget {
    /// Create a tree for `case_id` in the same transaction.
    NewTree { case_id: CaseId, meta: TreeMeta },
    Existing(TreeId),
}

/// Identifiers assigned by an insertion batch, in batch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inserted {
    pub tree_id: TreeId,
    pub node_ids: Vec<NodeId>,
}

/// Transactional record store consumed by the engine.
pub trait NodeStore {
    fn insert_case(&self, case: NewCase) -> Result<Case>;
    fn case(&self, id: CaseId) -> Result<Option<Case>>;
    fn tree(&self, id: TreeId) -> Result<Option<Tree>>;
    fn trees_for_case(&self, case_id: CaseId) -> Result<Vec<Tree>>;
    /// Create a tree with no nodes yet.
    fn insert_tree(&self, case_id: CaseId, meta: TreeMeta) -> Result<Tree>;
    /// Insert a batch atomically. Parents must live in the target tree.
    fn insert_nodes(&self, target: BatchTarget, batch: &[NewNode]) -> Result<Inserted>;
    fn node(&self, id: NodeId) -> Result<Option<Node>>;
    fn nodes_in_tree(&self, tree_id: TreeId) -> Result<Vec<Node>>;
    fn children_of(&self, id: NodeId) -> Result<Vec<Node>>;
    /// Nodes of any tree with `start <= id <= end`.
    fn nodes_in_id_range(&self, start: NodeId, end: NodeId) -> Result<Vec<Node>>;
    fn set_selected(&self, id: NodeId, selected: bool) -> Result<Node>;
    /// Delete nodes and any bookmarks pointing at them. Returns nodes removed.
    fn delete_nodes(&self, ids: &[NodeId]) -> Result<usize>;
    fn insert_bookmark(&self, tree_id: TreeId, node_id: NodeId) -> Result<Bookmark>;
    fn bookmarks_for_tree(&self, tree_id: TreeId) -> Result<Vec<Bookmark>>;
    fn delete_bookmark(&self, id: BookmarkId) -> Result<bool>;

    fn case_context(&self, id: CaseId) -> Result<Option<String>> {
        Ok(self.case(id)?.map(|case| case.context))
    }
}

/// Storage location for a [`StoreDocument`].
pub trait DocumentBackend {
    fn read<T>(&self, f: impl FnOnce(&StoreDocument) -> T) -> Result<T>;
    /// Apply `f` to a staged copy and publish it only if `f` succeeds.
    fn write<T>(&self, f: impl FnOnce(&mut StoreDocument) -> Result<T>) -> Result<T>;

    /// Batch index at which the next insertion batch must fail, if armed.
    fn take_insert_fault(&self) -> Option<usize> {
        None
    }
}

/// Whole-store state: records plus identifier counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreDocument {
    last_case_id: CaseId,
    last_tree_id: TreeId,
    last_node_id: NodeId,
    last_seq: u64,
    last_bookmark_id: BookmarkId,
    cases: BTreeMap<CaseId, Case>,
    trees: BTreeMap<TreeId, Tree>,
    nodes: BTreeMap<NodeId, Node>,
    bookmarks: BTreeMap<BookmarkId, Bookmark>,
}

impl StoreDocument {
    fn insert_case(&mut self, case: NewCase) -> Case {
        self.last_case_id += 1;
        let case = Case {
            id: self.last_case_id,
            name: case.name,
            context: case.context,
        };
        self.cases.insert(case.id, case.clone());
        case
    }

    fn insert_tree(&mut self, case_id: CaseId, meta: TreeMeta) -> Result<Tree> {
        if !self.cases.contains_key(&case_id) {
            bail!("case {case_id} does not exist");
        }
        self.last_tree_id += 1;
        let tree = Tree {
            id: self.last_tree_id,
            case_id,
            created_at: Utc::now(),
            headline: meta.headline,
            brief: meta.brief,
        };
        self.trees.insert(tree.id, tree.clone());
        Ok(tree)
    }

    fn insert_nodes(
        &mut self,
        target: BatchTarget,
        batch: &[NewNode],
        fail_at: Option<usize>,
    ) -> Result<Inserted> {
        if batch.is_empty() {
            bail!("insertion batch is empty");
        }

        let tree_id = match target {
            BatchTarget::NewTree { case_id, meta } => self.insert_tree(case_id, meta)?.id,
            BatchTarget::Existing(tree_id) => {
                if !self.trees.contains_key(&tree_id) {
                    bail!("tree {tree_id} does not exist");
                }
                tree_id
            }
        };

        let mut assigned: Vec<NodeId> = Vec::with_capacity(batch.len());
        for (i, new) in batch.iter().enumerate() {
            if fail_at == Some(i) {
                bail!("injected failure at batch entry {i}");
            }
            let parent_id = match new.parent {
                ParentRef::Root => {
                    if self
                        .nodes
                        .values()
                        .any(|n| n.tree_id == tree_id && n.is_root())
                    {
                        bail!("tree {tree_id} already has a root");
                    }
                    None
                }
                ParentRef::Node(id) => match self.nodes.get(&id) {
                    Some(parent) if parent.tree_id == tree_id => Some(id),
                    Some(parent) => bail!(
                        "parent {id} belongs to tree {}, not tree {tree_id}",
                        parent.tree_id
                    ),
                    None => bail!("parent {id} does not exist"),
                },
                ParentRef::Batch(j) => Some(
                    assigned
                        .get(j)
                        .copied()
                        .ok_or_else(|| anyhow!("batch entry {i} refers to entry {j}"))?,
                ),
            };

            self.last_node_id += 1;
            self.last_seq += 1;
            let node = Node {
                id: self.last_node_id,
                tree_id,
                parent_id,
                seq: self.last_seq,
                content: new.content.clone(),
                role: new.role.clone(),
                selected: new.selected,
            };
            assigned.push(node.id);
            self.nodes.insert(node.id, node);
        }

        Ok(Inserted {
            tree_id,
            node_ids: assigned,
        })
    }

    fn set_selected(&mut self, id: NodeId, selected: bool) -> Result<Node> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| anyhow!("node {id} does not exist"))?;
        node.selected = selected;
        Ok(node.clone())
    }

    fn delete_nodes(&mut self, ids: &[NodeId]) -> usize {
        let doomed: HashSet<NodeId> = ids.iter().copied().collect();
        let before = self.nodes.len();
        self.nodes.retain(|id, _| !doomed.contains(id));
        self.bookmarks.retain(|_, b| !doomed.contains(&b.node_id));
        before - self.nodes.len()
    }

    fn insert_bookmark(&mut self, tree_id: TreeId, node_id: NodeId) -> Result<Bookmark> {
        if !self.trees.contains_key(&tree_id) {
            bail!("tree {tree_id} does not exist");
        }
        if !self.nodes.contains_key(&node_id) {
            bail!("node {node_id} does not exist");
        }
        self.last_bookmark_id += 1;
        let bookmark = Bookmark {
            id: self.last_bookmark_id,
            tree_id,
            node_id,
            created_at: Utc::now(),
        };
        self.bookmarks.insert(bookmark.id, bookmark.clone());
        Ok(bookmark)
    }

    fn nodes_where(&self, pred: impl Fn(&Node) -> bool) -> Vec<Node> {
        self.nodes.values().filter(|n| pred(n)).cloned().collect()
    }
}

impl<B: DocumentBackend> NodeStore for B {
    fn insert_case(&self, case: NewCase) -> Result<Case> {
        self.write(|doc| Ok(doc.insert_case(case)))
    }

    fn case(&self, id: CaseId) -> Result<Option<Case>> {
        self.read(|doc| doc.cases.get(&id).cloned())
    }

    fn tree(&self, id: TreeId) -> Result<Option<Tree>> {
        self.read(|doc| doc.trees.get(&id).cloned())
    }

    fn trees_for_case(&self, case_id: CaseId) -> Result<Vec<Tree>> {
        self.read(|doc| {
            doc.trees
                .values()
                .filter(|t| t.case_id == case_id)
                .cloned()
                .collect()
        })
    }

    fn insert_tree(&self, case_id: CaseId, meta: TreeMeta) -> Result<Tree> {
        self.write(|doc| doc.insert_tree(case_id, meta))
    }

    #[instrument(skip_all, fields(target = ?target, batch_len = batch.len()))]
    fn insert_nodes(&self, target: BatchTarget, batch: &[NewNode]) -> Result<Inserted> {
        let fail_at = self.take_insert_fault();
        let inserted = self.write(|doc| doc.insert_nodes(target, batch, fail_at))?;
        debug!(tree_id = inserted.tree_id, nodes = inserted.node_ids.len(), "batch committed");
        Ok(inserted)
    }

    fn node(&self, id: NodeId) -> Result<Option<Node>> {
        self.read(|doc| doc.nodes.get(&id).cloned())
    }

    fn nodes_in_tree(&self, tree_id: TreeId) -> Result<Vec<Node>> {
        self.read(|doc| doc.nodes_where(|n| n.tree_id == tree_id))
    }

    fn children_of(&self, id: NodeId) -> Result<Vec<Node>> {
        self.read(|doc| doc.nodes_where(|n| n.parent_id == Some(id)))
    }

    fn nodes_in_id_range(&self, start: NodeId, end: NodeId) -> Result<Vec<Node>> {
        if start > end {
            return Ok(Vec::new());
        }
        self.read(|doc| {
            doc.nodes
                .range(start..=end)
                .map(|(_, node)| node.clone())
                .collect()
        })
    }

    #[instrument(skip(self))]
    fn set_selected(&self, id: NodeId, selected: bool) -> Result<Node> {
        self.write(|doc| doc.set_selected(id, selected))
    }

    #[instrument(skip_all, fields(count = ids.len()))]
    fn delete_nodes(&self, ids: &[NodeId]) -> Result<usize> {
        self.write(|doc| Ok(doc.delete_nodes(ids)))
    }

    fn insert_bookmark(&self, tree_id: TreeId, node_id: NodeId) -> Result<Bookmark> {
        self.write(|doc| doc.insert_bookmark(tree_id, node_id))
    }

    fn bookmarks_for_tree(&self, tree_id: TreeId) -> Result<Vec<Bookmark>> {
        self.read(|doc| {
            doc.bookmarks
                .values()
                .filter(|b| b.tree_id == tree_id)
                .cloned()
                .collect()
        })
    }

    fn delete_bookmark(&self, id: BookmarkId) -> Result<bool> {
        self.write(|doc| Ok(doc.bookmarks.remove(&id).is_some()))
    }
}
