//! Persisted records: cases, trees, nodes and bookmarks.
//!
//! Identifiers are assigned by the store and increase monotonically. Nodes
//! additionally carry `seq`, an explicit store-wide creation sequence used for
//! ordering and trimming instead of leaning on identifier order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type CaseId = u64;
pub type TreeId = u64;
pub type NodeId = u64;
pub type BookmarkId = u64;

/// Background legal scenario a tree is generated against. Read-only to the engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Case {
    pub id: CaseId,
    pub name: String,
    /// Free text or a JSON document describing parties and issues.
    pub context: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCase {
    pub name: String,
    pub context: String,
}

/// One branching dialogue exploration (a.k.a. simulation).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tree {
    pub id: TreeId,
    pub case_id: CaseId,
    pub created_at: DateTime<Utc>,
    pub headline: Option<String>,
    pub brief: Option<String>,
}

/// One line of dialogue (a.k.a. message).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub tree_id: TreeId,
    pub parent_id: Option<NodeId>,
    pub seq: u64,
    pub content: String,
    pub role: String,
    pub selected: bool,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Parent reference for a node that is not yet persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentRef {
    /// The node becomes the tree's root.
    Root,
    /// An already persisted node in the same tree.
    Node(NodeId),
    /// An earlier entry of the same insertion batch, by index.
    Batch(usize),
}

/// A node to be inserted as part of a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewNode {
    pub parent: ParentRef,
    pub content: String,
    pub role: String,
    pub selected: bool,
}

/// Metadata attached to a tree when it is created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeMeta {
    pub headline: Option<String>,
    pub brief: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bookmark {
    pub id: BookmarkId,
    pub tree_id: TreeId,
    pub node_id: NodeId,
    pub created_at: DateTime<Utc>,
}
