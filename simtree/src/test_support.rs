//! Test-only helpers: node and candidate fixtures, a scripted model, seeded stores.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use anyhow::{Result, anyhow};

use crate::core::types::{Party, RoleLabels, ScenariosReply, TreeNode};
use crate::generate::DialogueGenerator;
use crate::io::config::{GenerationConfig, ModelConfig};
use crate::io::file_store::FileStore;
use crate::io::memory_store::MemoryStore;
use crate::io::model::{ModelClient, ModelRequest};
use crate::io::store::{BatchTarget, NodeStore};
use crate::tree::{CaseId, NewCase, NewNode, Node, NodeId, ParentRef, TreeId, TreeMeta};

/// A stored node in tree 1 with `seq == id`, content `line {id}` and role `Party A`.
pub fn stored_node(id: NodeId, parent_id: Option<NodeId>, selected: bool) -> Node {
    Node {
        id,
        tree_id: 1,
        parent_id,
        seq: id,
        content: format!("line {id}"),
        role: "Party A".to_string(),
        selected,
    }
}

/// A well-formed 1 + 3 + 9 candidate opened by `opening` with `line`.
///
/// Level-2 lines read `reply {i}`, level-3 lines `follow-up {i}.{j}` (1-based).
pub fn candidate(labels: &RoleLabels, opening: Party, line: &str) -> TreeNode {
    let node = |party: Party, line: String, level: u8, responses: Vec<TreeNode>| TreeNode {
        speaker: labels.label(party).to_string(),
        line,
        level,
        reflects_personality: format!("level {level} rationale"),
        responses,
    };
    let responses = (1..=3)
        .map(|i| {
            let replies = (1..=3)
                .map(|j| node(opening, format!("follow-up {i}.{j}"), 3, Vec::new()))
                .collect();
            node(opening.other(), format!("reply {i}"), 2, replies)
        })
        .collect();
    node(opening, line.to_string(), 1, responses)
}

/// Serialize a candidate the way a well-behaved model replies.
pub fn reply_json(tree: &TreeNode) -> String {
    serde_json::to_string_pretty(&ScenariosReply {
        scenarios_tree: tree.clone(),
    })
    .expect("candidate serializes")
}

/// Model double that hands out queued replies in order and records requests.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: RefCell<VecDeque<Result<String, String>>>,
    requests: RefCell<Vec<ModelRequest>>,
    calls: Cell<usize>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful raw reply.
    pub fn reply(self, raw: impl Into<String>) -> Self {
        self.replies.borrow_mut().push_back(Ok(raw.into()));
        self
    }

    /// Queue a transport failure.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.replies.borrow_mut().push_back(Err(message.into()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn last_request(&self) -> Option<ModelRequest> {
        self.requests.borrow().last().cloned()
    }
}

impl ModelClient for ScriptedModel {
    fn complete(&self, request: &ModelRequest) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        self.requests.borrow_mut().push(request.clone());
        match self.replies.borrow_mut().pop_front() {
            Some(Ok(raw)) => Ok(raw),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted model has no reply queued")),
        }
    }
}

/// Generator over `model` with default configuration.
pub fn generator<M: ModelClient>(model: M) -> DialogueGenerator<M> {
    DialogueGenerator::new(model, ModelConfig::default(), GenerationConfig::default())
        .expect("default generator")
}

/// Memory store holding one case.
pub fn store_with_case(context: &str) -> (MemoryStore, CaseId) {
    let store = MemoryStore::new();
    let case = store
        .insert_case(NewCase {
            name: "Deposit dispute".to_string(),
            context: context.to_string(),
        })
        .expect("insert case");
    (store, case.id)
}

/// File-backed store inside a fresh temporary directory.
///
/// Keep the returned `TempDir` alive for as long as the store is used.
pub fn temp_file_store() -> (tempfile::TempDir, FileStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStore::new(dir.path().join("store.json"));
    (dir, store)
}

/// Create a tree for `case_id` holding a single selected root.
pub fn seed_root(
    store: &impl NodeStore,
    case_id: CaseId,
    content: &str,
    role: &str,
) -> (TreeId, NodeId) {
    let inserted = store
        .insert_nodes(
            BatchTarget::NewTree {
                case_id,
                meta: TreeMeta::default(),
            },
            &[NewNode {
                parent: ParentRef::Root,
                content: content.to_string(),
                role: role.to_string(),
                selected: true,
            }],
        )
        .expect("insert root");
    (inserted.tree_id, inserted.node_ids[0])
}

/// Insert one child of `parent` in `tree_id`.
pub fn seed_child(
    store: &impl NodeStore,
    tree_id: TreeId,
    parent: NodeId,
    content: &str,
    selected: bool,
) -> NodeId {
    store
        .insert_nodes(
            BatchTarget::Existing(tree_id),
            &[NewNode {
                parent: ParentRef::Node(parent),
                content: content.to_string(),
                role: "Party B".to_string(),
                selected,
            }],
        )
        .expect("insert child")
        .node_ids[0]
}
