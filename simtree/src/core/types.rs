//! Shared types for generated content and the views handed to outer layers.

use serde::{Deserialize, Serialize};

use crate::tree::{CaseId, Node, NodeId, TreeId};

/// One of the two negotiating parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Party {
    A,
    B,
}

impl Party {
    pub fn other(self) -> Self {
        match self {
            Party::A => Party::B,
            Party::B => Party::A,
        }
    }
}

/// Display labels for the two parties, as written into node roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleLabels {
    pub party_a: String,
    pub party_b: String,
}

impl RoleLabels {
    pub fn new(party_a: impl Into<String>, party_b: impl Into<String>) -> Self {
        Self {
            party_a: party_a.into(),
            party_b: party_b.into(),
        }
    }

    pub fn label(&self, party: Party) -> &str {
        match party {
            Party::A => &self.party_a,
            Party::B => &self.party_b,
        }
    }

    /// Resolve a role label to a party. Matching is exact after trimming.
    pub fn party_of(&self, label: &str) -> Option<Party> {
        let label = label.trim();
        if label == self.party_a {
            Some(Party::A)
        } else if label == self.party_b {
            Some(Party::B)
        } else {
            None
        }
    }
}

impl Default for RoleLabels {
    fn default() -> Self {
        Self::new("Party A", "Party B")
    }
}

/// A node of a candidate subtree, as produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub speaker: String,
    pub line: String,
    pub level: u8,
    pub reflects_personality: String,
    #[serde(default)]
    pub responses: Vec<TreeNode>,
}

impl TreeNode {
    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.responses.iter());
        }
        count
    }
}

/// Top-level shape of a model reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenariosReply {
    pub scenarios_tree: TreeNode,
}

/// Result of a continuation or tree-generation call.
///
/// `error` and `raw_response` are only present when generation failed; in that
/// case `scenarios_tree` holds the sentinel subtree and nothing was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeResult {
    pub tree_id: Option<TreeId>,
    pub case_id: CaseId,
    pub simulation_goal: String,
    pub scenarios_tree: TreeNode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl TreeResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Nested message view of a stored tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: NodeId,
    pub role: String,
    pub content: String,
    pub selected: bool,
    pub children: Vec<MessageView>,
}

impl MessageView {
    pub fn leaf(node: &Node) -> Self {
        Self {
            id: node.id,
            role: node.role.clone(),
            content: node.content.clone(),
            selected: node.selected,
            children: Vec::new(),
        }
    }
}

/// Flat entry returned by range views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeEntry {
    pub id: NodeId,
    pub role: String,
    pub content: String,
    pub selected: bool,
    pub parent_id: Option<NodeId>,
    pub tree_id: TreeId,
}

impl From<&Node> for RangeEntry {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            role: node.role.clone(),
            content: node.content.clone(),
            selected: node.selected,
            parent_id: node.parent_id,
            tree_id: node.tree_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn party_of_trims_and_rejects_unknown_labels() {
        let labels = RoleLabels::new("Claimant", "Respondent");
        assert_eq!(labels.party_of(" Claimant "), Some(Party::A));
        assert_eq!(labels.party_of("Respondent"), Some(Party::B));
        assert_eq!(labels.party_of("claimant"), None);
        assert_eq!(labels.label(Party::A.other()), "Respondent");
    }

    #[test]
    fn tree_result_omits_absent_error_fields() {
        let result = TreeResult {
            tree_id: Some(1),
            case_id: 2,
            simulation_goal: "settle".to_string(),
            scenarios_tree: TreeNode {
                speaker: "Party A".to_string(),
                line: "Hello".to_string(),
                level: 1,
                reflects_personality: "calm".to_string(),
                responses: Vec::new(),
            },
            error: None,
            raw_response: None,
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert!(json.get("error").is_none());
        assert!(json.get("raw_response").is_none());
        assert_eq!(json["scenarios_tree"]["level"], 1);
    }
}
