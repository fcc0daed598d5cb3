//! Candidate subtrees: shape validation, flattening into insert batches, and
//! reconstruction from already stored children.

use std::collections::VecDeque;

use crate::core::types::{Party, RoleLabels, TreeNode};
use crate::tree::{NewNode, Node, NodeId, ParentRef};

/// Responses per node at levels 1 and 2 of a candidate.
pub const BRANCHING: usize = 3;
/// Depth of one generation round.
pub const DEPTH: u8 = 3;

pub const SENTINEL_LINE: &str = "Error: Could not generate proper dialogue tree";
pub const SENTINEL_JUSTIFICATION: &str = "System error occurred";

/// How selected flags are set on committed nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Every node unselected; the client picks the next step.
    Speculative,
    /// The first-listed branch at every level is selected, everything else is not.
    Deterministic,
}

/// Check the 1 + 3 + 9 shape, levels, and strict speaker alternation.
///
/// Returns the opening party on success, or every violation found.
pub fn validate_candidate(root: &TreeNode, labels: &RoleLabels) -> Result<Party, Vec<String>> {
    let mut errors = Vec::new();
    let opening = labels.party_of(&root.speaker);
    if opening.is_none() {
        errors.push(format!("level 1: unknown speaker '{}'", root.speaker));
    }

    let mut stack: Vec<(&TreeNode, u8, Option<Party>, String)> =
        vec![(root, 1, opening, "1".to_string())];
    while let Some((node, level, expected, path)) = stack.pop() {
        if node.level != level {
            errors.push(format!("{path}: level is {}, expected {level}", node.level));
        }
        if node.line.trim().is_empty() {
            errors.push(format!("{path}: line is empty"));
        }
        if level > 1 {
            match (labels.party_of(&node.speaker), expected) {
                (None, _) => errors.push(format!("{path}: unknown speaker '{}'", node.speaker)),
                (Some(actual), Some(expected)) if actual != expected => errors.push(format!(
                    "{path}: speaker '{}' does not alternate",
                    node.speaker
                )),
                _ => {}
            }
        }

        let want = if level < DEPTH { BRANCHING } else { 0 };
        if node.responses.len() != want {
            errors.push(format!(
                "{path}: has {} responses, expected {want}",
                node.responses.len()
            ));
        }
        if level < DEPTH {
            let speaker = labels.party_of(&node.speaker).or(expected);
            for (i, child) in node.responses.iter().enumerate().rev() {
                stack.push((
                    child,
                    level + 1,
                    speaker.map(Party::other),
                    format!("{path}.{}", i + 1),
                ));
            }
        }
    }

    match opening {
        Some(party) if errors.is_empty() => Ok(party),
        _ => Err(errors),
    }
}

/// Placeholder subtree surfaced when generation fails. Never persisted.
pub fn sentinel(labels: &RoleLabels) -> TreeNode {
    TreeNode {
        speaker: labels.label(Party::A).to_string(),
        line: SENTINEL_LINE.to_string(),
        level: 1,
        reflects_personality: SENTINEL_JUSTIFICATION.to_string(),
        responses: Vec::new(),
    }
}

/// Flatten a whole candidate into a batch, level by level.
///
/// The level-1 node comes first and hangs off `anchor`, then all level-2
/// nodes, then all level-3 nodes, each referring to its parent's batch index.
pub fn flatten(root: &TreeNode, anchor: ParentRef, policy: SelectionPolicy) -> Vec<NewNode> {
    let mut batch = Vec::with_capacity(root.node_count());
    let mut queue = VecDeque::from([(root, anchor, true)]);
    push_level_order(&mut batch, &mut queue, policy);
    batch
}

/// Flatten only the responses of a candidate, grafted under `anchor`.
///
/// Used when the stored `anchor` node already is the candidate's level-1 line.
pub fn flatten_responses(root: &TreeNode, anchor: NodeId, policy: SelectionPolicy) -> Vec<NewNode> {
    let mut batch = Vec::with_capacity(root.node_count().saturating_sub(1));
    let mut queue: VecDeque<_> = root
        .responses
        .iter()
        .enumerate()
        .map(|(i, child)| (child, ParentRef::Node(anchor), i == 0))
        .collect();
    push_level_order(&mut batch, &mut queue, policy);
    batch
}

fn push_level_order<'a>(
    batch: &mut Vec<NewNode>,
    queue: &mut VecDeque<(&'a TreeNode, ParentRef, bool)>,
    policy: SelectionPolicy,
) {
    while let Some((node, parent, first_branch)) = queue.pop_front() {
        let index = batch.len();
        batch.push(NewNode {
            parent,
            content: node.line.clone(),
            role: node.speaker.clone(),
            selected: policy == SelectionPolicy::Deterministic && first_branch,
        });
        for (i, child) in node.responses.iter().enumerate() {
            queue.push_back((child, ParentRef::Batch(index), first_branch && i == 0));
        }
    }
}

/// Rebuild a candidate-shaped response from stored nodes.
///
/// `anchor` becomes level 1, `children` level 2 and `grandchildren(id)` level
/// 3. Justifications are not stored, so every node gets `placeholder`.
pub fn reconstruct<'a>(
    anchor: &Node,
    children: &[Node],
    grandchildren: impl Fn(NodeId) -> &'a [Node],
    placeholder: &str,
) -> TreeNode {
    let to_tree_node = |node: &Node, level: u8| TreeNode {
        speaker: node.role.clone(),
        line: node.content.clone(),
        level,
        reflects_personality: placeholder.to_string(),
        responses: Vec::new(),
    };

    let mut root = to_tree_node(anchor, 1);
    for child in sorted_by_creation(children) {
        let mut level2 = to_tree_node(child, 2);
        level2.responses = sorted_by_creation(grandchildren(child.id))
            .into_iter()
            .map(|n| to_tree_node(n, 3))
            .collect();
        root.responses.push(level2);
    }
    root
}

fn sorted_by_creation(nodes: &[Node]) -> Vec<&Node> {
    let mut sorted: Vec<&Node> = nodes.iter().collect();
    sorted.sort_by_key(|n| (n.seq, n.id));
    sorted
}
