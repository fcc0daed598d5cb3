//! Continuation Orchestrator: extend a tree at its frontier, or replay the
//! frontier's existing children without calling the model.

use tracing::{info, instrument};

use crate::core::candidate::{SelectionPolicy, reconstruct};
use crate::core::types::{TreeNode, TreeResult};
use crate::error::{EngineError, EngineResult, ResultExt};
use crate::frontier::frontier;
use crate::generate::{
    DialogueGenerator, GenerationFailure, GenerationInputs, GenerationOutcome, PinnedLine,
    render_case_background,
};
use crate::io::model::ModelClient;
use crate::io::store::NodeStore;
use crate::reader::{ordered_nodes, render_history, require_tree};
use crate::tree::{CaseId, Node, NodeId, TreeId, TreeMeta};
use crate::writer::{commit_new_tree, commit_responses};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinueRequest {
    pub case_id: CaseId,
    /// `None` starts a new tree.
    pub tree_id: Option<TreeId>,
    pub simulation_goal: String,
}

/// Advance a conversation by one round.
///
/// - No tree: generate a fresh candidate and commit it as a new tree with
///   nothing selected.
/// - Frontier is a leaf: generate with the selected path as history and the
///   frontier's line pinned as level 1, then graft the responses under it.
/// - Frontier has children: rebuild the same shape from stored nodes.
///
/// A rejected model reply commits nothing; the result then carries the
/// sentinel tree, the error and the raw reply.
#[instrument(skip(store, generator, request), fields(case_id = request.case_id, tree_id = ?request.tree_id))]
pub fn continue_conversation<S, M>(
    store: &S,
    generator: &DialogueGenerator<M>,
    request: &ContinueRequest,
) -> EngineResult<TreeResult>
where
    S: NodeStore + ?Sized,
    M: ModelClient,
{
    let background = case_background(store, generator, request.case_id)?;
    let goal = goal_or_default(generator, &request.simulation_goal);

    let Some(tree_id) = request.tree_id else {
        let outcome = generator.generate(&GenerationInputs {
            case_background: background,
            history: None,
            goal: goal.clone(),
            pinned: None,
        })?;
        return Ok(match outcome {
            GenerationOutcome::Candidate(candidate) => {
                let inserted = commit_new_tree(
                    store,
                    request.case_id,
                    &candidate.tree,
                    SelectionPolicy::Speculative,
                    TreeMeta {
                        headline: Some(goal.clone()),
                        brief: None,
                    },
                )?;
                success(Some(inserted.tree_id), request.case_id, goal, candidate.tree)
            }
            GenerationOutcome::Failed(failure) => failed(None, request.case_id, goal, failure),
        });
    };

    let tree = require_tree(store, tree_id)?;
    if tree.case_id != request.case_id {
        return Err(EngineError::validation(format!(
            "tree {tree_id} belongs to case {}, not case {}",
            tree.case_id, request.case_id
        )));
    }

    let edge = frontier(store, tree_id)?;
    let nodes = ordered_nodes(store, tree_id)?;
    let children: Vec<Node> = nodes
        .iter()
        .filter(|n| n.parent_id == Some(edge.id))
        .cloned()
        .collect();

    if !children.is_empty() {
        info!(frontier = edge.id, children = children.len(), "replaying stored children");
        let grandchildren: Vec<(NodeId, Vec<Node>)> = children
            .iter()
            .map(|child| {
                let kids = nodes
                    .iter()
                    .filter(|n| n.parent_id == Some(child.id))
                    .cloned()
                    .collect();
                (child.id, kids)
            })
            .collect();
        let empty: &[Node] = &[];
        let scenarios_tree = reconstruct(
            &edge,
            &children,
            |id| {
                grandchildren
                    .iter()
                    .find(|(parent, _)| *parent == id)
                    .map_or(empty, |(_, kids)| kids.as_slice())
            },
            &generator.generation_config().placeholder_justification,
        );
        return Ok(success(Some(tree_id), request.case_id, goal, scenarios_tree));
    }

    // The frontier is pinned as level 1, so history is the path leading to it.
    let path: Vec<&Node> = nodes
        .iter()
        .filter(|n| n.selected && n.id != edge.id)
        .collect();
    let history = (!path.is_empty()).then(|| render_history(path, generator.labels()));
    let pinned = PinnedLine {
        text: edge.content.clone(),
        speaker: generator.labels().party_of(&edge.role),
    };

    let outcome = generator.generate(&GenerationInputs {
        case_background: background,
        history,
        goal: goal.clone(),
        pinned: Some(pinned),
    })?;
    Ok(match outcome {
        GenerationOutcome::Candidate(candidate) => {
            commit_responses(
                store,
                tree_id,
                edge.id,
                &candidate.tree,
                SelectionPolicy::Speculative,
            )?;
            success(Some(tree_id), request.case_id, goal, candidate.tree)
        }
        GenerationOutcome::Failed(failure) => failed(Some(tree_id), request.case_id, goal, failure),
    })
}

/// Generate and commit a brand-new tree with the first branch selected at
/// every level.
#[instrument(skip(store, generator, goal))]
pub fn generate_tree<S, M>(
    store: &S,
    generator: &DialogueGenerator<M>,
    case_id: CaseId,
    goal: &str,
) -> EngineResult<TreeResult>
where
    S: NodeStore + ?Sized,
    M: ModelClient,
{
    let background = case_background(store, generator, case_id)?;
    let goal = goal_or_default(generator, goal);
    let outcome = generator.generate(&GenerationInputs {
        case_background: background,
        history: None,
        goal: goal.clone(),
        pinned: None,
    })?;
    Ok(match outcome {
        GenerationOutcome::Candidate(candidate) => {
            let inserted = commit_new_tree(
                store,
                case_id,
                &candidate.tree,
                SelectionPolicy::Deterministic,
                TreeMeta {
                    headline: Some(goal.clone()),
                    brief: None,
                },
            )?;
            success(Some(inserted.tree_id), case_id, goal, candidate.tree)
        }
        GenerationOutcome::Failed(failure) => failed(None, case_id, goal, failure),
    })
}

fn case_background<S, M>(
    store: &S,
    generator: &DialogueGenerator<M>,
    case_id: CaseId,
) -> EngineResult<String>
where
    S: NodeStore + ?Sized,
    M: ModelClient,
{
    let context = store
        .case_context(case_id)
        .or_storage()?
        .ok_or_else(|| EngineError::not_found(format!("case {case_id}")))?;
    Ok(render_case_background(&context, generator.labels()))
}

fn goal_or_default<M: ModelClient>(generator: &DialogueGenerator<M>, goal: &str) -> String {
    let goal = goal.trim();
    if goal.is_empty() {
        generator.generation_config().default_goal.clone()
    } else {
        goal.to_string()
    }
}

fn success(
    tree_id: Option<TreeId>,
    case_id: CaseId,
    simulation_goal: String,
    scenarios_tree: TreeNode,
) -> TreeResult {
    TreeResult {
        tree_id,
        case_id,
        simulation_goal,
        scenarios_tree,
        error: None,
        raw_response: None,
    }
}

fn failed(
    tree_id: Option<TreeId>,
    case_id: CaseId,
    simulation_goal: String,
    failure: GenerationFailure,
) -> TreeResult {
    TreeResult {
        tree_id,
        case_id,
        simulation_goal,
        scenarios_tree: failure.sentinel,
        error: Some(failure.error),
        raw_response: Some(failure.raw_response),
    }
}
