//! Dialogue Generator: prompt in, validated candidate subtree (or a sentinel) out.
//!
//! The generator never touches the store. Its caller hands it the rendered
//! case background and history; it renders the prompt, calls the injected
//! [`ModelClient`], and checks the reply in three passes: JSON syntax, the
//! embedded JSON Schema, then the exact 1 + 3 + 9 shape with strict speaker
//! alternation. A reply failing any pass becomes a [`GenerationFailure`]
//! carrying the raw text; transport errors are
//! [`crate::error::EngineError::Upstream`].

use std::sync::LazyLock;

use anyhow::{Context, anyhow};
use jsonschema::{Validator, validator_for};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::candidate::{sentinel, validate_candidate};
use crate::core::types::{Party, RoleLabels, ScenariosReply, TreeNode};
use crate::error::{EngineResult, ResultExt};
use crate::io::config::{GenerationConfig, ModelConfig};
use crate::io::model::{ModelClient, ModelRequest};
use crate::io::prompt::{OpeningLine, PromptBuilder, PromptInputs};

const REPLY_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/scenarios_tree/v1.schema.json"
));

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("fence regex is valid")
});

/// A line that must open the candidate verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedLine {
    pub text: String,
    /// Who speaks it. `None` leaves the choice to the model.
    pub speaker: Option<Party>,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationInputs {
    pub case_background: String,
    /// Prior turns as rendered by [`crate::reader::render_history`].
    pub history: Option<String>,
    pub goal: String,
    pub pinned: Option<PinnedLine>,
}

/// A validated candidate subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub tree: TreeNode,
    /// Party speaking the level-1 line.
    pub opening: Party,
}

/// A reply that could not be turned into a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationFailure {
    /// Placeholder surfaced instead of content. Never persisted.
    pub sentinel: TreeNode,
    pub error: String,
    pub raw_response: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Candidate(Candidate),
    Failed(GenerationFailure),
}

pub struct DialogueGenerator<M> {
    model: M,
    model_cfg: ModelConfig,
    generation: GenerationConfig,
    labels: RoleLabels,
    prompts: PromptBuilder,
    schema: Value,
    validator: Validator,
}

impl<M: ModelClient> DialogueGenerator<M> {
    pub fn new(model: M, model_cfg: ModelConfig, generation: GenerationConfig) -> anyhow::Result<Self> {
        let schema: Value = serde_json::from_str(REPLY_SCHEMA).context("parse reply schema")?;
        let validator =
            validator_for(&schema).map_err(|err| anyhow!("invalid reply schema: {err}"))?;
        let prompts = PromptBuilder::new(generation.prompt_budget_bytes)?;
        Ok(Self {
            model,
            labels: generation.labels(),
            model_cfg,
            generation,
            prompts,
            schema,
            validator,
        })
    }

    pub fn labels(&self) -> &RoleLabels {
        &self.labels
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Run one generation round.
    #[instrument(skip_all, fields(pinned = inputs.pinned.is_some()))]
    pub fn generate(&self, inputs: &GenerationInputs) -> EngineResult<GenerationOutcome> {
        let opening = inputs.pinned.as_ref().map(|pinned| OpeningLine {
            line: pinned.text.clone(),
            speaker: pinned.speaker.map(|p| self.labels.label(p).to_string()),
        });
        let prompt = self
            .prompts
            .build(&PromptInputs {
                case_background: inputs.case_background.clone(),
                history: inputs.history.clone(),
                goal: inputs.goal.clone(),
                opening,
                labels: self.labels.clone(),
            })
            .context("build dialogue prompt")
            .or_upstream()?;
        debug!(prompt_bytes = prompt.system.len(), "prompt rendered");

        let request = ModelRequest {
            system_prompt: prompt.system,
            user_prompt: prompt.user,
            response_schema: self.schema.clone(),
            model_name: self.model_cfg.model_name.clone(),
            temperature: self.model_cfg.temperature,
            max_tokens: self.model_cfg.max_tokens,
            timeout: self.model_cfg.timeout(),
        };
        let raw = self.model.complete(&request).or_upstream()?;

        match self.parse_reply(&raw, inputs.pinned.as_ref()) {
            Ok(candidate) => {
                info!(opening = ?candidate.opening, "candidate accepted");
                Ok(GenerationOutcome::Candidate(candidate))
            }
            Err(error) => {
                warn!(%error, "model reply rejected");
                Ok(GenerationOutcome::Failed(GenerationFailure {
                    sentinel: sentinel(&self.labels),
                    error,
                    raw_response: raw,
                }))
            }
        }
    }

    /// Turn a raw reply into a candidate.
    ///
    /// A pinned line replaces the level-1 text (and speaker, when known)
    /// before the shape check, so the responses must alternate from it.
    pub fn parse_reply(&self, raw: &str, pinned: Option<&PinnedLine>) -> Result<Candidate, String> {
        let body = strip_code_fence(raw);
        let value: Value = serde_json::from_str(body)
            .map_err(|err| format!("Failed to parse JSON response: {err}"))?;

        if !self.validator.is_valid(&value) {
            let messages = self
                .validator
                .iter_errors(&value)
                .map(|err| err.to_string())
                .collect::<Vec<_>>();
            return Err(format!(
                "reply does not match schema: {}",
                messages.join("; ")
            ));
        }
        let reply: ScenariosReply = serde_json::from_value(value)
            .map_err(|err| format!("reply does not match schema: {err}"))?;

        let mut tree = reply.scenarios_tree;
        if let Some(pinned) = pinned {
            tree.line = pinned.text.clone();
            if let Some(party) = pinned.speaker {
                tree.speaker = self.labels.label(party).to_string();
            }
        }

        let opening = validate_candidate(&tree, &self.labels)
            .map_err(|errors| format!("reply violates dialogue shape: {}", errors.join("; ")))?;
        Ok(Candidate { tree, opening })
    }
}

/// Strip one surrounding markdown code fence, if present.
fn strip_code_fence(raw: &str) -> &str {
    FENCE_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or(raw.trim(), |m| m.as_str())
}

/// Render a case context for the prompt.
///
/// A JSON object is rendered as a readable block of parties, key issues and
/// general notes, filling gaps with `Unknown Party` / `Not specified`. Any
/// other text is used verbatim.
pub fn render_case_background(context: &str, labels: &RoleLabels) -> String {
    let Ok(Value::Object(doc)) = serde_json::from_str::<Value>(context) else {
        return context.trim().to_string();
    };

    let party_name = |key: &str| {
        doc.get("parties")
            .and_then(|p| p.get(key))
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("Unknown Party")
            .to_string()
    };
    let field = |key: &str| match doc.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Value::String(s) => format!("- {s}"),
                other => format!("- {other}"),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(Value::Null | Value::String(_) | Value::Array(_)) | None => "Not specified".to_string(),
        Some(other) => other.to_string(),
    };

    format!(
        "Case Background:\n\nParties:\n  {}: {}\n  {}: {}\n\nKey Issues:\n{}\n\nGeneral Notes:\n{}\n",
        labels.party_a,
        party_name("party_A"),
        labels.party_b,
        party_name("party_B"),
        field("key_issues"),
        field("general_notes"),
    )
}
