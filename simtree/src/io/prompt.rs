//! Prompt builder for dialogue generation.
//!
//! The template is rendered with minijinja, split back into sections at their
//! `<!-- section:KEY required|droppable -->` markers, and fitted into a byte
//! budget: droppable sections go first, then the case background is cut.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::core::types::RoleLabels;

const DIALOGUE_TEMPLATE: &str = include_str!("prompts/dialogue.md");

/// Fixed user turn sent alongside the rendered system prompt.
pub const USER_PROMPT: &str = "Generate the legal negotiation dialogue tree now.";

const TRUNCATION_MARK: &str = "\n[truncated]";
const SECTION_SEPARATOR: &str = "\n\n";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker regex is valid")
});

/// Opening line the model must reuse verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpeningLine {
    pub line: String,
    /// Label of the party who speaks it, when known.
    pub speaker: Option<String>,
}

/// Everything the dialogue prompt is rendered from.
#[derive(Debug, Clone)]
pub struct PromptInputs {
    pub case_background: String,
    /// Prior turns, already rendered. `None` for a fresh tree.
    pub history: Option<String>,
    pub goal: String,
    pub opening: Option<OpeningLine>,
    pub labels: RoleLabels,
}

/// Rendered system and user prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPack {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone)]
struct Section {
    key: String,
    required: bool,
    content: String,
}

/// Builds dialogue prompts within a byte budget.
#[derive(Debug)]
pub struct PromptBuilder {
    env: Environment<'static>,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("dialogue", DIALOGUE_TEMPLATE)
            .context("load dialogue template")?;
        Ok(Self { env, budget_bytes })
    }

    pub fn build(&self, input: &PromptInputs) -> Result<PromptPack> {
        let template = self.env.get_template("dialogue")?;
        let rendered = template
            .render(context! {
                party_a => input.labels.party_a.as_str(),
                party_b => input.labels.party_b.as_str(),
                background => non_blank(&input.case_background).unwrap_or("Not specified"),
                history => input.history.as_deref().and_then(non_blank),
                goal => input.goal.trim(),
                opening => input.opening.as_ref(),
            })
            .context("render dialogue template")?;

        let mut sections = parse_sections(&rendered);
        fit_to_budget(&mut sections, self.budget_bytes);
        Ok(PromptPack {
            system: join_sections(&sections),
            user: USER_PROMPT.to_string(),
        })
    }
}

fn non_blank(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn parse_sections(rendered: &str) -> Vec<Section> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());
    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        sections.push(Section {
            key: key.as_str().to_string(),
            required: kind.as_str() == "required",
            content: rendered[whole.end()..end].trim().to_string(),
        });
    }
    sections
}

/// Length of the joined prompt, separators included.
fn total_len(sections: &[Section]) -> usize {
    let separators = SECTION_SEPARATOR.len() * sections.len().saturating_sub(1);
    sections.iter().map(|s| s.content.len()).sum::<usize>() + separators
}

/// Drop droppable sections, then cut the background, until within `budget`.
///
/// Other required sections are never touched, so a tiny budget can still be
/// exceeded.
fn fit_to_budget(sections: &mut Vec<Section>, budget: usize) {
    while total_len(sections) > budget {
        let Some(idx) = sections.iter().position(|s| !s.required) else {
            break;
        };
        let dropped = sections.remove(idx);
        debug!(
            section = dropped.key,
            bytes_dropped = dropped.content.len(),
            "dropped section for budget"
        );
    }

    let total = total_len(sections);
    if total <= budget {
        return;
    }
    let Some(background) = sections.iter_mut().find(|s| s.key == "background") else {
        return;
    };
    let before = background.content.len();
    let allowed = budget.saturating_sub(total - before);
    let mut cut = allowed.saturating_sub(TRUNCATION_MARK.len());
    while !background.content.is_char_boundary(cut) {
        cut -= 1;
    }
    background.content.truncate(cut);
    background.content.push_str(TRUNCATION_MARK);
    debug!(before, after = background.content.len(), "truncated background for budget");
}

fn join_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}
