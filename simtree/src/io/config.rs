//! Engine configuration stored in `simtree.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::RoleLabels;

/// Engine configuration (TOML).
///
/// Intended to be edited by hand. Missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// JSON file backing the node store.
    pub store_path: PathBuf,

    pub model: ModelConfig,

    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Backend command; receives the request as JSON on stdin and prints the
    /// model's reply on stdout.
    pub command: Vec<String>,

    pub model_name: String,

    pub temperature: f64,

    /// Output-length cap passed to the model.
    pub max_tokens: u32,

    /// Wall-clock bound on a single model call, in seconds.
    pub timeout_secs: u64,

    /// Discard backend output beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub party_a_label: String,
    pub party_b_label: String,

    /// Prompt size above which droppable sections are removed.
    pub prompt_budget_bytes: usize,

    /// Justification shown for children that were generated earlier.
    pub placeholder_justification: String,

    pub default_goal: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(".simtree/store.json"),
            model: ModelConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            command: vec!["simtree-model".to_string()],
            model_name: "Qwen3-32B-thinking-Hackathon".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
            timeout_secs: 120,
            output_limit_bytes: 200_000,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            party_a_label: "Party A".to_string(),
            party_b_label: "Party B".to_string(),
            prompt_budget_bytes: 40_000,
            placeholder_justification: "Previously generated response".to_string(),
            default_goal: "Reach a favorable settlement".to_string(),
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl GenerationConfig {
    pub fn labels(&self) -> RoleLabels {
        RoleLabels::new(self.party_a_label.trim(), self.party_b_label.trim())
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.store_path.as_os_str().is_empty() {
            return Err(anyhow!("store_path must not be empty"));
        }
        if self.model.command.is_empty() || self.model.command[0].trim().is_empty() {
            return Err(anyhow!("model.command must be a non-empty array"));
        }
        if self.model.timeout_secs == 0 {
            return Err(anyhow!("model.timeout_secs must be > 0"));
        }
        if self.model.output_limit_bytes == 0 {
            return Err(anyhow!("model.output_limit_bytes must be > 0"));
        }
        if self.model.max_tokens == 0 {
            return Err(anyhow!("model.max_tokens must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(anyhow!("model.temperature must be within 0.0..=2.0"));
        }
        if self.generation.prompt_budget_bytes == 0 {
            return Err(anyhow!("generation.prompt_budget_bytes must be > 0"));
        }
        let labels = self.generation.labels();
        if labels.party_a.is_empty() || labels.party_b.is_empty() {
            return Err(anyhow!("generation party labels must not be empty"));
        }
        if labels.party_a == labels.party_b {
            return Err(anyhow!("generation party labels must differ"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let tmp_path = path.with_extension("toml.tmp");
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))
}
