//! Model backend abstraction.
//!
//! The [`ModelClient`] trait decouples the dialogue generator from whatever
//! actually produces completions. The bundled [`CommandModel`] pipes an
//! OpenAI-style chat request (JSON) into an external command and reads the
//! assistant text from its stdout. Tests use scripted clients that return
//! queued replies without spawning anything.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::io::config::ModelConfig;
use crate::io::process::run_with_input;

/// One completion request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// JSON Schema the reply is expected to satisfy. Backends may pass it on
    /// as a structured-output hint; the generator validates regardless.
    pub response_schema: Value,
    pub model_name: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl ModelRequest {
    /// Wire form handed to command backends.
    pub fn to_chat_payload(&self) -> Value {
        json!({
            "model": self.model_name,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": self.user_prompt },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": { "name": "scenarios_tree", "schema": self.response_schema },
            },
        })
    }
}

/// Produces raw completion text for a request.
pub trait ModelClient {
    /// Returns the model's raw reply. Transport failures, timeouts and
    /// non-zero exits are errors; malformed content is not.
    fn complete(&self, request: &ModelRequest) -> Result<String>;
}

impl<M: ModelClient + ?Sized> ModelClient for &M {
    fn complete(&self, request: &ModelRequest) -> Result<String> {
        (**self).complete(request)
    }
}

/// Model backend that runs an external command per request.
#[derive(Debug, Clone)]
pub struct CommandModel {
    argv: Vec<String>,
    output_limit_bytes: usize,
}

impl CommandModel {
    pub fn new(argv: Vec<String>, output_limit_bytes: usize) -> Result<Self> {
        if argv.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(anyhow!("model command must name a program"));
        }
        Ok(Self {
            argv,
            output_limit_bytes,
        })
    }

    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        Self::new(cfg.command.clone(), cfg.output_limit_bytes)
    }
}

impl ModelClient for CommandModel {
    #[instrument(skip_all, fields(program = %self.argv[0], model = %request.model_name))]
    fn complete(&self, request: &ModelRequest) -> Result<String> {
        info!("calling model backend");
        let payload =
            serde_json::to_vec(&request.to_chat_payload()).context("serialize model request")?;

        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]);

        let output = run_with_input(cmd, &payload, request.timeout, self.output_limit_bytes)
            .with_context(|| format!("run model backend {}", self.argv[0]))?;

        if output.timed_out {
            return Err(anyhow!("model backend timed out after {:?}", request.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "model backend failed");
            return Err(anyhow!(
                "model backend exited with status {:?}: {}",
                output.status.code(),
                output.stderr_tail(2_000)
            ));
        }
        if output.stdout_dropped > 0 {
            return Err(anyhow!(
                "model reply exceeded {} bytes",
                self.output_limit_bytes
            ));
        }

        String::from_utf8(output.stdout).context("model reply is not UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(timeout: Duration) -> ModelRequest {
        ModelRequest {
            system_prompt: "system".to_string(),
            user_prompt: "user".to_string(),
            response_schema: json!({"type": "object"}),
            model_name: "test-model".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
            timeout,
        }
    }

    #[test]
    fn payload_carries_both_messages_and_parameters() {
        let payload = request(Duration::from_secs(1)).to_chat_payload();
        assert_eq!(payload["model"], "test-model");
        assert_eq!(payload["max_tokens"], 4000);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "user");
        assert_eq!(
            payload["response_format"]["json_schema"]["schema"]["type"],
            "object"
        );
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandModel::new(Vec::new(), 10).is_err());
        assert!(CommandModel::new(vec![" ".to_string()], 10).is_err());
    }

    #[cfg(unix)]
    fn sh(script: &str) -> CommandModel {
        CommandModel::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            4096,
        )
        .expect("command")
    }

    #[cfg(unix)]
    #[test]
    fn backend_receives_request_on_stdin() {
        let model = sh("cat");
        let reply = model
            .complete(&request(Duration::from_secs(10)))
            .expect("complete");
        let echoed: Value = serde_json::from_str(&reply).expect("json");
        assert_eq!(echoed["messages"][0]["content"], "system");
    }

    #[cfg(unix)]
    #[test]
    fn failing_backend_reports_stderr() {
        let model = sh("cat >/dev/null; echo 'quota exceeded' >&2; exit 7");
        let err = model
            .complete(&request(Duration::from_secs(10)))
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("Some(7)"));
        assert!(message.contains("quota exceeded"));
    }

    #[cfg(unix)]
    #[test]
    fn slow_backend_times_out() {
        let model = sh("exec sleep 5");
        let err = model
            .complete(&request(Duration::from_millis(200)))
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
