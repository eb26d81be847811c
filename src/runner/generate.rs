/// Generation backend
///
/// [`Generator`] is the seam the controller calls; [`CommandGenerator`] runs a
/// local model CLI (by default `ollama run <model>`) with the prompt on stdin.
use crate::config::settings::GeneratorConfig;
use crate::config::types::{Result, ScoreboxError};
use crate::sandbox::{run_sandboxed, SandboxCommand};
use std::time::Duration;

/// Placeholder replaced by the model id in every command argument
pub const MODEL_PLACEHOLDER: &str = "{model}";

const RESPONSE_LIMIT: usize = 4 * 1024 * 1024;
const FORWARDED_ENV: &[&str] = &["OLLAMA_HOST", "OLLAMA_MODELS"];
const STDERR_EXCERPT: usize = 200;

pub trait Generator: Send + Sync {
    fn generate(&self, model: &str, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::new(config.command.clone(), Duration::from_secs(config.timeout_secs))
    }

    fn build(&self, model: &str, prompt: &str) -> Result<SandboxCommand> {
        let mut parts = self
            .command
            .iter()
            .map(|part| part.replace(MODEL_PLACEHOLDER, model));
        let program = parts
            .next()
            .ok_or_else(|| ScoreboxError::Config("generator.command is empty".to_string()))?;

        let mut command = SandboxCommand::new(program, self.timeout)
            .args(parts)
            .stdin(prompt.as_bytes().to_vec())
            .output_limit(RESPONSE_LIMIT);
        for key in FORWARDED_ENV {
            if let Ok(value) = std::env::var(key) {
                command = command.env(*key, value);
            }
        }
        Ok(command)
    }
}

impl Generator for CommandGenerator {
    fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let command = self.build(model, prompt)?;
        let output = run_sandboxed(&command)
            .map_err(|e| ScoreboxError::Generation(format!("{model}: {e}")))?;

        if output.timed_out {
            return Err(ScoreboxError::Generation(format!(
                "{model}: no response within {:?}",
                self.timeout
            )));
        }
        if !output.success() {
            let stderr: String = output.stderr.trim().chars().take(STDERR_EXCERPT).collect();
            return Err(ScoreboxError::Generation(format!(
                "{model}: backend exited with {:?}: {}",
                output.exit_code, stderr
            )));
        }
        if output.stdout.trim().is_empty() {
            return Err(ScoreboxError::Generation(format!("{model}: empty response")));
        }
        Ok(output.stdout)
    }
}
