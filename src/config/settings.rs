/// Configuration loading from scorebox.json
use crate::config::types::{Result, ScoreboxError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file looked up in the current directory
pub const DEFAULT_CONFIG_FILE: &str = "scorebox.json";

/// Environment variable holding a comma-separated model list for `run-all`
pub const MODELS_ENV: &str = "TEST_MODELS";

/// Full scorebox.json structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Interpreter used for sandbox children
    pub python: String,
    /// Extra import roots exported as PYTHONPATH to sandbox children
    pub python_path: Vec<PathBuf>,
    /// Root of persisted candidate files
    pub output_dir: PathBuf,
    /// JSON array of challenge runs
    pub results_file: PathBuf,
    /// Optional JSONL progress event log
    pub event_log: Option<PathBuf>,
    /// Challenge descriptions (`<slug>.md`)
    pub challenges_dir: PathBuf,
    /// Handler templates offered to the model
    pub templates_dir: PathBuf,
    /// Models exercised by `run-all`
    pub models: Vec<String>,
    pub retry: RetryConfig,
    pub sandbox: SandboxConfig,
    pub convention: HandlerConvention,
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Hard cap on attempts per challenge run
    pub max_attempts: u32,
    /// Minimum total that stops retrying and marks the run passed
    pub pass_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    pub load_timeout_secs: u64,
    pub functional_timeout_secs: u64,
    /// Per-stream capture limit for child output
    pub output_limit_bytes: usize,
    pub mock_context: MockContext,
}

/// Plain-data stand-in for the node a handler is constructed with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MockContext {
    pub name: String,
    pub machine_id: String,
}

/// The one rule that names a candidate's entry point.
///
/// The static analyzer resolves the entry class with it and the sandbox
/// children are told that name; neither side scans a namespace on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HandlerConvention {
    /// Module an import statement must reference
    pub base_module: String,
    /// Base class the handler must derive from
    pub base_type: String,
    /// Message entry method on the handler class
    pub entry_method: String,
    /// Name suffix accepted when no class derives from `base_type`
    pub entry_suffix: String,
    /// Optional lifecycle hook awaited before the cases run
    pub activate_hook: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command run with the prompt on stdin; `{model}` is substituted
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            python_path: Vec::new(),
            output_dir: PathBuf::from("generated"),
            results_file: PathBuf::from("evaluation").join("results.json"),
            event_log: None,
            challenges_dir: PathBuf::from("challenges"),
            templates_dir: PathBuf::from("templates"),
            models: Vec::new(),
            retry: RetryConfig::default(),
            sandbox: SandboxConfig::default(),
            convention: HandlerConvention::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            pass_threshold: 70,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            load_timeout_secs: 5,
            functional_timeout_secs: 10,
            output_limit_bytes: 1024 * 1024,
            mock_context: MockContext::default(),
        }
    }
}

impl Default for MockContext {
    fn default() -> Self {
        Self {
            name: "TestNode".to_string(),
            machine_id: "test-123".to_string(),
        }
    }
}

impl Default for HandlerConvention {
    fn default() -> Self {
        Self {
            base_module: "zephyr.handlers.base".to_string(),
            base_type: "HotHandler".to_string(),
            entry_method: "process".to_string(),
            entry_suffix: "Handler".to_string(),
            activate_hook: "activate".to_string(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "ollama".to_string(),
                "run".to_string(),
                "{model}".to_string(),
            ],
            timeout_secs: 300,
        }
    }
}

impl SandboxConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn functional_timeout(&self) -> Duration {
        Duration::from_secs(self.functional_timeout_secs)
    }
}

impl HarnessConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScoreboxError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: HarnessConfig = serde_json::from_str(&content).map_err(|e| {
            ScoreboxError::Config(format!(
                "Failed to parse config JSON {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load ./scorebox.json if present, otherwise built-in defaults
    pub fn load_default() -> Result<Self> {
        let config_path = std::env::current_dir()
            .map_err(|e| ScoreboxError::Config(format!("Failed to get current directory: {}", e)))?
            .join(DEFAULT_CONFIG_FILE);

        if !config_path.exists() {
            log::debug!("{} not found, using built-in defaults", DEFAULT_CONFIG_FILE);
            return Ok(Self::default());
        }

        Self::load_from_file(config_path)
    }

    /// Explicit path wins; otherwise fall back to [`HarnessConfig::load_default`]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load_default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(ScoreboxError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.pass_threshold > crate::verdict::score::MAX_TOTAL {
            return Err(ScoreboxError::Config(format!(
                "retry.pass_threshold {} exceeds the maximum total of {}",
                self.retry.pass_threshold,
                crate::verdict::score::MAX_TOTAL
            )));
        }
        if self.sandbox.load_timeout_secs == 0 || self.sandbox.functional_timeout_secs == 0 {
            return Err(ScoreboxError::Config(
                "sandbox timeouts must be non-zero".to_string(),
            ));
        }
        if self.generator.command.is_empty() {
            return Err(ScoreboxError::Config(
                "generator.command must name a program".to_string(),
            ));
        }
        if self.python.trim().is_empty() {
            return Err(ScoreboxError::Config(
                "python interpreter must be set".to_string(),
            ));
        }
        Ok(())
    }

    /// Models for `run-all`: `TEST_MODELS` when set and non-empty, else `models`
    pub fn resolve_models(&self) -> Vec<String> {
        let from_env = std::env::var(MODELS_ENV).ok().map(|raw| parse_model_list(&raw));
        match from_env {
            Some(models) if !models.is_empty() => models,
            _ => self.models.clone(),
        }
    }
}

fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_budget() {
        let config = HarnessConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.pass_threshold, 70);
        assert_eq!(config.sandbox.load_timeout(), Duration::from_secs(5));
        assert_eq!(config.sandbox.functional_timeout(), Duration::from_secs(10));
        assert_eq!(config.convention.base_type, "HotHandler");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: HarnessConfig =
            serde_json::from_str(r#"{"retry": {"max_attempts": 5}, "python": "python3.11"}"#)
                .unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.pass_threshold, 70);
        assert_eq!(config.python, "python3.11");
        assert_eq!(config.sandbox.mock_context.machine_id, "test-123");
    }

    #[test]
    fn validate_rejects_zero_attempts_and_oversized_threshold() {
        let mut config = HarnessConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.retry.pass_threshold = 101;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.generator.command.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_file_reports_parse_errors_as_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scorebox.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = HarnessConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, ScoreboxError::Config(_)));
    }

    #[test]
    fn model_list_parsing_drops_blanks() {
        assert_eq!(
            parse_model_list(" qwen2.5-coder:1.5b, ,gemma3:1b,"),
            vec!["qwen2.5-coder:1.5b".to_string(), "gemma3:1b".to_string()]
        );
        assert!(parse_model_list("").is_empty());
    }
}
