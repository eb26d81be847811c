/// Prompt construction for a challenge
///
/// The controller only sees [`PromptSource`]. [`TemplatePrompt`] reads the
/// challenge description and a level-appropriate handler template from disk.
use crate::challenge::Challenge;
use crate::config::settings::HarnessConfig;
use crate::config::types::{Result, ScoreboxError};
use std::fs;
use std::path::{Path, PathBuf};

pub trait PromptSource: Send + Sync {
    fn prompt(&self, model: &str, challenge: Challenge) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct TemplatePrompt {
    challenges_dir: PathBuf,
    templates_dir: PathBuf,
}

impl TemplatePrompt {
    pub fn new(challenges_dir: impl Into<PathBuf>, templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            challenges_dir: challenges_dir.into(),
            templates_dir: templates_dir.into(),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(&config.challenges_dir, &config.templates_dir)
    }

    fn description(&self, challenge: Challenge) -> Result<String> {
        let path = self.challenges_dir.join(format!("{}.md", challenge.slug()));
        match read_optional(&path)? {
            Some(text) => Ok(text),
            None => {
                log::debug!("{} missing; using built-in description", path.display());
                Ok(builtin_description(challenge).to_string())
            }
        }
    }

    fn template(&self, challenge: Challenge) -> Result<Option<String>> {
        read_optional(&self.templates_dir.join(template_for_level(challenge.level())))
    }
}

impl PromptSource for TemplatePrompt {
    fn prompt(&self, _model: &str, challenge: Challenge) -> Result<String> {
        let description = self.description(challenge)?;
        let requirements = markdown_section(&description, "Requirements")
            .unwrap_or_else(|| description.trim().to_string());
        let test_cases = markdown_section(&description, "Test Cases");

        let mut prompt = String::from("Create a Python handler for the Zephyr network.\n\n");
        if let Some(template) = self.template(challenge)? {
            prompt.push_str("TEMPLATE TO MODIFY:\n```python\n");
            prompt.push_str(template.trim_end());
            prompt.push_str("\n```\n\n");
        }
        prompt.push_str("REQUIREMENTS:\n");
        prompt.push_str(&requirements);
        prompt.push_str("\n\n");
        if let Some(cases) = test_cases {
            prompt.push_str("TEST CASES:\n");
            prompt.push_str(&cases);
            prompt.push_str("\n\n");
        }
        prompt.push_str(
            "IMPORTANT:\n\
             - Keep all imports and base class inheritance\n\
             - Return complete, working Python code\n\n\
             OUTPUT (complete handler code):\n```python",
        );
        Ok(prompt)
    }
}

/// Template file offered for a level
pub fn template_for_level(level: u8) -> &'static str {
    match level {
        1 => "minimal_handler.py",
        2 | 3 => "stateful_handler.py",
        _ => "broadcast_handler.py",
    }
}

fn builtin_description(challenge: Challenge) -> &'static str {
    match challenge.level() {
        1 => "Write a handler that answers `echo` messages with an `echo_response` whose payload is `ECHO: ` followed by the original payload.",
        2 => "Write a handler that counts every message it processes and answers `stats` messages with a `stats_response` carrying `total_messages`.",
        3 => "Write a handler that collects incoming data messages and reports what it has collected on request.",
        4 => "Write a handler that executes requested tasks and broadcasts their results to the network.",
        _ => "Write a handler that keeps shared state synchronised across nodes using broadcasts.",
    }
}

/// Non-blank lines under `## <title>` up to the next heading
fn markdown_section(markdown: &str, title: &str) -> Option<String> {
    let heading = format!("## {title}");
    let lines: Vec<&str> = markdown
        .lines()
        .skip_while(|line| !line.contains(&heading))
        .skip(1)
        .take_while(|line| !line.starts_with("##"))
        .filter(|line| !line.trim().is_empty())
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ScoreboxError::Generation(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}
