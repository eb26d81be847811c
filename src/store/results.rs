/// Durable record of every challenge run
///
/// The store is one JSON array. Each append loads the whole array, pushes the
/// new run and writes the result to a sibling temp file that is renamed over
/// the original. There is no locking: one writer per results file.
use crate::config::types::{Degradation, Result, ScoreboxError};
use crate::verdict::score::ScoreBreakdown;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One generate/persist/evaluate cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degradations: Vec<Degradation>,
    /// Hex SHA-256 of the persisted source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,
}

impl AttemptRecord {
    /// Zero-score attempt that never produced a scoreable candidate
    pub fn failed(attempt: u32, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            attempt,
            score: 0,
            breakdown: None,
            path: None,
            error: Some(error.into()),
            duration_ms,
            degradations: vec![Degradation::GenerationFailure],
            source_sha256: None,
        }
    }
}

/// All attempts for one (model, challenge) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeRun {
    pub model: String,
    pub challenge: String,
    pub level: u8,
    pub timestamp: DateTime<Utc>,
    pub best_score: u32,
    pub passed: bool,
    #[serde(default)]
    pub best_attempt: Option<u32>,
    pub attempts: Vec<AttemptRecord>,
    #[serde(default)]
    pub final_handler: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored run, oldest first; a missing file is an empty store
    pub fn load(&self) -> Result<Vec<ChallengeRun>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ScoreboxError::Store(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            ScoreboxError::Store(format!(
                "{} is not a JSON array of runs: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Append one run, leaving earlier runs untouched
    pub fn append(&self, run: &ChallengeRun) -> Result<()> {
        let mut runs = self.load()?;
        runs.push(run.clone());
        self.write_all(&runs)
    }

    fn write_all(&self, runs: &[ChallengeRun]) -> Result<()> {
        let json = serde_json::to_string_pretty(runs)?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| {
            ScoreboxError::Store(format!("Failed to create {}: {}", parent.display(), e))
        })?;

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "results.json".to_string());
        let temp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        fs::write(&temp, json).map_err(|e| {
            ScoreboxError::Store(format!("Failed to write {}: {}", temp.display(), e))
        })?;
        fs::rename(&temp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            ScoreboxError::Store(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

/// Per-model roll-up of stored runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model: String,
    pub runs: usize,
    pub passed: usize,
    pub total_best_score: u32,
}

impl ModelSummary {
    pub fn average_score(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            f64::from(self.total_best_score) / self.runs as f64
        }
    }
}

/// Group runs by model, in order of first appearance
pub fn summarize(runs: &[ChallengeRun]) -> Vec<ModelSummary> {
    let mut summaries: Vec<ModelSummary> = Vec::new();
    for run in runs {
        let index = match summaries.iter().position(|s| s.model == run.model) {
            Some(index) => index,
            None => {
                summaries.push(ModelSummary {
                    model: run.model.clone(),
                    runs: 0,
                    passed: 0,
                    total_best_score: 0,
                });
                summaries.len() - 1
            }
        };
        let summary = &mut summaries[index];
        summary.runs += 1;
        summary.total_best_score += run.best_score;
        if run.passed {
            summary.passed += 1;
        }
    }
    summaries
}
