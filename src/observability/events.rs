/// Structured progress events and the sinks that consume them
///
/// Scoring code never prints. It hands a [`ProgressEvent`] to an injected
/// [`EventSink`]; rendering to the log, a JSONL trail or a test buffer is the
/// sink's business.
use crate::config::types::{Degradation, Phase, Result, ScoreboxError};
use crate::verdict::score::ScoreBreakdown;
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One observable step of a challenge run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    RunStarted {
        model: String,
        challenge: String,
        max_attempts: u32,
    },
    AttemptStarted {
        attempt: u32,
    },
    GenerationFailed {
        attempt: u32,
        error: String,
    },
    CandidatePersisted {
        attempt: u32,
        path: PathBuf,
    },
    PhaseFinished {
        phase: Phase,
        points: u32,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        degradation: Option<Degradation>,
    },
    AttemptScored {
        attempt: u32,
        breakdown: ScoreBreakdown,
        total: u32,
        duration_ms: u64,
    },
    FinalHandlerWritten {
        path: PathBuf,
    },
    RunFinished {
        model: String,
        challenge: String,
        best_score: u32,
        passed: bool,
        attempts: u32,
    },
}

/// Consumer of progress events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &ProgressEvent) {}
}

/// Renders events through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted {
                model,
                challenge,
                max_attempts,
            } => info!(
                "{} / {}: starting (up to {} attempts)",
                model, challenge, max_attempts
            ),
            ProgressEvent::AttemptStarted { attempt } => info!("attempt {}", attempt),
            ProgressEvent::GenerationFailed { attempt, error } => {
                warn!("attempt {}: generation failed: {}", attempt, error)
            }
            ProgressEvent::CandidatePersisted { attempt, path } => {
                debug!("attempt {}: saved {}", attempt, path.display())
            }
            ProgressEvent::PhaseFinished {
                phase,
                points,
                duration_ms,
                degradation,
            } => match degradation {
                Some(d) => debug!("  {}: {} pts in {}ms ({})", phase, points, duration_ms, d),
                None => debug!("  {}: {} pts in {}ms", phase, points, duration_ms),
            },
            ProgressEvent::AttemptScored {
                attempt,
                breakdown,
                total,
                duration_ms,
            } => info!(
                "attempt {}: {}/100 (syntax {}, structure {}, loads {}, functionality {}) in {}ms",
                attempt,
                total,
                breakdown.syntax,
                breakdown.structure,
                breakdown.loads,
                breakdown.functionality,
                duration_ms
            ),
            ProgressEvent::FinalHandlerWritten { path } => {
                info!("final handler: {}", path.display())
            }
            ProgressEvent::RunFinished {
                model,
                challenge,
                best_score,
                passed,
                attempts,
            } => info!(
                "{} / {}: best {}/100 after {} attempt(s), {}",
                model,
                challenge,
                best_score,
                attempts,
                if *passed { "PASSED" } else { "FAILED" }
            ),
        }
    }
}

/// Appends one JSON object per event to a file
pub struct JsonlSink {
    file: Mutex<File>,
    path: PathBuf,
}

impl JsonlSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ScoreboxError::Config(format!(
                    "Failed to create event log directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                ScoreboxError::Config(format!(
                    "Failed to open event log {}: {}",
                    path.display(),
                    e
                ))
            })?;

        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonlSink {
    fn emit(&self, event: &ProgressEvent) {
        let mut record = match serde_json::to_value(event) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to serialize progress event: {}", e);
                return;
            }
        };
        record["timestamp"] = serde_json::json!(Utc::now().to_rfc3339());
        let line = record.to_string();

        match self.file.lock() {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
                    warn!("Failed to write event log {}: {}", self.path.display(), e);
                }
            }
            Err(_) => warn!("Failed to acquire lock on event log"),
        }
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Forwards every event to each inner sink in order
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &ProgressEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
