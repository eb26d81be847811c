//! Candidate judging.
//!
//! The evaluator runs the phases in order: static analysis in-process, then
//! the loader and functional probes in isolated Python children. Probes are
//! traits so the pipeline can be driven without an interpreter.

pub mod evaluator;
pub mod functional;
pub mod loader;

use crate::challenge::Challenge;
use crate::config::settings::HarnessConfig;
use crate::config::types::Degradation;
use crate::sandbox::SandboxCommand;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use evaluator::{CandidateScorer, Evaluation, Evaluator};
pub use functional::SandboxFunctional;
pub use loader::SandboxLoader;

/// Result of trying to instantiate a candidate's entry class
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Failed(String),
    TimedOut,
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded)
    }

    pub fn degradation(&self) -> Option<Degradation> {
        match self {
            LoadOutcome::Loaded => None,
            LoadOutcome::Failed(_) => Some(Degradation::LoadFailure),
            LoadOutcome::TimedOut => Some(Degradation::PhaseTimeout),
        }
    }
}

/// Points earned by the functional phase, already clamped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionalReport {
    pub score: u32,
    pub degradation: Option<Degradation>,
}

/// Instantiation check contract
pub trait LoadProbe: Send + Sync {
    fn load(&self, candidate: &Path, entry: &str) -> LoadOutcome;
}

/// Functional case runner contract
pub trait FunctionalProbe: Send + Sync {
    fn run_functional(&self, candidate: &Path, entry: &str, challenge: Challenge)
        -> FunctionalReport;
}

/// How sandbox children invoke the interpreter
#[derive(Debug, Clone)]
pub struct PythonRuntime {
    pub python: String,
    pub python_path: Vec<PathBuf>,
    pub output_limit: usize,
}

impl PythonRuntime {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            python: config.python.clone(),
            python_path: config.python_path.clone(),
            output_limit: config.sandbox.output_limit_bytes,
        }
    }

    /// `python -B` with the child environment set up; callers append the script
    pub fn command(&self, timeout: Duration) -> SandboxCommand {
        let mut command = SandboxCommand::new(self.python.clone(), timeout)
            .arg("-B")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .output_limit(self.output_limit);

        if !self.python_path.is_empty() {
            match std::env::join_paths(&self.python_path) {
                Ok(joined) => {
                    command = command.env("PYTHONPATH", joined.to_string_lossy().into_owned());
                }
                Err(e) => log::warn!("python_path not exported: {}", e),
            }
        }
        command
    }
}
