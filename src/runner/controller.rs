/// Retry controller
///
/// Drives generate -> persist -> evaluate -> decide for one (model, challenge)
/// pair until an attempt reaches the pass threshold or the attempt budget is
/// spent, then writes the final handler and appends the run to the store.
///
/// Nothing an attempt does can abort the run. Only the result store write at
/// the end returns an error.
use crate::challenge::Challenge;
use crate::config::settings::{HarnessConfig, RetryConfig};
use crate::config::types::{Degradation, Result};
use crate::judge::evaluator::elapsed_ms;
use crate::judge::{CandidateScorer, Evaluator};
use crate::observability::{EventSink, ProgressEvent};
use crate::runner::extract::extract_code;
use crate::runner::generate::{CommandGenerator, Generator};
use crate::runner::prompt::{PromptSource, TemplatePrompt};
use crate::store::{AttemptRecord, CandidateWorkspace, ChallengeRun, ResultStore};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Attempt budget and stop rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub pass_threshold: u32,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            pass_threshold: config.pass_threshold,
        }
    }
}

/// Where the controller is in the attempt loop
#[derive(Debug)]
enum ControllerState {
    Start,
    Generate,
    Persist { source: String },
    Evaluate { path: PathBuf, sha256: String },
    Decide { record: AttemptRecord },
    Finalize,
    Done(Box<ChallengeRun>),
}

/// Best candidate so far; ties keep the earliest
#[derive(Debug, Clone)]
struct BestCandidate {
    attempt: u32,
    score: u32,
    path: PathBuf,
}

pub struct RetryController {
    prompts: Arc<dyn PromptSource>,
    generator: Arc<dyn Generator>,
    scorer: Arc<dyn CandidateScorer>,
    sink: Arc<dyn EventSink>,
    workspace: CandidateWorkspace,
    store: ResultStore,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(
        prompts: Arc<dyn PromptSource>,
        generator: Arc<dyn Generator>,
        scorer: Arc<dyn CandidateScorer>,
        sink: Arc<dyn EventSink>,
        workspace: CandidateWorkspace,
        store: ResultStore,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            prompts,
            generator,
            scorer,
            sink,
            workspace,
            store,
            policy,
        }
    }

    /// Production wiring: template prompts, command generator, sandbox evaluator
    pub fn from_config(config: &HarnessConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        Ok(Self::new(
            Arc::new(TemplatePrompt::from_config(config)),
            Arc::new(CommandGenerator::from_config(&config.generator)),
            Arc::new(Evaluator::from_config(config)?),
            sink,
            CandidateWorkspace::new(&config.output_dir),
            ResultStore::new(&config.results_file),
            RetryPolicy::from(&config.retry),
        ))
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy.max_attempts = max_attempts.max(1);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn run(&self, model: &str, challenge: Challenge) -> Result<ChallengeRun> {
        let timestamp = Utc::now();
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut best: Option<BestCandidate> = None;
        let mut passed = false;
        let mut attempt = 0u32;
        let mut attempt_started = Instant::now();

        let mut state = ControllerState::Start;
        loop {
            state = match state {
                ControllerState::Start => {
                    self.sink.emit(&ProgressEvent::RunStarted {
                        model: model.to_string(),
                        challenge: challenge.slug(),
                        max_attempts: self.policy.max_attempts,
                    });
                    ControllerState::Generate
                }

                ControllerState::Generate => {
                    attempt += 1;
                    attempt_started = Instant::now();
                    self.sink.emit(&ProgressEvent::AttemptStarted { attempt });

                    let response = self
                        .prompts
                        .prompt(model, challenge)
                        .and_then(|prompt| self.generator.generate(model, &prompt));
                    match response {
                        Ok(response) => ControllerState::Persist {
                            source: extract_code(&response),
                        },
                        Err(e) => self.failed_attempt(attempt, e.to_string(), attempt_started),
                    }
                }

                ControllerState::Persist { source } => {
                    match self.workspace.persist(model, challenge, attempt, &source) {
                        Ok(path) => {
                            self.sink.emit(&ProgressEvent::CandidatePersisted {
                                attempt,
                                path: path.clone(),
                            });
                            ControllerState::Evaluate {
                                path,
                                sha256: sha256_hex(&source),
                            }
                        }
                        Err(e) => self.failed_attempt(
                            attempt,
                            format!("persist failed: {e}"),
                            attempt_started,
                        ),
                    }
                }

                ControllerState::Evaluate { path, sha256 } => {
                    let evaluation = self.scorer.score(&path, challenge, self.sink.as_ref());
                    let duration_ms = elapsed_ms(attempt_started);
                    self.sink.emit(&ProgressEvent::AttemptScored {
                        attempt,
                        breakdown: evaluation.breakdown,
                        total: evaluation.total(),
                        duration_ms,
                    });
                    ControllerState::Decide {
                        record: AttemptRecord {
                            attempt,
                            score: evaluation.total(),
                            breakdown: Some(evaluation.breakdown),
                            path: Some(path),
                            error: None,
                            duration_ms,
                            degradations: evaluation.degradations,
                            source_sha256: Some(sha256),
                        },
                    }
                }

                ControllerState::Decide { record } => {
                    if let Some(path) = &record.path {
                        let improves = best.as_ref().map_or(true, |b| record.score > b.score);
                        if improves {
                            best = Some(BestCandidate {
                                attempt: record.attempt,
                                score: record.score,
                                path: path.clone(),
                            });
                        }
                    }
                    let reached = record.score >= self.policy.pass_threshold;
                    attempts.push(record);

                    if reached {
                        passed = true;
                        ControllerState::Finalize
                    } else if attempt < self.policy.max_attempts {
                        ControllerState::Generate
                    } else {
                        ControllerState::Finalize
                    }
                }

                ControllerState::Finalize => {
                    let final_handler = best.as_ref().and_then(|b| {
                        match self.workspace.finalize(model, challenge, &b.path) {
                            Ok(path) => {
                                self.sink
                                    .emit(&ProgressEvent::FinalHandlerWritten { path: path.clone() });
                                Some(path)
                            }
                            Err(e) => {
                                log::warn!("final handler for {} not written: {}", challenge, e);
                                None
                            }
                        }
                    });

                    let run = ChallengeRun {
                        model: model.to_string(),
                        challenge: challenge.slug(),
                        level: challenge.level(),
                        timestamp,
                        best_score: best.as_ref().map_or(0, |b| b.score),
                        passed,
                        best_attempt: best.as_ref().map(|b| b.attempt),
                        attempts: std::mem::take(&mut attempts),
                        final_handler,
                    };
                    self.store.append(&run)?;

                    self.sink.emit(&ProgressEvent::RunFinished {
                        model: run.model.clone(),
                        challenge: run.challenge.clone(),
                        best_score: run.best_score,
                        passed: run.passed,
                        attempts: u32::try_from(run.attempts.len()).unwrap_or(u32::MAX),
                    });
                    ControllerState::Done(Box::new(run))
                }

                ControllerState::Done(run) => return Ok(*run),
            };
        }
    }

    fn failed_attempt(&self, attempt: u32, error: String, started: Instant) -> ControllerState {
        self.sink.emit(&ProgressEvent::GenerationFailed {
            attempt,
            error: error.clone(),
        });
        ControllerState::Decide {
            record: AttemptRecord::failed(attempt, error, elapsed_ms(started)),
        }
    }
}

fn sha256_hex(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Degradations across a run's attempts, first occurrence order
pub fn run_degradations(run: &ChallengeRun) -> Vec<Degradation> {
    let mut seen = Vec::new();
    for degradation in run.attempts.iter().flat_map(|a| a.degradations.iter()) {
        if !seen.contains(degradation) {
            seen.push(*degradation);
        }
    }
    seen
}
