/// Evaluation pipeline: analyze, load, run cases, aggregate
///
/// Never returns an error. Each phase that cannot complete falls back to its
/// floor and records a [`Degradation`] next to the breakdown.
use crate::analysis::{AnalysisReport, StaticAnalyzer};
use crate::challenge::Challenge;
use crate::config::settings::HarnessConfig;
use crate::config::types::{Degradation, Phase, Result};
use crate::judge::{FunctionalProbe, LoadOutcome, LoadProbe, SandboxFunctional, SandboxLoader};
use crate::observability::{EventSink, ProgressEvent};
use crate::verdict::score::{aggregate, PhaseResults, ScoreBreakdown, LOAD_POINTS, SYNTAX_POINTS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

/// Scored candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub breakdown: ScoreBreakdown,
    pub analysis: AnalysisReport,
    pub degradations: Vec<Degradation>,
}

impl Evaluation {
    pub fn total(&self) -> u32 {
        self.breakdown.total()
    }
}

/// Anything that can score a persisted candidate for a challenge
pub trait CandidateScorer: Send + Sync {
    fn score(&self, candidate: &Path, challenge: Challenge, sink: &dyn EventSink) -> Evaluation;
}

pub struct Evaluator {
    analyzer: StaticAnalyzer,
    loader: Box<dyn LoadProbe>,
    functional: Box<dyn FunctionalProbe>,
}

impl Evaluator {
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        Ok(Self::with_probes(
            StaticAnalyzer::new(config.convention.clone())?,
            Box::new(SandboxLoader::from_config(config)),
            Box::new(SandboxFunctional::from_config(config)),
        ))
    }

    pub fn with_probes(
        analyzer: StaticAnalyzer,
        loader: Box<dyn LoadProbe>,
        functional: Box<dyn FunctionalProbe>,
    ) -> Self {
        Self {
            analyzer,
            loader,
            functional,
        }
    }

    pub fn evaluate(
        &self,
        candidate: &Path,
        challenge: Challenge,
        sink: &dyn EventSink,
    ) -> Evaluation {
        let mut degradations = Vec::new();

        let started = Instant::now();
        let analysis = match std::fs::read_to_string(candidate) {
            Ok(source) => self.analyzer.analyze(&source),
            Err(e) => {
                log::warn!("candidate {} unreadable: {}", candidate.display(), e);
                AnalysisReport::default()
            }
        };
        let analysis_ms = elapsed_ms(started);

        if !analysis.syntax_ok {
            degradations.push(Degradation::SyntaxInvalid);
            emit_phase(sink, Phase::Syntax, 0, analysis_ms, Some(Degradation::SyntaxInvalid));
            return Evaluation {
                breakdown: ScoreBreakdown::default(),
                analysis,
                degradations,
            };
        }
        emit_phase(sink, Phase::Syntax, SYNTAX_POINTS, analysis_ms, None);
        emit_phase(sink, Phase::Structure, analysis.structure_score(), analysis_ms, None);

        let started = Instant::now();
        let load = match analysis.entry_point.as_deref() {
            Some(entry) => self.loader.load(candidate, entry),
            None => {
                degradations.push(Degradation::MissingEntryPoint);
                LoadOutcome::Failed("no entry class resolved".to_string())
            }
        };
        let load_degradation = load.degradation();
        degradations.extend(load_degradation);
        emit_phase(
            sink,
            Phase::Loads,
            if load.is_loaded() { LOAD_POINTS } else { 0 },
            elapsed_ms(started),
            load_degradation,
        );

        let functionality = match (&load, analysis.entry_point.as_deref()) {
            (LoadOutcome::Loaded, Some(entry)) => {
                let started = Instant::now();
                let report = self.functional.run_functional(candidate, entry, challenge);
                degradations.extend(report.degradation);
                emit_phase(
                    sink,
                    Phase::Functionality,
                    report.score,
                    elapsed_ms(started),
                    report.degradation,
                );
                Some(report.score)
            }
            _ => None,
        };

        let breakdown = aggregate(&PhaseResults {
            syntax_ok: true,
            structure: analysis.structure_score(),
            loads: Some(load.is_loaded()),
            functionality,
        });

        Evaluation {
            breakdown,
            analysis,
            degradations,
        }
    }
}

impl CandidateScorer for Evaluator {
    fn score(&self, candidate: &Path, challenge: Challenge, sink: &dyn EventSink) -> Evaluation {
        self.evaluate(candidate, challenge, sink)
    }
}

fn emit_phase(
    sink: &dyn EventSink,
    phase: Phase,
    points: u32,
    duration_ms: u64,
    degradation: Option<Degradation>,
) {
    sink.emit(&ProgressEvent::PhaseFinished {
        phase,
        points,
        duration_ms,
        degradation,
    });
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::HandlerConvention;
    use crate::judge::FunctionalReport;
    use crate::observability::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const GOOD: &str = r#"
from zephyr.handlers.base import HotHandler

class EchoHandler(HotHandler):
    async def process(self, message):
        return {"type": "echo_response", "payload": "ECHO: " + message["payload"]}
"#;

    struct FixedLoad {
        outcome: LoadOutcome,
        calls: Arc<AtomicUsize>,
    }

    impl LoadProbe for FixedLoad {
        fn load(&self, _candidate: &Path, _entry: &str) -> LoadOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    struct FixedFunctional {
        score: u32,
        calls: Arc<AtomicUsize>,
    }

    impl FunctionalProbe for FixedFunctional {
        fn run_functional(&self, _c: &Path, _e: &str, _ch: Challenge) -> FunctionalReport {
            self.calls.fetch_add(1, Ordering::SeqCst);
            FunctionalReport {
                score: self.score,
                degradation: None,
            }
        }
    }

    fn evaluator(outcome: LoadOutcome, score: u32) -> (Evaluator, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let evaluator = Evaluator::with_probes(
            StaticAnalyzer::new(HandlerConvention::default()).unwrap(),
            Box::new(FixedLoad {
                outcome,
                calls: loads.clone(),
            }),
            Box::new(FixedFunctional {
                score,
                calls: runs.clone(),
            }),
        );
        (evaluator, loads, runs)
    }

    fn candidate(source: &str) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), source).unwrap();
        file
    }

    #[test]
    fn syntax_error_never_reaches_the_probes() {
        let (evaluator, loads, runs) = evaluator(LoadOutcome::Loaded, 50);
        let file = candidate("class Broken(:\n    pass\n");
        let sink = MemorySink::new();
        let evaluation = evaluator.evaluate(file.path(), Challenge::from_level(1).unwrap(), &sink);

        assert_eq!(evaluation.total(), 0);
        assert_eq!(evaluation.degradations, vec![Degradation::SyntaxInvalid]);
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn python2_candidate_never_reaches_the_probes() {
        let (evaluator, loads, runs) = evaluator(LoadOutcome::Loaded, 50);
        let file = candidate(
            "from zephyr.handlers.base import HotHandler\n\nclass EchoHandler(HotHandler):\n    async def process(self, message):\n        print \"got\", message\n        return message\n",
        );
        let sink = MemorySink::new();
        let evaluation = evaluator.evaluate(file.path(), Challenge::from_level(1).unwrap(), &sink);

        assert_eq!(evaluation.total(), 0);
        assert!(!evaluation.analysis.syntax_ok);
        assert_eq!(evaluation.degradations, vec![Degradation::SyntaxInvalid]);
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn load_failure_scores_syntax_plus_structure() {
        let (evaluator, _, runs) = evaluator(LoadOutcome::Failed("boom".to_string()), 50);
        let file = candidate(GOOD);
        let evaluation =
            evaluator.evaluate(file.path(), Challenge::from_level(1).unwrap(), &MemorySink::new());

        assert_eq!(evaluation.total(), 10 + 20);
        assert_eq!(evaluation.degradations, vec![Degradation::LoadFailure]);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn load_timeout_is_recorded() {
        let (evaluator, _, _) = evaluator(LoadOutcome::TimedOut, 50);
        let file = candidate(GOOD);
        let evaluation =
            evaluator.evaluate(file.path(), Challenge::from_level(1).unwrap(), &MemorySink::new());
        assert_eq!(evaluation.total(), 30);
        assert_eq!(evaluation.degradations, vec![Degradation::PhaseTimeout]);
    }

    #[test]
    fn full_pipeline_sums_every_phase() {
        let (evaluator, loads, runs) = evaluator(LoadOutcome::Loaded, 50);
        let file = candidate(GOOD);
        let sink = MemorySink::new();
        let evaluation = evaluator.evaluate(file.path(), Challenge::from_level(1).unwrap(), &sink);

        assert_eq!(evaluation.total(), 100);
        assert!(evaluation.degradations.is_empty());
        assert_eq!(evaluation.analysis.entry_point.as_deref(), Some("EchoHandler"));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let phases: Vec<Phase> = sink
            .events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::PhaseFinished { phase, .. } => Some(phase),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![Phase::Syntax, Phase::Structure, Phase::Loads, Phase::Functionality]
        );
    }

    #[test]
    fn missing_entry_point_skips_the_loader() {
        let (evaluator, loads, _) = evaluator(LoadOutcome::Loaded, 50);
        let file = candidate("import os\n\nclass Helper:\n    pass\n");
        let evaluation =
            evaluator.evaluate(file.path(), Challenge::from_level(1).unwrap(), &MemorySink::new());

        assert_eq!(evaluation.total(), 10);
        assert!(evaluation.degradations.contains(&Degradation::MissingEntryPoint));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unreadable_candidate_scores_zero() {
        let (evaluator, _, _) = evaluator(LoadOutcome::Loaded, 50);
        let evaluation = evaluator.evaluate(
            Path::new("/nonexistent/scorebox/handler.py"),
            Challenge::from_level(1).unwrap(),
            &MemorySink::new(),
        );
        assert_eq!(evaluation.total(), 0);
    }
}
