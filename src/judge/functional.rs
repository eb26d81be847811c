/// Functional test runner
///
/// Writes the fixed driver script to a fresh temp file, hands it the cases as
/// JSON on stdin and reads back a single `SCORE:` line. Whatever the child
/// reports is clamped to the functional ceiling.
use crate::challenge::cases::FunctionalCase;
use crate::challenge::Challenge;
use crate::config::settings::{HandlerConvention, HarnessConfig, MockContext};
use crate::config::types::{Degradation, Result, ScoreboxError};
use crate::judge::{FunctionalProbe, FunctionalReport, PythonRuntime};
use crate::sandbox::run_sandboxed;
use crate::sandbox::scripts::{functional_script, SCORE_PREFIX};
use crate::verdict::score::FUNCTIONAL_MAX;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Awarded when the optional activate hook exists and returns without raising
pub const ACTIVATE_POINTS: u32 = 10;

#[derive(Debug, Clone)]
pub struct SandboxFunctional {
    runtime: PythonRuntime,
    timeout: Duration,
    context: MockContext,
    convention: HandlerConvention,
    script_dir: PathBuf,
}

/// Data handed to the driver on stdin
#[derive(Serialize)]
struct DriverPlan<'a> {
    candidate: String,
    entry: &'a str,
    context: &'a MockContext,
    activate_hook: &'a str,
    activate_points: u32,
    entry_method: &'a str,
    cases: &'a [FunctionalCase],
}

/// Driver script on disk, removed when dropped
struct TempScript {
    path: PathBuf,
}

impl TempScript {
    fn write(dir: &Path, source: &str) -> Result<Self> {
        let path = dir.join(format!("scorebox-functional-{}.py", Uuid::new_v4()));
        fs::write(&path, source).map_err(|e| {
            ScoreboxError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write driver script {}: {}", path.display(), e),
            ))
        })?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempScript {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("driver script {} not removed: {}", self.path.display(), e);
        }
    }
}

impl SandboxFunctional {
    pub fn new(
        runtime: PythonRuntime,
        timeout: Duration,
        context: MockContext,
        convention: HandlerConvention,
    ) -> Self {
        Self {
            runtime,
            timeout,
            context,
            convention,
            script_dir: std::env::temp_dir(),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            PythonRuntime::from_config(config),
            config.sandbox.functional_timeout(),
            config.sandbox.mock_context.clone(),
            config.convention.clone(),
        )
    }

    /// Directory the temp driver scripts are written to
    pub fn with_script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_dir = dir.into();
        self
    }

    fn drive(
        &self,
        candidate: &Path,
        entry: &str,
        cases: &[FunctionalCase],
    ) -> Result<FunctionalReport> {
        let plan = DriverPlan {
            candidate: candidate.to_string_lossy().into_owned(),
            entry,
            context: &self.context,
            activate_hook: &self.convention.activate_hook,
            activate_points: ACTIVATE_POINTS,
            entry_method: &self.convention.entry_method,
            cases,
        };
        let stdin = serde_json::to_vec(&plan)?;

        let script = TempScript::write(&self.script_dir, &functional_script())?;
        let command = self
            .runtime
            .command(self.timeout)
            .arg(script.path().to_string_lossy())
            .stdin(stdin);
        let output = run_sandboxed(&command)?;

        if output.timed_out {
            log::debug!(
                "functional child for {} killed after {:?}",
                candidate.display(),
                self.timeout
            );
            return Ok(FunctionalReport {
                score: 0,
                degradation: Some(Degradation::PhaseTimeout),
            });
        }

        Ok(match parse_score_line(&output.stdout) {
            Some(raw) => FunctionalReport {
                score: clamp_functional(raw),
                degradation: None,
            },
            None => {
                log::debug!(
                    "no score line from functional child; stderr: {}",
                    output.stderr.trim()
                );
                FunctionalReport {
                    score: 0,
                    degradation: Some(Degradation::ScoreParseFailure),
                }
            }
        })
    }
}

impl FunctionalProbe for SandboxFunctional {
    fn run_functional(
        &self,
        candidate: &Path,
        entry: &str,
        challenge: Challenge,
    ) -> FunctionalReport {
        let cases = challenge.test_cases();
        if cases.is_empty() {
            log::debug!("{} has no functional cases", challenge);
            return FunctionalReport {
                score: 0,
                degradation: Some(Degradation::NoTestCases),
            };
        }

        match self.drive(candidate, entry, cases) {
            Ok(report) => report,
            Err(e) => {
                log::warn!("functional phase for {} not run: {}", candidate.display(), e);
                FunctionalReport {
                    score: 0,
                    degradation: Some(Degradation::ScoreParseFailure),
                }
            }
        }
    }
}

/// First stdout line containing `SCORE:`; the text after the first colon as an integer
pub fn parse_score_line(stdout: &str) -> Option<i64> {
    let line = stdout.lines().find(|line| line.contains(SCORE_PREFIX))?;
    line.split(':').nth(1)?.trim().parse().ok()
}

/// Clamp a reported score into `0..=FUNCTIONAL_MAX`
pub fn clamp_functional(raw: i64) -> u32 {
    // Bounded by FUNCTIONAL_MAX, so the cast cannot truncate.
    raw.clamp(0, i64::from(FUNCTIONAL_MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_line_is_found_among_noise() {
        let stdout = "activating\nScore so far\nSCORE: 30\nSCORE: 50\n";
        assert_eq!(parse_score_line(stdout), Some(30));
    }

    #[test]
    fn missing_or_garbled_score_line_is_none() {
        assert_eq!(parse_score_line(""), None);
        assert_eq!(parse_score_line("all good\n"), None);
        assert_eq!(parse_score_line("SCORE: lots\n"), None);
        assert_eq!(parse_score_line("SCORE:\n"), None);
    }

    #[test]
    fn negative_and_oversized_scores_are_clamped() {
        assert_eq!(parse_score_line("SCORE: -5").map(clamp_functional), Some(0));
        assert_eq!(parse_score_line("SCORE: 9999").map(clamp_functional), Some(50));
        assert_eq!(clamp_functional(i64::MAX), FUNCTIONAL_MAX);
        assert_eq!(clamp_functional(40), 40);
    }

    #[test]
    fn level_without_cases_skips_the_child() {
        let runtime = PythonRuntime {
            python: "/nonexistent/python-for-scorebox".to_string(),
            python_path: Vec::new(),
            output_limit: 4096,
        };
        let probe = SandboxFunctional::new(
            runtime,
            Duration::from_secs(1),
            MockContext::default(),
            HandlerConvention::default(),
        );
        let challenge = Challenge::from_level(4).unwrap();
        let report = probe.run_functional(Path::new("handler.py"), "ExecutorHandler", challenge);
        assert_eq!(report.score, 0);
        assert_eq!(report.degradation, Some(Degradation::NoTestCases));
    }

    #[test]
    fn temp_script_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let script = TempScript::write(dir.path(), "print('hi')\n").unwrap();
            assert!(script.path().exists());
            script.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn spawn_failure_still_removes_the_script() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = PythonRuntime {
            python: "/nonexistent/python-for-scorebox".to_string(),
            python_path: Vec::new(),
            output_limit: 4096,
        };
        let probe = SandboxFunctional::new(
            runtime,
            Duration::from_secs(1),
            MockContext::default(),
            HandlerConvention::default(),
        )
        .with_script_dir(dir.path());
        let challenge = Challenge::from_level(1).unwrap();
        let report = probe.run_functional(Path::new("handler.py"), "EchoHandler", challenge);
        assert_eq!(report.score, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
