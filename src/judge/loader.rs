/// Sandbox loader: instantiate the entry class in a child interpreter
///
/// Success is the sentinel on the child's stdout and nothing else; exit code,
/// stderr and anything printed by the candidate itself are ignored.
use crate::config::settings::{HarnessConfig, MockContext};
use crate::judge::{LoadOutcome, LoadProbe, PythonRuntime};
use crate::sandbox::run_sandboxed;
use crate::sandbox::scripts::{loader_script, LOAD_SENTINEL};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SandboxLoader {
    runtime: PythonRuntime,
    timeout: Duration,
    context: MockContext,
}

impl SandboxLoader {
    pub fn new(runtime: PythonRuntime, timeout: Duration, context: MockContext) -> Self {
        Self {
            runtime,
            timeout,
            context,
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            PythonRuntime::from_config(config),
            config.sandbox.load_timeout(),
            config.sandbox.mock_context.clone(),
        )
    }

    /// True iff the child instantiated `entry` before its deadline
    pub fn can_load(&self, candidate: &Path, entry: &str) -> bool {
        self.load(candidate, entry).is_loaded()
    }
}

impl LoadProbe for SandboxLoader {
    fn load(&self, candidate: &Path, entry: &str) -> LoadOutcome {
        let context = match serde_json::to_string(&self.context) {
            Ok(json) => json,
            Err(e) => return LoadOutcome::Failed(format!("mock context: {e}")),
        };

        let command = self
            .runtime
            .command(self.timeout)
            .arg("-c")
            .arg(loader_script())
            .arg(candidate.to_string_lossy())
            .arg(entry)
            .arg(context);

        let output = match run_sandboxed(&command) {
            Ok(output) => output,
            Err(e) => {
                log::warn!("loader child for {} not run: {}", candidate.display(), e);
                return LoadOutcome::Failed(e.to_string());
            }
        };

        if output.timed_out {
            log::debug!(
                "loader child for {} killed after {:?}",
                candidate.display(),
                self.timeout
            );
            return LoadOutcome::TimedOut;
        }

        if output.stdout.contains(LOAD_SENTINEL) {
            LoadOutcome::Loaded
        } else {
            let detail = output
                .stdout
                .lines()
                .find(|line| line.starts_with("FAILED"))
                .map(str::to_string)
                .unwrap_or_else(|| output.stderr.trim().to_string());
            log::debug!("candidate {} failed to load: {}", candidate.display(), detail);
            LoadOutcome::Failed(detail)
        }
    }
}
