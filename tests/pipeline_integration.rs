//! Integration tests for the evaluation pipeline and retry controller
//!
//! These run real Python children. Each test returns early when `python3`
//! is not on PATH.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use scorebox::challenge::Challenge;
use scorebox::config::settings::HarnessConfig;
use scorebox::judge::{
    Evaluator, FunctionalProbe, LoadOutcome, LoadProbe, SandboxFunctional, SandboxLoader,
};
use scorebox::observability::{MemorySink, NullSink, ProgressEvent};
use scorebox::runner::RetryController;
use scorebox::store::ResultStore;
use scorebox::Degradation;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const BASE_MODULE: &str = r#"
class HotHandler:
    def __init__(self, node):
        self.node = node

    async def activate(self):
        return None
"#;

const ECHO_HANDLER: &str = r#"
from zephyr.handlers.base import HotHandler


class EchoHandler(HotHandler):
    async def process(self, message):
        if message.get("type") == "echo":
            return {"type": "echo_response", "payload": "ECHO: " + message["payload"]}
        return None
"#;

const COUNTER_HANDLER: &str = r#"
from zephyr.handlers.base import HotHandler


class CounterHandler(HotHandler):
    def __init__(self, node):
        super().__init__(node)
        self.count = 0

    def process(self, message):
        self.count += 1
        if message.get("type") == "stats":
            return {"type": "stats_response", "payload": {"total_messages": self.count}}
        return {"type": "ack", "payload": self.count}
"#;

const RAISING_HANDLER: &str = r#"
from zephyr.handlers.base import HotHandler


class EchoHandler(HotHandler):
    def __init__(self, node):
        raise RuntimeError("refusing to start")

    async def process(self, message):
        return message
"#;

const FAILING_ACTIVATE_HANDLER: &str = r#"
from zephyr.handlers.base import HotHandler


class EchoHandler(HotHandler):
    async def activate(self):
        raise RuntimeError("no broadcast channel")

    async def process(self, message):
        if message.get("type") == "echo":
            return {"type": "echo_response", "payload": "ECHO: " + message["payload"]}
        return None
"#;

fn python_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

macro_rules! require_python {
    () => {
        if !python_available() {
            eprintln!("skipping: python3 not available");
            return;
        }
    };
}

struct Fixture {
    dir: TempDir,
    config: HarnessConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pylib = dir.path().join("pylib");
        let handlers = pylib.join("zephyr").join("handlers");
        fs::create_dir_all(&handlers).unwrap();
        fs::write(pylib.join("zephyr").join("__init__.py"), "").unwrap();
        fs::write(handlers.join("__init__.py"), "").unwrap();
        fs::write(handlers.join("base.py"), BASE_MODULE).unwrap();

        let mut config = HarnessConfig::default();
        config.python_path = vec![pylib];
        config.output_dir = dir.path().join("generated");
        config.results_file = dir.path().join("evaluation").join("results.json");
        config.challenges_dir = dir.path().join("challenges");
        config.templates_dir = dir.path().join("templates");
        Self { dir, config }
    }

    fn candidate(&self, name: &str, source: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, source).unwrap();
        path
    }

    fn evaluator(&self) -> Evaluator {
        Evaluator::from_config(&self.config).unwrap()
    }
}

fn level(n: u8) -> Challenge {
    Challenge::from_level(n).unwrap()
}

#[test]
fn echo_handler_scores_full_marks() {
    require_python!();
    let fixture = Fixture::new();
    let path = fixture.candidate("echo.py", ECHO_HANDLER);

    let evaluation = fixture.evaluator().evaluate(&path, level(1), &NullSink);
    assert_eq!(evaluation.breakdown.syntax, 10);
    assert_eq!(evaluation.breakdown.structure, 20);
    assert_eq!(evaluation.breakdown.loads, 20);
    assert_eq!(evaluation.breakdown.functionality, 50);
    assert_eq!(evaluation.total(), 100);
    assert!(evaluation.degradations.is_empty(), "{:?}", evaluation.degradations);
}

#[test]
fn counter_handler_passes_level_two_cases() {
    require_python!();
    let fixture = Fixture::new();
    let path = fixture.candidate("counter.py", COUNTER_HANDLER);

    let evaluation = fixture.evaluator().evaluate(&path, level(2), &NullSink);
    assert_eq!(evaluation.breakdown.functionality, 50);
    assert_eq!(evaluation.total(), 100);
}

#[test]
fn wrong_handler_for_level_earns_only_the_activate_hook() {
    require_python!();
    let fixture = Fixture::new();
    let path = fixture.candidate("echo.py", ECHO_HANDLER);

    let evaluation = fixture.evaluator().evaluate(&path, level(2), &NullSink);
    assert_eq!(evaluation.breakdown.loads, 20);
    assert_eq!(evaluation.breakdown.functionality, 10);
}

#[test]
fn raising_constructor_scores_syntax_plus_structure_only() {
    require_python!();
    let fixture = Fixture::new();
    let path = fixture.candidate("raising.py", RAISING_HANDLER);

    let evaluation = fixture.evaluator().evaluate(&path, level(1), &NullSink);
    assert_eq!(evaluation.total(), 10 + evaluation.analysis.structure_score());
    assert_eq!(evaluation.total(), 30);
    assert_eq!(evaluation.degradations, vec![Degradation::LoadFailure]);
}

#[test]
fn syntax_error_scores_zero() {
    require_python!();
    let fixture = Fixture::new();
    let path = fixture.candidate("broken.py", "class EchoHandler(HotHandler:\n    pass\n");

    let sink = MemorySink::new();
    let evaluation = fixture.evaluator().evaluate(&path, level(1), &sink);
    assert_eq!(evaluation.total(), 0);
    assert_eq!(evaluation.degradations, vec![Degradation::SyntaxInvalid]);
    assert_eq!(sink.events().len(), 1);
}

#[test]
fn loader_needs_the_base_module_on_python_path() {
    require_python!();
    let fixture = Fixture::new();
    let path = fixture.candidate("echo.py", ECHO_HANDLER);

    assert!(SandboxLoader::from_config(&fixture.config).can_load(&path, "EchoHandler"));

    let mut bare = fixture.config.clone();
    bare.python_path.clear();
    assert!(!SandboxLoader::from_config(&bare).can_load(&path, "EchoHandler"));
}

#[test]
fn candidate_printing_the_sentinel_does_not_fake_a_load() {
    require_python!();
    let fixture = Fixture::new();
    let path = fixture.candidate(
        "liar.py",
        "print('SUCCESS')\nraise SystemExit(3)\n\nclass EchoHandler:\n    pass\n",
    );
    assert!(!SandboxLoader::from_config(&fixture.config).can_load(&path, "EchoHandler"));
}

#[test]
fn inflated_score_line_is_clamped() {
    require_python!();
    let fixture = Fixture::new();
    let source = format!(
        "import sys\nsys.__stdout__.write('SCORE: 9999\\n')\nsys.__stdout__.flush()\n{}",
        ECHO_HANDLER
    );
    let path = fixture.candidate("inflated.py", &source);

    let probe = SandboxFunctional::from_config(&fixture.config);
    let report = probe.run_functional(&path, "EchoHandler", level(1));
    assert_eq!(report.score, 50);
}

#[test]
fn functional_timeout_kills_the_child() {
    require_python!();
    let fixture = Fixture::new();
    let pid_file = fixture.dir.path().join("child.pid");
    let source = format!(
        r#"
import os
import time
from zephyr.handlers.base import HotHandler

with open({pid_file:?}, "w") as handle:
    handle.write(str(os.getpid()))


class EchoHandler(HotHandler):
    def process(self, message):
        time.sleep(60)
"#,
        pid_file = pid_file.to_string_lossy()
    );
    let path = fixture.candidate("sleepy.py", &source);

    let mut config = fixture.config.clone();
    config.sandbox.functional_timeout_secs = 1;
    let probe = SandboxFunctional::from_config(&config);

    let started = Instant::now();
    let report = probe.run_functional(&path, "EchoHandler", level(1));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(report.score, 0);
    assert_eq!(report.degradation, Some(Degradation::PhaseTimeout));

    let pid: i32 = fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
    assert_eq!(kill(Pid::from_raw(pid), None::<Signal>), Err(Errno::ESRCH));
}

#[test]
fn failing_activate_hook_forfeits_only_its_points() {
    require_python!();
    let fixture = Fixture::new();
    let path = fixture.candidate("activate.py", FAILING_ACTIVATE_HANDLER);

    let report = SandboxFunctional::from_config(&fixture.config).run_functional(
        &path,
        "EchoHandler",
        level(1),
    );
    assert_eq!(report.score, 40);
    assert_eq!(report.degradation, None);

    let evaluation = fixture.evaluator().evaluate(&path, level(1), &NullSink);
    assert_eq!(evaluation.breakdown.loads, 20);
    assert_eq!(evaluation.total(), 90);
}

#[test]
fn loader_timeout_kills_the_child() {
    require_python!();
    let fixture = Fixture::new();
    let pid_file = fixture.dir.path().join("loader.pid");
    let source = format!(
        r#"
import os
import time

with open({pid_file:?}, "w") as handle:
    handle.write(str(os.getpid()))
time.sleep(60)


class EchoHandler:
    pass
"#,
        pid_file = pid_file.to_string_lossy()
    );
    let path = fixture.candidate("slow_import.py", &source);

    let mut config = fixture.config.clone();
    config.sandbox.load_timeout_secs = 1;
    let loader = SandboxLoader::from_config(&config);

    let started = Instant::now();
    let outcome = loader.load(&path, "EchoHandler");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(outcome, LoadOutcome::TimedOut);
    assert_eq!(outcome.degradation(), Some(Degradation::PhaseTimeout));

    let pid: i32 = fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
    assert_eq!(kill(Pid::from_raw(pid), None::<Signal>), Err(Errno::ESRCH));
}

#[test]
fn driver_script_is_removed_after_each_run() {
    require_python!();
    let fixture = Fixture::new();
    let path = fixture.candidate("echo.py", ECHO_HANDLER);
    let scripts = fixture.dir.path().join("scripts");
    fs::create_dir_all(&scripts).unwrap();

    let probe = SandboxFunctional::from_config(&fixture.config).with_script_dir(&scripts);
    let report = probe.run_functional(&path, "EchoHandler", level(1));
    assert_eq!(report.score, 50);
    assert_eq!(fs::read_dir(&scripts).unwrap().count(), 0);
}

#[test]
fn controller_runs_end_to_end_with_a_command_backend() {
    require_python!();
    let mut fixture = Fixture::new();
    let response = fixture.candidate(
        "response.txt",
        &format!("Sure! Here is the handler:\n```python\n{}\n```\n", ECHO_HANDLER.trim()),
    );
    fixture.config.generator.command = vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        format!("cat > /dev/null; cat '{}'", response.display()),
    ];

    let sink = Arc::new(MemorySink::new());
    let controller = RetryController::from_config(&fixture.config, sink.clone()).unwrap();
    let run = controller.run("qwen2.5-coder:1.5b", level(1)).unwrap();

    assert!(run.passed);
    assert_eq!(run.best_score, 100);
    assert_eq!(run.attempts.len(), 1);
    assert_eq!(run.challenge, "level1_echo");

    let final_handler = run.final_handler.clone().unwrap();
    assert!(final_handler.ends_with(Path::new("qwen2.5-coder_1.5b/level1_echo/handler.py")));
    assert_eq!(fs::read_to_string(final_handler).unwrap(), ECHO_HANDLER.trim());

    let stored = ResultStore::new(&fixture.config.results_file).load().unwrap();
    assert_eq!(stored, vec![run]);

    assert!(sink
        .events()
        .iter()
        .any(|event| matches!(event, ProgressEvent::FinalHandlerWritten { .. })));
}

#[test]
fn controller_records_backend_failures_without_aborting() {
    let mut fixture = Fixture::new();
    fixture.config.generator.command = vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        "echo 'model not found' >&2; exit 1".to_string(),
    ];

    let controller = RetryController::from_config(&fixture.config, Arc::new(NullSink)).unwrap();
    let run = controller.run("missing-model", level(1)).unwrap();

    assert!(!run.passed);
    assert_eq!(run.attempts.len(), 3);
    assert!(run.attempts.iter().all(|a| a.error.is_some() && a.path.is_none()));
    assert!(run.final_handler.is_none());
    assert_eq!(ResultStore::new(&fixture.config.results_file).load().unwrap().len(), 1);
}
