use crate::challenge::{Challenge, MAX_LEVEL, MIN_LEVEL};
use crate::config::settings::HarnessConfig;
use crate::judge::{Evaluator, PythonRuntime};
use crate::observability::{EventSink, FanoutSink, JsonlSink, LogSink};
use crate::runner::controller::run_degradations;
use crate::runner::RetryController;
use crate::sandbox::run_sandboxed;
use crate::store::{summarize, ChallengeRun, ResultStore};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEPS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(author, version, about = "Score and retry model-generated handlers", long_about = None)]
struct Cli {
    /// Config file (default: ./scorebox.json when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Append progress events as JSON lines to this file
    #[arg(long, global = true, value_name = "PATH")]
    event_log: Option<PathBuf>,
    /// Debug-level logging unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and score handlers for one model
    Run {
        /// Model identifier passed to the generator
        #[arg(long)]
        model: String,
        /// Challenge level to run
        #[arg(
            long,
            conflicts_with = "all_levels",
            required_unless_present = "all_levels",
            value_parser = clap::value_parser!(u8).range(i64::from(MIN_LEVEL)..=i64::from(MAX_LEVEL))
        )]
        level: Option<u8>,
        /// Run every level in order
        #[arg(long)]
        all_levels: bool,
        /// Override the attempt budget
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        attempts: Option<u32>,
    },
    /// Every configured model against every level
    RunAll {
        /// Override the attempt budget
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        attempts: Option<u32>,
    },
    /// Score an existing handler file without generating or storing anything
    Evaluate {
        /// Handler source file
        #[arg(long)]
        file: PathBuf,
        /// Challenge level to score against
        #[arg(
            long,
            value_parser = clap::value_parser!(u8).range(i64::from(MIN_LEVEL)..=i64::from(MAX_LEVEL))
        )]
        level: u8,
    },
    /// Per-model summary of the result store
    Summary,
    /// Check that the Python interpreter and base handler module are usable
    CheckDeps,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = HarnessConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(path) = cli.event_log {
        config.event_log = Some(path);
    }

    match cli.command {
        Commands::Run {
            model,
            level,
            all_levels,
            attempts,
        } => {
            let challenges = if all_levels {
                Challenge::all()
            } else {
                let level = level.context("--level or --all-levels is required")?;
                vec![Challenge::from_level(level)?]
            };
            let runs = run_challenges(&config, &[model], &challenges, attempts)?;
            if runs.len() > 1 {
                print_summary(&runs);
            }
            Ok(())
        }
        Commands::RunAll { attempts } => {
            let models = config.resolve_models();
            if models.is_empty() {
                bail!("no models configured; set `models` in the config file or TEST_MODELS");
            }
            let runs = run_challenges(&config, &models, &Challenge::all(), attempts)?;
            print_summary(&runs);
            Ok(())
        }
        Commands::Evaluate { file, level } => evaluate_file(&config, &file, level),
        Commands::Summary => {
            let store = ResultStore::new(&config.results_file);
            let runs = store.load()?;
            if runs.is_empty() {
                println!("No results in {}", store.path().display());
            } else {
                print_summary(&runs);
            }
            Ok(())
        }
        Commands::CheckDeps => check_dependencies(&config),
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn build_sink(config: &HarnessConfig) -> Result<Arc<dyn EventSink>> {
    let mut sink = FanoutSink::new().with(Arc::new(LogSink));
    if let Some(path) = &config.event_log {
        sink = sink.with(Arc::new(JsonlSink::open(path)?));
    }
    Ok(Arc::new(sink))
}

fn run_challenges(
    config: &HarnessConfig,
    models: &[String],
    challenges: &[Challenge],
    attempts: Option<u32>,
) -> Result<Vec<ChallengeRun>> {
    let sink = build_sink(config)?;
    let mut controller = RetryController::from_config(config, sink)?;
    if let Some(attempts) = attempts {
        controller = controller.with_max_attempts(attempts);
    }

    let mut runs = Vec::new();
    for model in models {
        for challenge in challenges {
            let run = controller
                .run(model, *challenge)
                .with_context(|| format!("{model} / {challenge}"))?;
            print_run(&run);
            runs.push(run);
        }
    }
    Ok(runs)
}

fn print_run(run: &ChallengeRun) {
    let degradations: Vec<String> = run_degradations(run).iter().map(ToString::to_string).collect();
    println!(
        "{:<28} {:<18} {:>3}/100  {:<6} {} attempt(s){}",
        run.model,
        run.challenge,
        run.best_score,
        if run.passed { "PASS" } else { "FAIL" },
        run.attempts.len(),
        if degradations.is_empty() {
            String::new()
        } else {
            format!("  [{}]", degradations.join(", "))
        }
    );
}

fn print_summary(runs: &[ChallengeRun]) {
    println!();
    println!(
        "{:<28} {:>6} {:>7} {:>9}",
        "model", "runs", "passed", "avg score"
    );
    for summary in summarize(runs) {
        println!(
            "{:<28} {:>6} {:>7} {:>9.1}",
            summary.model,
            summary.runs,
            summary.passed,
            summary.average_score()
        );
    }
}

#[derive(Serialize)]
struct EvaluationReport<'a> {
    file: &'a Path,
    challenge: String,
    total: u32,
    #[serde(flatten)]
    evaluation: &'a crate::judge::Evaluation,
}

fn evaluate_file(config: &HarnessConfig, file: &Path, level: u8) -> Result<()> {
    if !file.is_file() {
        bail!("{} is not a file", file.display());
    }
    let challenge = Challenge::from_level(level)?;
    let sink = build_sink(config)?;
    let evaluator = Evaluator::from_config(config)?;
    let evaluation = evaluator.evaluate(file, challenge, sink.as_ref());

    let report = EvaluationReport {
        file,
        challenge: challenge.slug(),
        total: evaluation.total(),
        evaluation: &evaluation,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn check_dependencies(config: &HarnessConfig) -> Result<()> {
    let runtime = PythonRuntime::from_config(config);

    let version = run_sandboxed(&runtime.command(DEPS_TIMEOUT).arg("--version"))
        .with_context(|| format!("running {}", config.python))?;
    if !version.success() {
        bail!(
            "{} --version failed: {}",
            config.python,
            version.stderr.trim()
        );
    }
    let version_line = if version.stdout.trim().is_empty() {
        version.stderr.trim().to_string()
    } else {
        version.stdout.trim().to_string()
    };
    println!("interpreter  {} -> {}", config.python, version_line);

    let module = &config.convention.base_module;
    let import = run_sandboxed(
        &runtime
            .command(DEPS_TIMEOUT)
            .arg("-c")
            .arg(format!("import {module}")),
    )?;
    if import.success() {
        println!("base module  {module} -> ok");
    } else {
        println!("base module  {module} -> NOT IMPORTABLE (candidates will fail to load)");
        log::debug!("import {} stderr: {}", module, import.stderr.trim());
    }

    println!(
        "generator    {}",
        config.generator.command.join(" ")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_requires_a_level_choice() {
        assert!(Cli::try_parse_from(["scorebox", "run", "--model", "m"]).is_err());
        assert!(Cli::try_parse_from(["scorebox", "run", "--model", "m", "--level", "1"]).is_ok());
        assert!(Cli::try_parse_from(["scorebox", "run", "--model", "m", "--all-levels"]).is_ok());
        assert!(Cli::try_parse_from([
            "scorebox", "run", "--model", "m", "--level", "1", "--all-levels"
        ])
        .is_err());
    }

    #[test]
    fn out_of_range_level_is_rejected() {
        assert!(Cli::try_parse_from(["scorebox", "run", "--model", "m", "--level", "6"]).is_err());
        assert!(Cli::try_parse_from(["scorebox", "evaluate", "--file", "h.py", "--level", "0"]).is_err());
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "scorebox",
            "summary",
            "--verbose",
            "--event-log",
            "events.jsonl",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.event_log, Some(PathBuf::from("events.jsonl")));
        assert!(matches!(cli.command, Commands::Summary));
    }
}
