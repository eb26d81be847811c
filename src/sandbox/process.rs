/// Child process launch with a hard wall-clock deadline
///
/// The child leads its own process group. On deadline expiry the whole group
/// gets SIGKILL and the child is reaped before this returns, so repeated
/// invocations never leak processes. After a normal exit the group is killed
/// as well to reclaim anything the candidate forked.
use crate::config::types::{OutputIntegrity, Result, ScoreboxError};
use crate::sandbox::output::{OutputCollector, OutputLimits};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io::Write;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Variables passed through from the harness environment; everything else is dropped
const PASSTHROUGH_ENV: &[&str] = &["PATH", "HOME", "LANG", "TMPDIR"];

/// One sandboxed invocation
#[derive(Debug, Clone)]
pub struct SandboxCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
    pub workdir: Option<PathBuf>,
    pub timeout: Duration,
    pub output_limit: usize,
}

impl SandboxCommand {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
            workdir: None,
            timeout,
            output_limit: OutputLimits::default().stream_limit,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = bytes;
        self
    }
}

/// What came back from the child
#[derive(Debug, Clone)]
pub struct SandboxOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub elapsed: Duration,
    pub pid: u32,
    pub stdout_integrity: OutputIntegrity,
    pub stderr_integrity: OutputIntegrity,
}

impl SandboxOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run `command` to completion or deadline.
///
/// Returns `Err` only when the child cannot be spawned or waited on; a
/// timeout is a normal outcome reported through `timed_out`.
pub fn run_sandboxed(command: &SandboxCommand) -> Result<SandboxOutput> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .env_clear()
        .envs(passthrough_env())
        .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if command.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .process_group(0);
    if let Some(dir) = &command.workdir {
        cmd.current_dir(dir);
    }

    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| ScoreboxError::Process(format!("spawn {}: {}", command.program, e)))?;
    let pid = child.id();
    log::debug!("spawned sandbox child {} ({})", pid, command.program);

    let collector = OutputCollector::start(
        OutputLimits {
            stream_limit: command.output_limit,
            ..OutputLimits::default()
        },
        child.stdout.take(),
        child.stderr.take(),
    );

    // Feed stdin from a separate thread so a child that writes before it
    // reads cannot deadlock against us.
    if let (Some(data), Some(mut stdin)) = (command.stdin.clone(), child.stdin.take()) {
        thread::spawn(move || {
            let _ = stdin.write_all(&data);
        });
    }

    let mut timed_out = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if started.elapsed() >= command.timeout {
                    timed_out = true;
                    kill_process_group(pid);
                    let status = child.wait().map_err(|e| {
                        ScoreboxError::Process(format!("wait after kill {}: {}", pid, e))
                    })?;
                    log::debug!(
                        "sandbox child {} killed after {:?} deadline",
                        pid,
                        command.timeout
                    );
                    break status;
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                kill_process_group(pid);
                let _ = child.wait();
                return Err(ScoreboxError::Process(format!("wait {}: {}", pid, e)));
            }
        }
    };

    if !timed_out {
        // Reclaim stragglers left in the group by the candidate.
        kill_process_group(pid);
    }

    let output = collector.finish();
    let elapsed = started.elapsed();

    Ok(SandboxOutput {
        stdout: output.stdout.lossy_text(),
        stderr: output.stderr.lossy_text(),
        exit_code: status.code(),
        signal: status.signal(),
        timed_out,
        elapsed,
        pid,
        stdout_integrity: output.stdout.integrity,
        stderr_integrity: output.stderr.integrity,
    })
}

/// SIGKILL every process in the group led by `pid`; true if any were signalled
fn kill_process_group(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(e) => {
            log::warn!("killpg({}) failed: {}", pid, e);
            false
        }
    }
}

fn passthrough_env() -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = PASSTHROUGH_ENV
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value)))
        .collect();
    if !env.iter().any(|(key, _)| key == "PATH") {
        env.push(("PATH".to_string(), FALLBACK_PATH.to_string()));
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_exit_code() {
        let command = SandboxCommand::new("/bin/sh", Duration::from_secs(5))
            .args(["-c", "echo SUCCESS; echo oops >&2; exit 3"]);
        let output = run_sandboxed(&command).unwrap();
        assert_eq!(output.stdout.trim(), "SUCCESS");
        assert_eq!(output.stderr.trim(), "oops");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.timed_out);
        assert!(!output.success());
    }

    #[test]
    fn deadline_kills_and_reaps_child() {
        let command = SandboxCommand::new("/bin/sh", Duration::from_millis(200))
            .args(["-c", "sleep 30"]);
        let started = Instant::now();
        let output = run_sandboxed(&command).unwrap();

        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(output.signal, Some(Signal::SIGKILL as i32));

        // Reaped and its group gone: nothing left to signal.
        let probe = nix::sys::signal::kill(Pid::from_raw(output.pid as i32), None::<Signal>);
        assert_eq!(probe, Err(Errno::ESRCH));
        assert!(!kill_process_group(output.pid));
    }

    #[test]
    fn stdin_is_delivered() {
        let command = SandboxCommand::new("/bin/cat", Duration::from_secs(5)).stdin("prompt text");
        let output = run_sandboxed(&command).unwrap();
        assert_eq!(output.stdout, "prompt text");
        assert!(output.success());
    }

    #[test]
    fn environment_is_scrubbed() {
        std::env::set_var("SCOREBOX_SECRET_FOR_TEST", "leak");
        let command = SandboxCommand::new("/bin/sh", Duration::from_secs(5))
            .args(["-c", "echo \"[$SCOREBOX_SECRET_FOR_TEST][$EXTRA]\""])
            .env("EXTRA", "given");
        let output = run_sandboxed(&command).unwrap();
        assert_eq!(output.stdout.trim(), "[][given]");
    }

    #[test]
    fn missing_program_is_a_process_error() {
        let command = SandboxCommand::new("/nonexistent/scorebox-binary", Duration::from_secs(1));
        assert!(matches!(
            run_sandboxed(&command),
            Err(ScoreboxError::Process(_))
        ));
    }
}
