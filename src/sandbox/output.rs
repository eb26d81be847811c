/// Bounded stdout/stderr collection for sandbox children
///
/// Each stream is drained by its own thread. Bytes past the per-stream limit
/// are read and discarded so a chatty child cannot stall on a full pipe.
use crate::config::types::OutputIntegrity;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::io::{BufReader, Read};
use std::process::{ChildStderr, ChildStdout};
use std::thread;
use std::time::{Duration, Instant};

/// Output limits configuration
#[derive(Debug, Clone)]
pub struct OutputLimits {
    /// Per-stream byte limit
    pub stream_limit: usize,
    /// How long to wait for the readers after the child is gone
    pub collection_timeout: Duration,
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            stream_limit: 1024 * 1024,
            collection_timeout: Duration::from_secs(2),
        }
    }
}

/// Bytes captured from one stream
#[derive(Debug, Clone, Default)]
pub struct StreamCapture {
    pub bytes: Vec<u8>,
    pub integrity: OutputIntegrity,
}

impl StreamCapture {
    pub fn lossy_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Both streams of one child
#[derive(Debug, Clone, Default)]
pub struct CollectedOutput {
    pub stdout: StreamCapture,
    pub stderr: StreamCapture,
}

/// Reader threads started at spawn time, joined by [`OutputCollector::finish`]
pub struct OutputCollector {
    limits: OutputLimits,
    stdout_rx: Option<Receiver<StreamCapture>>,
    stderr_rx: Option<Receiver<StreamCapture>>,
}

impl OutputCollector {
    /// Start draining the child's pipes
    pub fn start(
        limits: OutputLimits,
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
    ) -> Self {
        let stdout_rx = stdout.map(|stream| spawn_reader(stream, limits.stream_limit));
        let stderr_rx = stderr.map(|stream| spawn_reader(stream, limits.stream_limit));
        Self {
            limits,
            stdout_rx,
            stderr_rx,
        }
    }

    /// Wait for both readers, sharing one deadline.
    ///
    /// A reader still blocked at the deadline (a pipe held open by an escaped
    /// grandchild) is abandoned and its stream marked `CollectionTimedOut`.
    pub fn finish(self) -> CollectedOutput {
        let deadline = Instant::now() + self.limits.collection_timeout;
        CollectedOutput {
            stdout: receive_until(self.stdout_rx, deadline),
            stderr: receive_until(self.stderr_rx, deadline),
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(stream: R, limit: usize) -> Receiver<StreamCapture> {
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        let _ = tx.send(collect_stream(stream, limit));
    });
    rx
}

fn receive_until(rx: Option<Receiver<StreamCapture>>, deadline: Instant) -> StreamCapture {
    let Some(rx) = rx else {
        return StreamCapture::default();
    };
    let remaining = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(remaining) {
        Ok(capture) => capture,
        Err(RecvTimeoutError::Timeout) => StreamCapture {
            bytes: Vec::new(),
            integrity: OutputIntegrity::CollectionTimedOut,
        },
        Err(RecvTimeoutError::Disconnected) => StreamCapture {
            bytes: Vec::new(),
            integrity: OutputIntegrity::ReadError,
        },
    }
}

/// Collect from a single stream with limit
fn collect_stream<R: Read>(stream: R, limit: usize) -> StreamCapture {
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut integrity = OutputIntegrity::Complete;

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(buffer.len());
                if n > room {
                    buffer.extend_from_slice(&chunk[..room]);
                    integrity = OutputIntegrity::TruncatedByLimit;
                } else {
                    buffer.extend_from_slice(&chunk[..n]);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => {
                integrity = OutputIntegrity::ReadError;
                break;
            }
        }
    }

    StreamCapture {
        bytes: buffer,
        integrity,
    }
}
