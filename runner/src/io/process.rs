//! Child process execution with streamed transcript capture.
//!
//! stdout and stderr are drained concurrently while the child runs so the
//! pipe buffers never deadlock. Every read unit is appended to the
//! transcript file and flushed immediately, and also retained in a
//! combined in-memory buffer for later parsing.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::error::{FailureKind, RunFailure};

/// Grace period between SIGTERM and SIGKILL when a timeout fires.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on a single read unit when a line has no newline.
const READ_CHUNK_MAX: u64 = 64 * 1024;

/// Captured output of a finished child.
#[derive(Debug)]
pub struct StreamedOutput {
    pub status: ExitStatus,
    /// Combined stdout+stderr bytes, in arrival order per stream.
    pub combined: Vec<u8>,
    pub timed_out: bool,
}

struct TranscriptSink {
    file: File,
    combined: Vec<u8>,
}

impl TranscriptSink {
    fn append(&mut self, chunk: &[u8]) {
        if let Err(e) = self
            .file
            .write_all(chunk)
            .and_then(|()| self.file.flush())
        {
            warn!(err = %e, "failed to stream transcript chunk");
        }
        self.combined.extend_from_slice(chunk);
    }
}

/// Spawn `cmd`, teeing stdout+stderr to `transcript_path` until exit.
///
/// The transcript file is created before the child is spawned. A missing
/// binary surfaces as `BinaryNotFound`; any other spawn error is a
/// `ProcessError`. With a timeout, an overrunning child is terminated
/// (SIGTERM, then SIGKILL after a short grace) and `timed_out` is set.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs())))]
pub fn run_streamed(
    mut cmd: Command,
    transcript_path: &Path,
    timeout: Option<Duration>,
) -> Result<StreamedOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let transcript = File::create(transcript_path)
        .with_context(|| format!("create transcript {}", transcript_path.display()))?;
    let sink = Arc::new(Mutex::new(TranscriptSink {
        file: transcript,
        combined: Vec::new(),
    }));

    debug!("spawning agent process");
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error!(err = %e, "agent binary not found");
            return Err(RunFailure::new(
                FailureKind::BinaryNotFound,
                format!(
                    "agent binary not found: {}",
                    cmd.get_program().to_string_lossy()
                ),
            )
            .into());
        }
        Err(e) => {
            error!(err = %e, "failed to spawn agent");
            return Err(
                RunFailure::new(FailureKind::ProcessError, format!("failed to spawn agent: {e}"))
                    .into(),
            );
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = {
        let sink = sink.clone();
        thread::spawn(move || drain_stream(stdout, &sink))
    };
    let stderr_handle = {
        let sink = sink.clone();
        thread::spawn(move || drain_stream(stderr, &sink))
    };

    let mut timed_out = false;
    let status = match timeout {
        Some(limit) => match child.wait_timeout(limit).context("wait for agent")? {
            Some(status) => status,
            None => {
                warn!(timeout_secs = limit.as_secs(), "agent timed out, terminating");
                timed_out = true;
                terminate(&mut child)?
            }
        },
        None => child.wait().context("wait for agent")?,
    };

    join_reader(stdout_handle).context("join stdout reader")?;
    join_reader(stderr_handle).context("join stderr reader")?;

    let combined = match Arc::try_unwrap(sink) {
        Ok(mutex) => {
            mutex
                .into_inner()
                .map_err(|_| anyhow!("transcript sink poisoned"))?
                .combined
        }
        Err(_) => return Err(anyhow!("transcript sink still shared after join")),
    };

    debug!(exit_code = ?status.code(), timed_out, "agent finished");
    Ok(StreamedOutput {
        status,
        combined,
        timed_out,
    })
}

/// Read the stream in line-bounded units (capped at [`READ_CHUNK_MAX`]
/// for newline-free output) and tee each into the sink.
fn drain_stream<R: Read>(reader: R, sink: &Mutex<TranscriptSink>) -> Result<()> {
    let mut buf_reader = BufReader::new(reader);
    loop {
        let mut chunk = Vec::new();
        let n = {
            let mut limited = (&mut buf_reader).take(READ_CHUNK_MAX);
            limited
                .read_until(b'\n', &mut chunk)
                .context("read agent output")?
        };
        if n == 0 {
            break;
        }
        sink.lock()
            .map_err(|_| anyhow!("transcript sink poisoned"))?
            .append(&chunk);
    }
    Ok(())
}

fn join_reader(handle: thread::JoinHandle<Result<()>>) -> Result<()> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// SIGTERM first so the agent can clean up, then SIGKILL after the grace.
fn terminate(child: &mut Child) -> Result<ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let pid = Pid::from_raw(child.id() as i32);
        if kill(pid, Signal::SIGTERM).is_ok()
            && let Some(status) = child.wait_timeout(KILL_GRACE).context("wait after SIGTERM")?
        {
            return Ok(status);
        }
    }
    child.kill().context("kill agent")?;
    child.wait().context("wait after kill")
}
