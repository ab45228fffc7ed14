//! Subprocess execution with bounded output capture.
//!
//! [`run_command`] spawns a prepared [`tokio::process::Command`], drains
//! stdout and stderr concurrently while the child runs, and waits until the
//! child has exited and both streams are closed, or until a timeout or
//! cancellation. The deadline also covers output held open by background
//! processes the child left behind. On timeout or cancellation the child is
//! killed and the readers are abandoned.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::executor::RunError;

/// Maximum bytes retained per stream (1 MiB).
///
/// Streams are always drained to EOF so the child never blocks on a full
/// pipe; only the last `MAX_CAPTURE_BYTES` are kept, since pipeline
/// diagnostics usually sit at the end of the output.
pub const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// Read chunk size.
const CHUNK_BYTES: usize = 8 * 1024;

/// Captured result of a process that exited on its own.
#[derive(Debug, Clone)]
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `-1` if the process was terminated by a signal.
    pub exit_code: i32,
    pub duration_ms: u64,
    pub truncated: bool,
}

/// Spawn `cmd`, capture both streams, and wait under `timeout` / `cancel`.
///
/// The caller sets program and arguments. Stdin is closed.
pub async fn run_command(
    cmd: &mut Command,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<Captured, RunError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|source| RunError::Spawn { program, source })?;

    let mut stdout_task = tokio::spawn(read_capped(child.stdout.take(), MAX_CAPTURE_BYTES));
    let mut stderr_task = tokio::spawn(read_capped(child.stderr.take(), MAX_CAPTURE_BYTES));

    let finished = async {
        let status = child.wait().await;
        let stdout = (&mut stdout_task).await.unwrap_or_default();
        let stderr = (&mut stderr_task).await.unwrap_or_default();
        (status, stdout, stderr)
    };

    let waited = tokio::select! {
        (status, stdout, stderr) = finished => Waited::Finished { status, stdout, stderr },
        () = deadline(timeout) => Waited::TimedOut,
        () = cancel.cancelled() => Waited::Cancelled,
    };

    let (status, (stdout, stdout_truncated), (stderr, stderr_truncated)) = match waited {
        Waited::Finished {
            status,
            stdout,
            stderr,
        } => (status?, stdout, stderr),
        Waited::TimedOut => {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            stop(&mut child, [&stdout_task, &stderr_task]).await;
            return Err(RunError::Timeout { elapsed_ms });
        }
        Waited::Cancelled => {
            stop(&mut child, [&stdout_task, &stderr_task]).await;
            return Err(RunError::Cancelled);
        }
    };

    Ok(Captured {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: status.code().unwrap_or(-1),
        duration_ms: start.elapsed().as_millis() as u64,
        truncated: stdout_truncated || stderr_truncated,
    })
}

/// Bytes kept from one stream and whether any were dropped.
type StreamCapture = (Vec<u8>, bool);

enum Waited {
    Finished {
        status: std::io::Result<ExitStatus>,
        stdout: StreamCapture,
        stderr: StreamCapture,
    },
    TimedOut,
    Cancelled,
}

/// Kill the child unless it already exited, and abandon its output readers.
async fn stop(child: &mut Child, readers: [&JoinHandle<StreamCapture>; 2]) {
    if !matches!(child.try_wait(), Ok(Some(_))) {
        if let Err(e) = child.kill().await {
            tracing::warn!(error = %e, "Failed to kill pipeline process");
        }
    }
    for reader in readers {
        reader.abort();
    }
}

/// Sleep for `timeout`, or forever when there is none.
async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

/// Drain a stream to EOF keeping only its last `cap` bytes.
///
/// Returns the retained bytes and whether anything was dropped.
async fn read_capped<R: AsyncRead + Unpin>(handle: Option<R>, cap: usize) -> StreamCapture {
    let Some(mut reader) = handle else {
        return (Vec::new(), false);
    };

    let mut kept: VecDeque<u8> = VecDeque::new();
    let mut truncated = false;
    let mut chunk = vec![0u8; CHUNK_BYTES];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                kept.extend(&chunk[..n]);
                if kept.len() > cap {
                    let excess = kept.len() - cap;
                    kept.drain(..excess);
                    truncated = true;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Stopped reading pipeline output");
                break;
            }
        }
    }

    (kept.into_iter().collect(), truncated)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
