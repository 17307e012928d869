//! External process gateway
//!
//! Every interaction with yt-dlp goes through [`ProcessGateway`]: either a
//! captured one-shot run bounded by a timeout, or a long-running streaming run
//! whose output arrives line by line. Jobs only see this trait, so tests can
//! swap in a scripted gateway without spawning anything.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::download::error::JobError;

/// Captured result of a one-shot run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

/// One item of a streaming run. `Exited` is always last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    Exited(Option<i32>),
}

/// Termination control for a streaming run. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    token: CancellationToken,
}

impl ProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the process to be killed. Idempotent.
    pub fn terminate(&self) {
        self.token.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once `terminate` has been called.
    pub async fn terminated(&self) {
        self.token.cancelled().await;
    }
}

/// Handle to a running process: its ordered output events plus a kill switch.
#[derive(Debug)]
pub struct StreamingProcess {
    events: mpsc::UnboundedReceiver<ProcessEvent>,
    control: ProcessControl,
}

impl StreamingProcess {
    /// Assemble a handle from an event channel, used by gateways (real or scripted).
    pub fn from_parts(events: mpsc::UnboundedReceiver<ProcessEvent>, control: ProcessControl) -> Self {
        Self { events, control }
    }

    /// Next output event; `None` once the producer is gone.
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        self.events.recv().await
    }

    pub fn control(&self) -> ProcessControl {
        self.control.clone()
    }
}

/// Seam between jobs and the operating system.
#[async_trait]
pub trait ProcessGateway: Send + Sync {
    /// Run to completion, capturing output. Kills the process and fails with
    /// [`JobError::Timeout`] when `timeout` elapses first.
    async fn run_once(&self, bin: &Path, args: &[String], timeout: Duration) -> Result<CapturedOutput, JobError>;

    /// Launch a long-running process and return immediately. The caller owns
    /// its lifecycle through the returned handle.
    fn run_streaming(&self, bin: &Path, args: &[String]) -> Result<StreamingProcess, JobError>;
}

/// Gateway backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemGateway;

impl SystemGateway {
    pub fn new() -> Self {
        Self
    }
}

fn spawn_error(bin: &Path, source: std::io::Error) -> JobError {
    JobError::Spawn {
        bin: bin.display().to_string(),
        source,
    }
}

#[async_trait]
impl ProcessGateway for SystemGateway {
    async fn run_once(&self, bin: &Path, args: &[String], timeout: Duration) -> Result<CapturedOutput, JobError> {
        log::debug!("run_once: {} {}", bin.display(), args.join(" "));

        let mut cmd = Command::new(bin);
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);

        // Dropping the `output()` future on timeout drops the child, which
        // kills it because of `kill_on_drop`.
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(spawn_error(bin, e)),
            Err(_) => {
                log::error!("⏱️ {} timed out after {}s, killed", bin.display(), timeout.as_secs());
                return Err(JobError::Timeout(timeout.as_secs()));
            }
        };

        Ok(CapturedOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    fn run_streaming(&self, bin: &Path, args: &[String]) -> Result<StreamingProcess, JobError> {
        log::info!("run_streaming: {} {}", bin.display(), args.join(" "));

        let mut child = Command::new(bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(bin, e))?;

        let pid = child.id();
        let (tx, rx) = mpsc::unbounded_channel();
        let control = ProcessControl::new();

        let readers = [
            forward_lines(child.stdout.take(), tx.clone(), ProcessEvent::Stdout),
            forward_lines(child.stderr.take(), tx.clone(), ProcessEvent::Stderr),
        ];

        let supervisor_control = control.clone();
        tokio::spawn(async move {
            let finished = tokio::select! {
                status = child.wait() => Some(status),
                _ = supervisor_control.terminated() => None,
            };
            let status = match finished {
                Some(status) => status,
                None => {
                    log::warn!("Terminating process {:?}", pid);
                    if let Err(e) = child.kill().await {
                        log::warn!("Failed to kill process {:?}: {}", pid, e);
                    }
                    child.wait().await
                }
            };

            // Drain both pipes before announcing the exit.
            for reader in readers {
                if let Err(e) = reader.await {
                    log::warn!("Output reader for process {:?} failed: {}", pid, e);
                }
            }

            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    log::error!("Failed to wait for process {:?}: {}", pid, e);
                    None
                }
            };
            log::debug!("Process {:?} exited with {:?}", pid, code);
            let _ = tx.send(ProcessEvent::Exited(code));
        });

        Ok(StreamingProcess::from_parts(rx, control))
    }
}

/// Forward a pipe as text lines. Both `\n` and `\r` end a line, so the tool's
/// in-place progress redraws still arrive as separate chunks.
fn forward_lines<R, F>(pipe: Option<R>, tx: mpsc::UnboundedSender<ProcessEvent>, wrap: F) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    F: Fn(String) -> ProcessEvent + Send + 'static,
{
    tokio::spawn(async move {
        let Some(pipe) = pipe else {
            return;
        };
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    for piece in text.split(['\r', '\n']).filter(|p| !p.is_empty()) {
                        // Keep draining even if nobody listens so the child never blocks on a full pipe.
                        let _ = tx.send(wrap(piece.to_string()));
                    }
                }
                Err(e) => {
                    log::warn!("Failed to read process output: {}", e);
                    break;
                }
            }
        }
    })
}
