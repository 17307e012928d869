//! Scripted process gateway
//!
//! Stands in for yt-dlp: discovery calls pop a canned reply, streaming calls
//! pop a [`DownloadScript`] that replays output lines and, on exit, drops a
//! file next to the `-o` output template the way yt-dlp would.

#![allow(dead_code)]

use async_trait::async_trait;
use relaycore::core::{CapturedOutput, ProcessControl, ProcessEvent, ProcessGateway, StreamingProcess};
use relaycore::JobError;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

pub enum DiscoveryReply {
    Json(String),
    Timeout,
}

/// One scripted download run.
#[derive(Clone, Default)]
pub struct DownloadScript {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// Created in the staging directory right before the exit event
    pub output_file: Option<String>,
    /// When set, the process only exits after `notify_one` (or termination)
    pub release: Option<Arc<Notify>>,
}

impl DownloadScript {
    pub fn producing(file: &str) -> Self {
        Self {
            output_file: Some(file.to_string()),
            ..Self::default()
        }
    }

    pub fn with_stdout(mut self, lines: &[&str]) -> Self {
        self.stdout = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_stderr(mut self, lines: &[&str]) -> Self {
        self.stderr = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn held_until(mut self, release: Arc<Notify>) -> Self {
        self.release = Some(release);
        self
    }
}

#[derive(Default)]
pub struct ScriptedGateway {
    discoveries: Mutex<VecDeque<DiscoveryReply>>,
    downloads: Mutex<VecDeque<DownloadScript>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_discovery(&self, reply: DiscoveryReply) {
        self.discoveries.lock().unwrap().push_back(reply);
    }

    pub fn push_download(&self, script: DownloadScript) {
        self.downloads.lock().unwrap().push_back(script);
    }

    /// Argument vectors of every call so far, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

fn output_dir(args: &[String]) -> Option<PathBuf> {
    let template = args.iter().position(|a| a == "-o").and_then(|i| args.get(i + 1))?;
    Path::new(template).parent().map(Path::to_path_buf)
}

#[async_trait]
impl ProcessGateway for ScriptedGateway {
    async fn run_once(&self, _bin: &Path, args: &[String], timeout: Duration) -> Result<CapturedOutput, JobError> {
        self.calls.lock().unwrap().push(args.to_vec());
        let reply = self.discoveries.lock().unwrap().pop_front();
        match reply {
            Some(DiscoveryReply::Json(stdout)) => Ok(CapturedOutput {
                stdout,
                stderr: String::new(),
                exit_code: Some(0),
            }),
            Some(DiscoveryReply::Timeout) | None => Err(JobError::Timeout(timeout.as_secs())),
        }
    }

    fn run_streaming(&self, _bin: &Path, args: &[String]) -> Result<StreamingProcess, JobError> {
        self.calls.lock().unwrap().push(args.to_vec());
        let script = self.downloads.lock().unwrap().pop_front().unwrap_or_default();
        let dir = output_dir(args);

        let (tx, rx) = mpsc::unbounded_channel();
        let control = ProcessControl::new();
        let process_control = control.clone();

        tokio::spawn(async move {
            for line in script.stdout {
                let _ = tx.send(ProcessEvent::Stdout(line));
            }
            for line in script.stderr {
                let _ = tx.send(ProcessEvent::Stderr(line));
            }

            if let Some(release) = script.release {
                tokio::select! {
                    _ = release.notified() => {}
                    _ = process_control.terminated() => {
                        let _ = tx.send(ProcessEvent::Exited(None));
                        return;
                    }
                }
            }

            if let (Some(dir), Some(file)) = (dir, script.output_file) {
                std::fs::write(dir.join(file), b"media").unwrap();
            }
            let _ = tx.send(ProcessEvent::Exited(Some(0)));
        });

        Ok(StreamingProcess::from_parts(rx, control))
    }
}
