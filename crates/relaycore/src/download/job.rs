//! Download job state machine.
//!
//! `Pending → Spawned → Running → {Completed, Failed}`. A job runs exactly
//! once; there is no retry. Everything the client should see is pushed as a
//! [`JobEvent`] on the channel handed to [`DownloadJob::run`].

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::config::Config;
use crate::core::process::{ProcessEvent, ProcessGateway};
use crate::download::args::download_args;
use crate::download::artifact::{self, Artifact};
use crate::download::error::JobError;
use crate::download::progress::{OutputClassifier, OutputEvent, ProgressEvent};
use crate::download::retention::RetentionManager;
use crate::download::types::{DownloadRequest, MediaKind};

/// Lines kept per stream for diagnostics
const OUTPUT_TAIL_LINES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Spawned,
    Running,
    Completed,
    Failed,
}

impl JobState {
    fn rank(self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Spawned => 1,
            JobState::Running => 2,
            JobState::Completed | JobState::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Forward-only: no going back, nothing after a terminal state.
    pub fn can_advance_to(self, next: JobState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Spawned => "spawned",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

/// Client-facing output of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Status(String),
    Progress(ProgressEvent),
    Complete(Artifact),
    /// Terminal failure, carrying the client-facing message
    Failed(String),
}

impl JobEvent {
    /// Whether this is the last event a job emits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Complete(_) | JobEvent::Failed(_))
    }
}

/// Shared collaborators every job needs.
#[derive(Clone)]
pub struct JobContext {
    pub config: Arc<Config>,
    pub gateway: Arc<dyn ProcessGateway>,
    pub classifier: Arc<OutputClassifier>,
    pub retention: RetentionManager,
}

pub struct DownloadJob {
    id: String,
    request: DownloadRequest,
    state: JobState,
    started_at: DateTime<Utc>,
    staging_dir: PathBuf,
    stdout_tail: VecDeque<String>,
    stderr_tail: VecDeque<String>,
    cancel: CancellationToken,
}

fn push_tail(buf: &mut VecDeque<String>, line: &str) {
    buf.push_back(line.to_string());
    if buf.len() > OUTPUT_TAIL_LINES {
        buf.pop_front();
    }
}

fn emit(events: &UnboundedSender<JobEvent>, event: JobEvent) {
    // The session may already be gone; the job still finishes its cleanup.
    let _ = events.send(event);
}

impl DownloadJob {
    pub fn new(request: DownloadRequest, config: &Config) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let staging_dir = config.staging_dir(&id);
        Self {
            id,
            request,
            state: JobState::Pending,
            started_at: Utc::now(),
            staging_dir,
            stdout_tail: VecDeque::new(),
            stderr_tail: VecDeque::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Token that, once cancelled, kills the process and fails the job.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stdout_tail(&self) -> impl Iterator<Item = &str> {
        self.stdout_tail.iter().map(String::as_str)
    }

    pub fn stderr_tail(&self) -> impl Iterator<Item = &str> {
        self.stderr_tail.iter().map(String::as_str)
    }

    fn advance(&mut self, next: JobState) {
        if self.state.can_advance_to(next) {
            log::debug!("[job {}] {} -> {}", self.id, self.state.as_str(), next.as_str());
            self.state = next;
        } else {
            log::warn!(
                "[job {}] ignoring transition {} -> {}",
                self.id,
                self.state.as_str(),
                next.as_str()
            );
        }
    }

    /// Drive the job to a terminal state.
    ///
    /// On success the artifact is published, handed to retention and
    /// announced with [`JobEvent::Complete`]. On failure [`JobEvent::Failed`]
    /// carries [`JobError::user_message`] and nothing is scheduled. The
    /// staging directory is gone either way.
    pub async fn run(&mut self, ctx: &JobContext, events: &UnboundedSender<JobEvent>) -> Result<Artifact, JobError> {
        let result = match self.execute(ctx, events).await {
            Ok((kind, staged)) => artifact::publish(&staged, &ctx.config.download_dir).map(|path| (kind, path)),
            Err(e) => Err(e),
        };
        artifact::remove_staging(&self.staging_dir);

        match result {
            Ok((kind, path)) => {
                self.advance(JobState::Completed);
                let artifact = Artifact::new(path, kind, ctx.config.retention_ttl);
                if let Err(e) = ctx.retention.schedule(&artifact) {
                    log::error!("[job {}] failed to schedule deletion: {}", self.id, e);
                }
                let elapsed = Utc::now() - self.started_at;
                log::info!(
                    "✅ [job {}] download complete: {} ({}s)",
                    self.id,
                    artifact.display_name,
                    elapsed.num_seconds()
                );
                emit(events, JobEvent::Complete(artifact.clone()));
                Ok(artifact)
            }
            Err(e) => {
                self.advance(JobState::Failed);
                log::error!("❌ [job {}] failed ({}): {}", self.id, e.subcategory(), e);
                if !self.stderr_tail.is_empty() {
                    let tail: Vec<&str> = self.stderr_tail().collect();
                    log::debug!("[job {}] stderr tail:\n{}", self.id, tail.join("\n"));
                }
                emit(events, JobEvent::Failed(e.user_message()));
                Err(e)
            }
        }
    }

    async fn execute(
        &mut self,
        ctx: &JobContext,
        events: &UnboundedSender<JobEvent>,
    ) -> Result<(MediaKind, PathBuf), JobError> {
        let kind: MediaKind = self.request.kind.parse()?;
        log::info!("⬇️ [job {}] starting {} download for {}", self.id, kind, self.request.url);

        fs_err::create_dir_all(&self.staging_dir)?;
        let args = download_args(
            &ctx.config,
            kind,
            self.request.format_id.as_deref(),
            &self.staging_dir,
            &self.request.url,
        );

        let mut process = ctx.gateway.run_streaming(&ctx.config.ytdlp_bin, &args)?;
        self.advance(JobState::Spawned);
        let control = process.control();

        let mut cancelled = false;
        let exit_code = loop {
            let event = if cancelled {
                process.next_event().await
            } else {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        log::warn!("[job {}] cancelled, terminating process", self.id);
                        control.terminate();
                        cancelled = true;
                        continue;
                    }
                    event = process.next_event() => event,
                }
            };

            match event {
                Some(ProcessEvent::Stdout(line)) => {
                    self.advance_to_running();
                    log::debug!("yt-dlp stdout: {}", line);
                    push_tail(&mut self.stdout_tail, &line);
                    for output in ctx.classifier.classify(&line) {
                        match output {
                            OutputEvent::Phase(phase) => emit(events, JobEvent::Status(phase.label().to_string())),
                            OutputEvent::Progress(progress) => emit(events, JobEvent::Progress(progress)),
                        }
                    }
                }
                Some(ProcessEvent::Stderr(line)) => {
                    self.advance_to_running();
                    push_tail(&mut self.stderr_tail, &line);
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        log::warn!("⚠️ yt-dlp stderr: {}", trimmed);
                        emit(events, JobEvent::Status(trimmed.to_string()));
                    }
                }
                Some(ProcessEvent::Exited(code)) => break code,
                None => break None,
            }
        };

        log::info!("[job {}] process exited with {:?}", self.id, exit_code);
        if cancelled {
            return Err(JobError::Cancelled);
        }

        // Resolution runs regardless of the exit code: yt-dlp can report a
        // failure after the file is already complete (e.g. a thumbnail error).
        let staged = artifact::resolve_artifact(&self.staging_dir, kind)?;
        Ok((kind, staged))
    }

    fn advance_to_running(&mut self) {
        if self.state != JobState::Running {
            self.advance(JobState::Running);
        }
    }
}
