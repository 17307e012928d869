//! Per-client sessions and the orchestrator that opens them.

pub mod protocol;

pub use protocol::{ClientMessage, FormatsPayload, ServerEvent};

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::core::config::Config;
use crate::core::process::ProcessGateway;
use crate::download::formats::discover_audio_formats;
use crate::download::job::{DownloadJob, JobContext, JobEvent};
use crate::download::progress::OutputClassifier;
use crate::download::retention::RetentionManager;
use crate::download::types::DownloadRequest;

const FETCHING_FORMATS: &str = "🔍 Fetching formats...";
const DOWNLOAD_IN_PROGRESS: &str = "⏳ A download is already in progress.";
const INVALID_MESSAGE: &str = "❌ Invalid message.";

/// Owns the shared collaborators and opens sessions on them.
#[derive(Clone)]
pub struct Relay {
    ctx: JobContext,
}

impl Relay {
    pub fn new(config: Config, gateway: Arc<dyn ProcessGateway>) -> Self {
        let retention = RetentionManager::new(&config);
        Self {
            ctx: JobContext {
                config: Arc::new(config),
                gateway,
                classifier: Arc::new(OutputClassifier::default()),
                retention,
            },
        }
    }

    /// Replace the output classifier used by every session opened afterwards.
    pub fn with_classifier(mut self, classifier: OutputClassifier) -> Self {
        self.ctx.classifier = Arc::new(classifier);
        self
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn retention(&self) -> &RetentionManager {
        &self.ctx.retention
    }

    pub fn open_session(&self, outbound: UnboundedSender<ServerEvent>) -> Session {
        Session::new(self.ctx.clone(), outbound)
    }
}

struct ActiveDownload {
    job_id: String,
    cancel: CancellationToken,
}

type DownloadSlot = Arc<Mutex<Option<ActiveDownload>>>;

fn lock_slot(slot: &Mutex<Option<ActiveDownload>>) -> MutexGuard<'_, Option<ActiveDownload>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// One client connection.
///
/// Holds at most one in-flight download. A second `start-download` while
/// one is running is rejected with a status and the running job continues.
/// Closing (or dropping) the session cancels whatever is still running.
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    ctx: JobContext,
    outbound: UnboundedSender<ServerEvent>,
    slot: DownloadSlot,
    download_task: Option<JoinHandle<()>>,
    discoveries: JoinSet<()>,
}

impl Session {
    pub fn new(ctx: JobContext, outbound: UnboundedSender<ServerEvent>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        log::info!("🔌 Client connected (session {})", id);
        Self {
            id,
            created_at: Utc::now(),
            ctx,
            outbound,
            slot: Arc::new(Mutex::new(None)),
            download_task: None,
            discoveries: JoinSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn has_active_download(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }

    /// Id of the in-flight download job, if any.
    pub fn active_job_id(&self) -> Option<String> {
        lock_slot(&self.slot).as_ref().map(|active| active.job_id.clone())
    }

    fn send(&self, event: ServerEvent) {
        if self.outbound.send(event).is_err() {
            log::debug!("[session {}] outbound channel closed", self.id);
        }
    }

    /// Handle one raw text frame. Malformed frames get a status reply and
    /// leave the session usable.
    pub fn handle_text(&mut self, text: &str) {
        match ClientMessage::from_json(text) {
            Ok(message) => self.handle(message),
            Err(e) => {
                log::warn!("[session {}] unparseable frame: {}", self.id, e);
                self.send(ServerEvent::status(INVALID_MESSAGE));
            }
        }
    }

    pub fn handle(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::GetFormats(url) => self.get_formats(url),
            ClientMessage::StartDownload(request) => self.start_download(request),
        }
    }

    fn get_formats(&mut self, url: String) {
        log::info!("🟡 [session {}] format discovery requested for {}", self.id, url);
        self.send(ServerEvent::status(FETCHING_FORMATS));

        // Reap finished discoveries so the set does not grow with the session.
        while self.discoveries.try_join_next().is_some() {}

        let ctx = self.ctx.clone();
        let outbound = self.outbound.clone();
        let session_id = self.id.clone();
        self.discoveries.spawn(async move {
            let payload = match discover_audio_formats(ctx.gateway.as_ref(), &ctx.config, &url).await {
                Ok(formats) => {
                    log::info!("✅ [session {}] formats fetched ({} audio options)", session_id, formats.len());
                    FormatsPayload::AudioOnly(formats)
                }
                Err(e) => {
                    log::error!("❌ [session {}] discovery failed ({}): {}", session_id, e.subcategory(), e);
                    let _ = outbound.send(ServerEvent::status(e.user_message()));
                    FormatsPayload::Unavailable
                }
            };
            let _ = outbound.send(ServerEvent::Formats(payload));
        });
    }

    fn start_download(&mut self, request: DownloadRequest) {
        let mut job = DownloadJob::new(request, &self.ctx.config);
        let job_id = job.id().to_string();

        {
            let mut slot = lock_slot(&self.slot);
            if let Some(active) = slot.as_ref() {
                log::warn!(
                    "[session {}] rejected download while job {} is running",
                    self.id,
                    active.job_id
                );
                drop(slot);
                self.send(ServerEvent::status(DOWNLOAD_IN_PROGRESS));
                return;
            }
            *slot = Some(ActiveDownload {
                job_id: job_id.clone(),
                cancel: job.cancellation_token(),
            });
        }

        let ctx = self.ctx.clone();
        let outbound = self.outbound.clone();
        let slot = Arc::clone(&self.slot);
        self.download_task = Some(tokio::spawn(async move {
            let (events_tx, mut events_rx) = mpsc::unbounded_channel::<JobEvent>();

            let run = async move {
                let _ = job.run(&ctx, &events_tx).await;
            };
            let forward = async {
                while let Some(event) = events_rx.recv().await {
                    if event.is_terminal() {
                        // Free the slot before the client can react to the result.
                        let mut slot = lock_slot(&slot);
                        if slot.as_ref().is_some_and(|active| active.job_id == job_id) {
                            *slot = None;
                        }
                    }
                    let _ = outbound.send(ServerEvent::from(event));
                }
            };
            tokio::join!(run, forward);

            let mut slot = lock_slot(&slot);
            if slot.as_ref().is_some_and(|active| active.job_id == job_id) {
                *slot = None;
            }
        }));
    }

    fn cancel_all(&mut self) {
        if let Some(active) = lock_slot(&self.slot).as_ref() {
            log::info!("[session {}] cancelling job {}", self.id, active.job_id);
            active.cancel.cancel();
        }
        self.discoveries.abort_all();
    }

    /// Cancel in-flight work and wait for the download job to clean up.
    pub async fn close(mut self) {
        self.cancel_all();
        if let Some(task) = self.download_task.take() {
            if let Err(e) = task.await {
                log::warn!("[session {}] download task ended abnormally: {}", self.id, e);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel_all();
        let lifetime = Utc::now() - self.created_at;
        log::info!(
            "🔌 Client disconnected (session {}, {}s)",
            self.id,
            lifetime.num_seconds()
        );
    }
}
