//! Test fixtures for session-level tests
//!
//! Provides TestEnvironment: a relay rooted in a temporary download
//! directory and wired to a [`ScriptedGateway`].

#![allow(dead_code)]

use super::ScriptedGateway;
use relaycore::{Config, Relay, ServerEvent, Session};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// `-J` dump with two audio-only formats and one video-only format.
pub fn audio_formats_json() -> String {
    serde_json::json!({
        "title": "Test Song",
        "formats": [
            {"format_id": "249", "ext": "webm", "vcodec": "none", "acodec": "opus", "abr": 50.0},
            {"format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "none", "format_note": "1080p"},
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "format_note": "medium"}
        ]
    })
    .to_string()
}

pub struct TestEnvironment {
    pub dir: tempfile::TempDir,
    pub gateway: Arc<ScriptedGateway>,
    pub relay: Relay,
}

impl TestEnvironment {
    pub fn new() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let config = Config::new(dir.path().join("downloads"));
        config.ensure_dirs()?;

        let gateway = Arc::new(ScriptedGateway::new());
        let relay = Relay::new(config, gateway.clone());
        Ok(Self { dir, gateway, relay })
    }

    pub fn download_dir(&self) -> &Path {
        &self.relay.config().download_dir
    }

    pub fn open_session(&self) -> (Session, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.relay.open_session(tx), rx)
    }

    /// Regular files directly inside the download directory, sorted.
    pub fn published_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.download_dir())
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().is_file())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn staging_entries(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.relay.config().staging_root())
            .map(|entries| entries.filter_map(Result::ok).map(|e| e.path()).collect())
            .unwrap_or_default()
    }
}

pub async fn next_event(rx: &mut UnboundedReceiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a server event")
        .expect("session channel closed")
}

/// Collect events up to and including the first one matching `last`.
pub async fn collect_until<F>(rx: &mut UnboundedReceiver<ServerEvent>, last: F) -> Vec<ServerEvent>
where
    F: Fn(&ServerEvent) -> bool,
{
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = last(&event);
        events.push(event);
        if done {
            return events;
        }
    }
}

pub fn is_complete(event: &ServerEvent) -> bool {
    matches!(event, ServerEvent::Complete { .. })
}

pub fn is_failure_status(event: &ServerEvent) -> bool {
    matches!(event, ServerEvent::Status(message) if message.starts_with('❌'))
}
