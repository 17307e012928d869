//! End-to-end session flows against a scripted yt-dlp.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use relaycore::session::{ClientMessage, FormatsPayload};
use relaycore::ServerEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn start_download(url: &str, format_id: Option<&str>, kind: &str) -> String {
    serde_json::json!({
        "event": "start-download",
        "data": {"url": url, "format_id": format_id, "type": kind}
    })
    .to_string()
}

#[tokio::test]
async fn test_formats_then_audio_download() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    env.gateway.push_discovery(DiscoveryReply::Json(audio_formats_json()));
    env.gateway.push_download(
        DownloadScript::producing("Test Song.mp3").with_stdout(&[
            "[youtube] abc: Downloading webpage",
            "[download] Destination: Test Song.webm",
            "[download]  42.5% of 10.00MiB at 1.20MiB/s ETA 00:05",
            "[download] 100.0% of 10.00MiB at 2.00MiB/s ETA 00:00",
            "[ExtractAudio] Destination: Test Song.mp3",
        ]),
    );
    let (mut session, mut rx) = env.open_session();

    session.handle(ClientMessage::GetFormats("https://youtu.be/abc".to_string()));
    assert_eq!(next_event(&mut rx).await, ServerEvent::status("🔍 Fetching formats..."));
    match next_event(&mut rx).await {
        ServerEvent::Formats(FormatsPayload::AudioOnly(formats)) => {
            let ids: Vec<&str> = formats.iter().map(|f| f.format_id.as_str()).collect();
            assert_eq!(ids, vec!["249", "140"]);
        }
        other => panic!("expected formats, got {:?}", other),
    }

    session.handle_text(&start_download("https://youtu.be/abc", Some("140"), "audio"));
    let events = collect_until(&mut rx, is_complete).await;

    let statuses: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::Status(message) => Some(message.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            "📄 Downloading webpage...",
            "⬇️ Starting download...",
            "🎵 Converting audio..."
        ]
    );

    let percents: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::Progress(p) => Some(p.percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![42.5, 100.0]);

    assert_eq!(
        events.last(),
        Some(&ServerEvent::Complete {
            filename: "Test Song.mp3".to_string()
        })
    );
    assert_eq!(env.published_files(), vec!["Test Song.mp3".to_string()]);
    assert!(env.staging_entries().is_empty());
    assert!(env.relay.retention().is_tracked(&env.download_dir().join("Test Song.mp3")));

    let calls = env.gateway.calls();
    let download_args = &calls[1];
    assert_eq!(download_args.last().map(String::as_str), Some("https://youtu.be/abc"));
    assert!(download_args.windows(2).any(|w| w[0] == "-f" && w[1] == "140"));
    Ok(())
}

#[tokio::test]
async fn test_discovery_timeout_sends_empty_list_and_session_survives() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    env.gateway.push_discovery(DiscoveryReply::Timeout);
    env.gateway.push_discovery(DiscoveryReply::Json("{\"formats\": oops".to_string()));
    env.gateway.push_discovery(DiscoveryReply::Json(audio_formats_json()));
    let (mut session, mut rx) = env.open_session();

    session.handle(ClientMessage::GetFormats("u1".to_string()));
    let events = collect_until(&mut rx, |e| matches!(e, ServerEvent::Formats(_))).await;
    assert_eq!(
        events,
        vec![
            ServerEvent::status("🔍 Fetching formats..."),
            ServerEvent::status("❌ Timeout fetching formats."),
            ServerEvent::Formats(FormatsPayload::Unavailable),
        ]
    );

    session.handle(ClientMessage::GetFormats("u2".to_string()));
    let events = collect_until(&mut rx, |e| matches!(e, ServerEvent::Formats(_))).await;
    assert_eq!(events[1], ServerEvent::status("❌ Could not parse formats."));
    assert_eq!(events[2], ServerEvent::Formats(FormatsPayload::Unavailable));

    session.handle(ClientMessage::GetFormats("u3".to_string()));
    let events = collect_until(&mut rx, |e| matches!(e, ServerEvent::Formats(_))).await;
    assert!(matches!(events.last(), Some(ServerEvent::Formats(FormatsPayload::AudioOnly(f))) if f.len() == 2));
    Ok(())
}

#[tokio::test]
async fn test_missing_artifact_reports_failure_without_completion() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    env.gateway.push_download(
        DownloadScript::default()
            .with_stderr(&["WARNING: unable to extract uploader", "ERROR: Requested format is not available"]),
    );
    let (mut session, mut rx) = env.open_session();

    session.handle_text(&start_download("https://youtu.be/abc", Some("999"), "audio"));
    let events = collect_until(&mut rx, is_failure_status).await;

    assert_eq!(
        events,
        vec![
            ServerEvent::status("WARNING: unable to extract uploader"),
            ServerEvent::status("ERROR: Requested format is not available"),
            ServerEvent::status("❌ Download failed. File not found."),
        ]
    );
    assert!(!session.has_active_download());
    assert!(env.published_files().is_empty());
    assert_eq!(env.relay.retention().tracked_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_invalid_type_is_rejected_without_spawning() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    let (mut session, mut rx) = env.open_session();

    session.handle_text(&start_download("https://youtu.be/abc", None, "gif"));
    assert_eq!(next_event(&mut rx).await, ServerEvent::status("❌ Invalid download type."));
    assert!(env.gateway.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_second_download_is_rejected_while_first_runs() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    let release = Arc::new(Notify::new());
    env.gateway.push_download(
        DownloadScript::producing("first.mp4")
            .with_stdout(&["[download] Destination: first.mp4"])
            .held_until(release.clone()),
    );
    env.gateway.push_download(DownloadScript::producing("second.mp4"));
    let (mut session, mut rx) = env.open_session();

    session.handle_text(&start_download("https://youtu.be/one", None, "video"));
    assert_eq!(next_event(&mut rx).await, ServerEvent::status("⬇️ Starting download..."));
    assert!(session.has_active_download());

    session.handle_text(&start_download("https://youtu.be/two", None, "video"));
    assert_eq!(
        next_event(&mut rx).await,
        ServerEvent::status("⏳ A download is already in progress.")
    );
    assert_eq!(env.gateway.calls().len(), 1);

    release.notify_one();
    assert_eq!(
        next_event(&mut rx).await,
        ServerEvent::Complete {
            filename: "first.mp4".to_string()
        }
    );

    // The slot is free as soon as the completion is observable.
    session.handle_text(&start_download("https://youtu.be/two", None, "video"));
    let events = collect_until(&mut rx, is_complete).await;
    assert_eq!(
        events.last(),
        Some(&ServerEvent::Complete {
            filename: "second.mp4".to_string()
        })
    );
    Ok(())
}

#[tokio::test]
async fn test_disconnect_cancels_running_download() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    env.gateway.push_download(
        DownloadScript::producing("never.mp3")
            .with_stdout(&["[download]   3.0% of ~ 120.50MiB at  2.00MiB/s ETA 01:02"])
            .held_until(Arc::new(Notify::new())),
    );
    let (mut session, mut rx) = env.open_session();

    session.handle_text(&start_download("https://youtu.be/abc", Some("251"), "audio"));
    assert!(matches!(next_event(&mut rx).await, ServerEvent::Progress(p) if p.size == "120.50MiB"));

    tokio::time::timeout(Duration::from_secs(5), session.close()).await?;

    assert!(env.staging_entries().is_empty());
    assert!(env.published_files().is_empty());
    assert_eq!(env.relay.retention().tracked_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_sessions_keep_their_own_artifacts() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    let release = Arc::new(Notify::new());
    env.gateway
        .push_download(DownloadScript::producing("same.mp3").held_until(release.clone()));
    env.gateway.push_download(DownloadScript::producing("same.mp3"));

    let (mut first, mut first_rx) = env.open_session();
    let (mut second, mut second_rx) = env.open_session();

    first.handle_text(&start_download("https://youtu.be/a", None, "audio"));
    second.handle_text(&start_download("https://youtu.be/b", None, "audio"));

    let second_done = collect_until(&mut second_rx, is_complete).await;
    release.notify_one();
    let first_done = collect_until(&mut first_rx, is_complete).await;

    assert_eq!(
        second_done.last(),
        Some(&ServerEvent::Complete {
            filename: "same.mp3".to_string()
        })
    );
    assert_eq!(
        first_done.last(),
        Some(&ServerEvent::Complete {
            filename: "same (1).mp3".to_string()
        })
    );
    assert_eq!(
        env.published_files(),
        vec!["same (1).mp3".to_string(), "same.mp3".to_string()]
    );
    Ok(())
}
