//! HTTP and WebSocket surface.
//!
//! - `/ws`               push channel, one [`Session`](relaycore::Session) per connection
//! - `/download/{name}`  streams a finished artifact as an attachment
//! - `/health`           liveness probe
//! - anything else       static files from the download directory

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Request, State,
    },
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use relaycore::Relay;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

const FILE_NOT_FOUND: &str = "❌ File not found.";

#[derive(Clone)]
struct AppState {
    relay: Relay,
}

pub fn router(relay: Relay) -> Router {
    let files = static_files(&relay.config().download_dir);
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/download/{name}", get(download_handler))
        .route("/health", get(health_handler))
        .fallback_service(files)
        .layer(CorsLayer::permissive())
        .with_state(AppState { relay })
}

/// Finished downloads served inline at `/<name>`, minus the hidden
/// staging and record directories.
fn static_files(dir: &std::path::Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(dir).append_index_html_on_directories(false))
        .layer(middleware::from_fn(hide_internal_paths))
}

async fn hide_internal_paths(request: Request, next: Next) -> Response {
    if is_internal_path(request.uri().path()) {
        return (StatusCode::NOT_FOUND, FILE_NOT_FOUND).into_response();
    }
    next.run(request).await
}

/// Any segment that is, or percent-decodes to, a dot-name.
fn is_internal_path(path: &str) -> bool {
    path.split('/').any(|segment| {
        segment.starts_with('.') || segment.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("%2e"))
    })
}

/// Bind on all interfaces and serve until `shutdown` resolves.
pub async fn serve<F>(relay: Relay, port: u16, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(&addr).await?;

    log::info!("🚀 Server running at http://localhost:{}", port);
    log::info!("  /ws               - Push channel (WebSocket)");
    log::info!("  /download/{{name}}  - Finished downloads");
    log::info!("  /health           - Health check");
    log::info!("  /{{name}}           - Finished downloads (inline)");

    axum::serve(listener, router(relay)).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.relay))
}

async fn handle_socket(socket: WebSocket, relay: Relay) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = relay.open_session(tx);

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(event) = outbound else { break };
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        log::error!("Failed to encode server event: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => session.handle_text(text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::debug!("[session {}] socket error: {}", session.id(), e);
                    break;
                }
            },
        }
    }

    session.close().await;
}

/// Artifact names come straight from the URL: a single path component that
/// is not hidden (which also keeps `.jobs` and `.retention` out of reach).
fn is_servable_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\']) && !name.contains('\0')
}

fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

/// `attachment` with an ASCII fallback plus the RFC 5987 UTF-8 form.
fn content_disposition(name: &str) -> HeaderValue {
    let fallback: String = name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .filter(|c| *c != '"' && *c != '\\')
        .collect();
    let encoded: String = name
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect();

    HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

async fn download_handler(Path(name): Path<String>, State(state): State<AppState>) -> Response {
    if !is_servable_name(&name) {
        log::warn!("Rejected download name: {:?}", name);
        return (StatusCode::BAD_REQUEST, "❌ Invalid file name.").into_response();
    }

    let path = state.relay.config().download_dir.join(&name);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(_) => {
            log::error!("❌ File not found: {}", path.display());
            return (StatusCode::NOT_FOUND, FILE_NOT_FOUND).into_response();
        }
    };
    let metadata = match file.metadata().await {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return (StatusCode::NOT_FOUND, FILE_NOT_FOUND).into_response(),
    };

    log::info!("📤 Downloading file: {}", name);
    let body = Body::from_stream(ReaderStream::new(file));
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type_for(&name))),
            (header::CONTENT_DISPOSITION, content_disposition(&name)),
            (header::CONTENT_LENGTH, HeaderValue::from(metadata.len())),
        ],
        body,
    )
        .into_response()
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.relay.retention().stats();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "pending_deletions": state.relay.retention().tracked_count(),
        "deleted": stats.deleted,
    }))
}
