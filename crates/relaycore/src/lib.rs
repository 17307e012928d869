//! relaycore - job orchestration and live-progress pipeline for relayd
//!
//! This library drives an external media-fetching tool (yt-dlp) on behalf of
//! many concurrent client sessions, turns its free-form output into structured
//! progress events, and manages the retention of the files it produces.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, credentials and the process gateway
//! - `download`: progress parsing, format discovery, download jobs, artifacts, retention
//! - `session`: per-client session state and the push-channel message protocol

pub mod core;
pub mod download;
pub mod session;

// Re-export commonly used types for convenience
pub use core::{AppError, AppResult, Config, ProcessGateway, SystemGateway};
pub use download::{Artifact, DownloadJob, FormatDescriptor, JobError, MediaKind, ProgressEvent, RetentionManager};
pub use session::{ClientMessage, Relay, ServerEvent, Session};
