use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for discovery and download jobs.
///
/// Every variant is caught at the job boundary and converted into a
/// human-readable status for the originating session (`user_message`).
/// None of them terminate the orchestrator.
#[derive(Debug, Error)]
pub enum JobError {
    /// The tool could not be started (missing, not executable)
    #[error("failed to start {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },
    /// Discovery deadline exceeded; the process was killed
    #[error("process timed out after {0}s")]
    Timeout(u64),
    /// Structured output was malformed or incomplete
    #[error("could not parse tool output: {0}")]
    Parse(String),
    /// No file with the expected extension after the process exited
    #[error("no {kind} artifact found in {}", dir.display())]
    ArtifactNotFound { kind: String, dir: PathBuf },
    /// Unsupported request (e.g. unknown media kind)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The owning session went away while the job was running
    #[error("job cancelled")]
    Cancelled,
    /// Filesystem failure around staging or publishing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    /// Returns subcategory for logs
    pub fn subcategory(&self) -> &'static str {
        match self {
            JobError::Spawn { .. } => "spawn",
            JobError::Timeout(_) => "timeout",
            JobError::Parse(_) => "parse",
            JobError::ArtifactNotFound { .. } => "artifact_not_found",
            JobError::InvalidRequest(_) => "invalid_request",
            JobError::Cancelled => "cancelled",
            JobError::Io(_) => "io",
        }
    }

    /// Status text pushed to the client for this failure.
    pub fn user_message(&self) -> String {
        match self {
            JobError::Spawn { .. } => "❌ Downloader is unavailable.".to_string(),
            JobError::Timeout(_) => "❌ Timeout fetching formats.".to_string(),
            JobError::Parse(_) => "❌ Could not parse formats.".to_string(),
            JobError::ArtifactNotFound { .. } => "❌ Download failed. File not found.".to_string(),
            JobError::InvalidRequest(reason) => format!("❌ {}", reason),
            JobError::Cancelled => "❌ Download cancelled.".to_string(),
            JobError::Io(_) => "❌ Download failed.".to_string(),
        }
    }
}
