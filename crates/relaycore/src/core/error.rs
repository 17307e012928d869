use thiserror::Error;

use crate::download::error::JobError;

/// Centralized error type for startup and transport code.
///
/// Job failures never travel through here on the hot path: they are turned
/// into status messages at the job boundary. `AppError` covers everything
/// around the jobs (directories, credentials, sweeps, the CLI).
#[derive(Error, Debug)]
pub enum AppError {
    /// Job-level failure surfaced outside a session (e.g. the `formats` CLI)
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Credential material that is not valid base64
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;
