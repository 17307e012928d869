//! Download functionality and yt-dlp integration

pub mod args;
pub mod artifact;
pub mod error;
pub mod formats;
pub mod job;
pub mod progress;
pub mod retention;
pub mod types;

// Re-exports for convenience
pub use artifact::{resolve_artifact, Artifact};
pub use error::JobError;
pub use formats::{audio_only, discover, discover_audio_formats, parse_formats, FormatDescriptor};
pub use job::{DownloadJob, JobContext, JobEvent, JobState};
pub use progress::{OutputClassifier, OutputEvent, Phase, ProgressEvent};
pub use retention::{ExpiryOutcome, RetentionManager, RetentionStats, SweepReport};
pub use types::{DownloadRequest, MediaKind};
