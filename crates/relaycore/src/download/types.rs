use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::config::download::AUDIO_FORMAT;
use crate::download::error::JobError;

/// What the client asked to end up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    /// Extensions an artifact of this kind may carry, most expected first.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            MediaKind::Audio => &[AUDIO_FORMAT],
            MediaKind::Video => &["mp4", "mkv", "webm"],
        }
    }

    pub fn matches_extension(&self, ext: &str) -> bool {
        self.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            _ => Err(JobError::InvalidRequest("Invalid download type.".to_string())),
        }
    }
}

/// Body of a `start-download` request as it arrives on the wire.
///
/// `kind` stays a string so that unsupported values reach the job and fail
/// there with a status message instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, format_id: Option<&str>, kind: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format_id: format_id.map(str::to_string),
            kind: kind.into(),
        }
    }
}
