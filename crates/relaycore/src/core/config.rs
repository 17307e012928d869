use std::path::{Path, PathBuf};
use std::time::Duration;

/// Format discovery configuration
pub mod discovery {
    use super::Duration;

    /// Hard deadline for a `-J` information dump (in seconds)
    pub const TIMEOUT_SECS: u64 = 20;

    /// Discovery timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(TIMEOUT_SECS)
    }
}

/// Retention configuration
pub mod retention {
    use super::Duration;

    /// How long a completed artifact stays on disk (in seconds)
    pub const TTL_SECS: u64 = 2 * 60 * 60; // 2 hours

    /// Interval between sweeps of the durable expiry records (in seconds)
    pub const SWEEP_INTERVAL_SECS: u64 = 600; // 10 minutes

    /// Directory (inside the download dir) holding expiry records
    pub const RECORD_DIR: &str = ".retention";

    /// Artifact time-to-live duration
    pub fn ttl() -> Duration {
        Duration::from_secs(TTL_SECS)
    }

    /// Sweep interval duration
    pub fn sweep_interval() -> Duration {
        Duration::from_secs(SWEEP_INTERVAL_SECS)
    }
}

/// Download configuration
pub mod download {
    /// Directory (inside the download dir) holding per-job staging directories
    pub const STAGING_DIR: &str = ".jobs";

    /// Audio transcode target. Also the only extension an audio artifact may
    /// carry, so it is not a runtime setting.
    pub const AUDIO_FORMAT: &str = "mp3";

    /// Audio transcode quality (constant bitrate in kbit/s)
    pub const AUDIO_QUALITY: &str = "192";

    /// Format selector used for audio requests that carry no format id
    pub const AUDIO_FALLBACK_FORMAT: &str = "bestaudio";

    /// Best video plus best audio, falling back to the best combined stream
    pub const VIDEO_FORMAT: &str = "bv*+ba/best";

    /// Container requested when video and audio are merged
    pub const VIDEO_MERGE_FORMAT: &str = "mp4";

    /// Output template relative to the staging directory
    pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
}

/// Runtime configuration handed to every manager at construction.
///
/// There is no process-wide instance: relayd builds one from its CLI/env
/// surface and tests build isolated ones around temporary directories.
#[derive(Debug, Clone)]
pub struct Config {
    /// yt-dlp executable
    pub ytdlp_bin: PathBuf,
    /// Passed as `--ffmpeg-location` when set
    pub ffmpeg_location: Option<PathBuf>,
    /// Netscape cookies file passed as `--cookies` when it exists
    pub cookies_file: Option<PathBuf>,
    /// Shared retention directory; artifacts are published here
    pub download_dir: PathBuf,
    pub discovery_timeout: Duration,
    pub retention_ttl: Duration,
    pub sweep_interval: Duration,
    pub audio_quality: String,
}

impl Config {
    /// Create a configuration with defaults rooted at `download_dir`.
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            ytdlp_bin: PathBuf::from("yt-dlp"),
            ffmpeg_location: None,
            cookies_file: None,
            download_dir: download_dir.into(),
            discovery_timeout: discovery::timeout(),
            retention_ttl: retention::ttl(),
            sweep_interval: retention::sweep_interval(),
            audio_quality: download::AUDIO_QUALITY.to_string(),
        }
    }

    pub fn with_ytdlp_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.ytdlp_bin = bin.into();
        self
    }

    pub fn with_ffmpeg_location(mut self, location: Option<PathBuf>) -> Self {
        self.ffmpeg_location = location;
        self
    }

    pub fn with_cookies_file(mut self, path: Option<PathBuf>) -> Self {
        self.cookies_file = path;
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn with_retention_ttl(mut self, ttl: Duration) -> Self {
        self.retention_ttl = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Parent of every per-job staging directory.
    pub fn staging_root(&self) -> PathBuf {
        self.download_dir.join(download::STAGING_DIR)
    }

    /// Staging directory for one job.
    pub fn staging_dir(&self, job_id: &str) -> PathBuf {
        self.staging_root().join(job_id)
    }

    /// Directory holding durable expiry records.
    pub fn retention_record_dir(&self) -> PathBuf {
        self.download_dir.join(retention::RECORD_DIR)
    }

    /// Cookies file, only if it is actually present on disk.
    pub fn usable_cookies_file(&self) -> Option<&Path> {
        self.cookies_file.as_deref().filter(|path| path.exists())
    }

    /// Create the download directory and its internal subdirectories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs_err::create_dir_all(&self.download_dir)?;
        fs_err::create_dir_all(self.staging_root())?;
        fs_err::create_dir_all(self.retention_record_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new("/srv/downloads");
        assert_eq!(config.discovery_timeout, Duration::from_secs(20));
        assert_eq!(config.retention_ttl, Duration::from_secs(7200));
        assert_eq!(config.audio_quality, "192");
        assert_eq!(config.ytdlp_bin, PathBuf::from("yt-dlp"));
    }

    #[test]
    fn test_derived_paths() {
        let config = Config::new("/srv/downloads");
        assert_eq!(config.staging_root(), PathBuf::from("/srv/downloads/.jobs"));
        assert_eq!(config.staging_dir("abc"), PathBuf::from("/srv/downloads/.jobs/abc"));
        assert_eq!(config.retention_record_dir(), PathBuf::from("/srv/downloads/.retention"));
    }

    #[test]
    fn test_usable_cookies_file_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        let config = Config::new(dir.path()).with_cookies_file(Some(missing));
        assert!(config.usable_cookies_file().is_none());

        let present = dir.path().join("cookies.txt");
        std::fs::write(&present, "# Netscape HTTP Cookie File\n").unwrap();
        let config = config.with_cookies_file(Some(present.clone()));
        assert_eq!(config.usable_cookies_file(), Some(present.as_path()));
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().join("downloads"));
        config.ensure_dirs().unwrap();
        assert!(config.staging_root().is_dir());
        assert!(config.retention_record_dir().is_dir());
    }
}
