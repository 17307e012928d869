//! yt-dlp argument construction.
//!
//! yt-dlp parses its command line in order, so the layout is fixed:
//! authentication/config flags, then operation flags, then the bare URL as
//! the very last argument.

use std::path::Path;

use crate::core::config::{self, Config};
use crate::download::types::MediaKind;

/// Builder for one yt-dlp invocation.
///
/// # Example
///
/// ```
/// use relaycore::core::Config;
/// use relaycore::download::args::YtDlpArgs;
///
/// let config = Config::new("/tmp/downloads");
/// let args = YtDlpArgs::new(&config).flag("-J").build("https://youtu.be/x");
/// assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/x"));
/// ```
pub struct YtDlpArgs<'a> {
    config: &'a Config,
    operation: Vec<String>,
}

impl<'a> YtDlpArgs<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            operation: Vec::new(),
        }
    }

    /// Append a bare operation flag.
    pub fn flag(mut self, flag: &str) -> Self {
        self.operation.push(flag.to_string());
        self
    }

    /// Append an operation flag followed by its value.
    pub fn option(mut self, name: &str, value: impl Into<String>) -> Self {
        self.operation.push(name.to_string());
        self.operation.push(value.into());
        self
    }

    /// Lay out the final argument vector with `url` last.
    pub fn build(self, url: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(self.operation.len() + 5);

        if let Some(cookies) = self.config.usable_cookies_file() {
            args.push("--cookies".to_string());
            args.push(cookies.display().to_string());
        }
        if let Some(ref ffmpeg) = self.config.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.display().to_string());
        }

        args.extend(self.operation);
        args.push(url.to_string());
        args
    }
}

/// Arguments for a structured information dump (`-J`).
pub fn discovery_args(config: &Config, url: &str) -> Vec<String> {
    YtDlpArgs::new(config).flag("-J").flag("--no-playlist").build(url)
}

/// Arguments for a download of `kind` into `staging_dir`.
///
/// The output name comes from the remote item's own title and extension, so
/// the exact filename is only known after the process exits.
pub fn download_args(
    config: &Config,
    kind: MediaKind,
    format_id: Option<&str>,
    staging_dir: &Path,
    url: &str,
) -> Vec<String> {
    let output_template = staging_dir.join(config::download::OUTPUT_TEMPLATE).display().to_string();

    let builder = YtDlpArgs::new(config);
    let builder = match kind {
        MediaKind::Audio => builder
            .option(
                "-f",
                format_id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or(config::download::AUDIO_FALLBACK_FORMAT),
            )
            .flag("--extract-audio")
            .option("--audio-format", config::download::AUDIO_FORMAT)
            .option("--audio-quality", config.audio_quality.as_str()),
        MediaKind::Video => builder
            .option("-f", config::download::VIDEO_FORMAT)
            .option("--merge-output-format", config::download::VIDEO_MERGE_FORMAT),
    };

    builder
        .flag("--newline")
        .flag("--no-playlist")
        .option("-o", output_template)
        .build(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_discovery_args_without_credentials() {
        let config = Config::new("/tmp/dl");
        assert_eq!(
            discovery_args(&config, "https://youtu.be/x"),
            strings(&["-J", "--no-playlist", "https://youtu.be/x"])
        );
    }

    #[test]
    fn test_credentials_precede_operation_flags() {
        let dir = tempfile::tempdir().unwrap();
        let cookies = dir.path().join("cookies.txt");
        std::fs::write(&cookies, "# Netscape HTTP Cookie File\n").unwrap();
        let config = Config::new(dir.path())
            .with_cookies_file(Some(cookies.clone()))
            .with_ffmpeg_location(Some(PathBuf::from("/opt/ffmpeg/bin")));

        let args = discovery_args(&config, "https://youtu.be/x");
        assert_eq!(
            args,
            vec![
                "--cookies".to_string(),
                cookies.display().to_string(),
                "--ffmpeg-location".to_string(),
                "/opt/ffmpeg/bin".to_string(),
                "-J".to_string(),
                "--no-playlist".to_string(),
                "https://youtu.be/x".to_string(),
            ]
        );
    }

    #[test]
    fn test_audio_download_args() {
        let config = Config::new("/tmp/dl");
        let args = download_args(
            &config,
            MediaKind::Audio,
            Some("251"),
            Path::new("/tmp/dl/.jobs/j1"),
            "https://youtu.be/x",
        );
        assert_eq!(
            args,
            strings(&[
                "-f",
                "251",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "192",
                "--newline",
                "--no-playlist",
                "-o",
                "/tmp/dl/.jobs/j1/%(title)s.%(ext)s",
                "https://youtu.be/x",
            ])
        );
    }

    #[test]
    fn test_audio_without_format_id_uses_bestaudio() {
        let config = Config::new("/tmp/dl");
        let args = download_args(&config, MediaKind::Audio, None, Path::new("/s"), "u");
        assert_eq!(&args[..2], &strings(&["-f", "bestaudio"])[..]);
        let args = download_args(&config, MediaKind::Audio, Some("  "), Path::new("/s"), "u");
        assert_eq!(args[1], "bestaudio");
    }

    #[test]
    fn test_video_download_args_ignore_format_id() {
        let config = Config::new("/tmp/dl");
        let args = download_args(&config, MediaKind::Video, Some("137"), Path::new("/s"), "u");
        assert_eq!(
            args,
            strings(&[
                "-f",
                "bv*+ba/best",
                "--merge-output-format",
                "mp4",
                "--newline",
                "--no-playlist",
                "-o",
                "/s/%(title)s.%(ext)s",
                "u",
            ])
        );
    }
}
