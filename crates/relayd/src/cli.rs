use clap::{Args, Parser, Subcommand};
use relaycore::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "relayd")]
#[command(author, version, about = "Push-channel server for yt-dlp downloads with live progress", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Runtime settings, each overridable from the environment (or `.env`).
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Port the HTTP/WebSocket server listens on
    #[arg(long, env = "PORT", default_value_t = 7350, global = true)]
    pub port: u16,

    /// yt-dlp executable
    #[arg(long, env = "YTDLP_PATH", default_value = "bin/yt-dlp", global = true)]
    pub ytdlp_path: PathBuf,

    /// Directory passed to yt-dlp as --ffmpeg-location
    #[arg(long, env = "FFMPEG_LOCATION", global = true)]
    pub ffmpeg_location: Option<PathBuf>,

    /// Base64-encoded Netscape cookie file, written to --cookie-file at startup
    #[arg(long, env = "COOKIE_B64", hide_env_values = true, global = true)]
    pub cookie_b64: Option<String>,

    /// Where the cookie file lives
    #[arg(long, env = "COOKIE_FILE", default_value = "secrets/youtube-cookies.txt", global = true)]
    pub cookie_file: PathBuf,

    /// Shared retention directory for finished downloads
    #[arg(long, env = "DOWNLOAD_DIR", default_value = "downloads", global = true)]
    pub download_dir: PathBuf,

    /// Optional log file in addition to the terminal
    #[arg(long, env = "LOG_FILE_PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// error, warn, info, debug or trace
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,
}

impl Settings {
    pub fn to_config(&self) -> Config {
        Config::new(self.download_dir.clone())
            .with_ytdlp_bin(self.ytdlp_path.clone())
            .with_ffmpeg_location(self.ffmpeg_location.clone())
            .with_cookies_file(Some(self.cookie_file.clone()))
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the server (default)
    Serve,

    /// Fetch the audio-only formats of a URL and print them as JSON
    Formats {
        /// Media page URL
        url: String,

        /// Print every format, not only audio-only ones
        #[arg(long)]
        all: bool,
    },

    /// Delete expired downloads recorded in the retention directory
    Sweep,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
