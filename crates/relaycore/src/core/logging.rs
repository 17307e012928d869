//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + optional file)
//! - Runtime configuration checks logged once at startup

use anyhow::Result;
use simplelog::*;
use std::path::Path;

use crate::core::config::Config as RelayConfig;
use crate::core::cookies::validate_cookies_file_format;

/// Initialize logger for console output and, when a path is given, a log file
///
/// # Arguments
/// * `level` - Maximum level for both outputs
/// * `log_file_path` - Optional path to the log file (truncated on start)
pub fn init_logger(level: LevelFilter, log_file_path: Option<&Path>) -> Result<()> {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    if let Some(path) = log_file_path {
        let log_file = fs_err::File::create(path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;
        loggers.push(WriteLogger::new(level, Config::default(), log_file));
    }

    CombinedLogger::init(loggers).map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Parse a textual level ("info", "debug", ...), defaulting to `Info`.
pub fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}

/// Logs the runtime configuration at application startup
///
/// Checks and logs:
/// - yt-dlp binary path
/// - ffmpeg location override
/// - cookies file presence and format
/// - download directory and retention window
pub fn log_runtime_configuration(config: &RelayConfig) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("⚙️  Runtime Configuration");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let bin = &config.ytdlp_bin;
    if bin.components().count() > 1 && !bin.exists() {
        log::error!("❌ yt-dlp: {} (FILE NOT FOUND!)", bin.display());
    } else {
        log::info!("✅ yt-dlp: {}", bin.display());
    }

    match config.ffmpeg_location {
        Some(ref location) => log::info!("✅ FFMPEG location set: {}", location.display()),
        None => log::warn!("⚠️  FFMPEG_LOCATION not set. yt-dlp may warn/fail."),
    }

    match config.cookies_file {
        Some(ref path) if path.exists() => {
            if validate_cookies_file_format(path) {
                log::info!("✅ Cookies file: {}", path.display());
            } else {
                log::warn!(
                    "⚠️  Cookies file: {} (not in Netscape format, yt-dlp may ignore it)",
                    path.display()
                );
            }
        }
        Some(ref path) => {
            log::warn!("⚠️  Cookies file: {} (not present, --cookies will be omitted)", path.display());
        }
        None => log::warn!("⚠️  No cookies configured. Some videos may require them."),
    }

    log::info!("📂 Download directory: {}", config.download_dir.display());
    log::info!(
        "🗑️  Retention: {}s (sweep every {}s)",
        config.retention_ttl.as_secs(),
        config.sweep_interval.as_secs()
    );
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
