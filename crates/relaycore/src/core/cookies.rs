//! Startup materialization of yt-dlp cookie files.

use base64::Engine;
use std::path::{Path, PathBuf};

use crate::core::error::AppResult;

/// Decode base64 cookie material and write it to `path`.
///
/// Returns `Ok(None)` when no material was supplied, so the caller can keep
/// running without authentication.
pub fn materialize_cookies(encoded: &str, path: &Path) -> AppResult<Option<PathBuf>> {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        log::warn!("⚠️ COOKIE_B64 not found. Some videos may require it.");
        return Ok(None);
    }

    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }
    fs_err::write(path, &decoded)?;

    log::info!("✅ Cookie file created from base64: {}", path.display());
    if !validate_cookies_file_format(path) {
        log::warn!("⚠️ Cookie file {} does not look like a Netscape cookie file", path.display());
    }

    Ok(Some(path.to_path_buf()))
}

/// Validates cookies file format (Netscape HTTP Cookie File)
///
/// # Returns
///
/// `true` if the file exists, has the Netscape header and at least one
/// tab-separated cookie line.
pub fn validate_cookies_file_format(path: &Path) -> bool {
    let Ok(contents) = fs_err::read_to_string(path) else {
        return false;
    };

    let has_header = contents.lines().any(|line| {
        line.trim().starts_with("# Netscape HTTP Cookie File") || line.trim().starts_with("# HTTP Cookie File")
    });

    // domain \t flag \t path \t secure \t expiry \t name \t value
    let has_cookies = contents.lines().any(|line| {
        let trimmed = line.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#') && trimmed.split('\t').count() >= 7
    });

    has_header && has_cookies
}
