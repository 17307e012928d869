//! Locating, publishing and describing the file a download produced.
//!
//! yt-dlp names its output after the remote title, so the exact filename is
//! only known once the process has exited. Every job writes into its own
//! staging directory; resolution looks there and nowhere else, which keeps
//! concurrent jobs from picking up each other's files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::download::error::JobError;
use crate::download::types::MediaKind;

/// A completed download sitting in the retention directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    /// Filename shown to the client and used by the download route
    pub display_name: String,
    pub kind: MediaKind,
    pub created_at: DateTime<Utc>,
    pub delete_at: DateTime<Utc>,
}

impl Artifact {
    /// Describe `path` as an artifact created now and due after `ttl`.
    pub fn new(path: PathBuf, kind: MediaKind, ttl: Duration) -> Self {
        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            display_name,
            kind,
            created_at,
            delete_at: created_at + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.delete_at
    }
}

/// Newest file in `dir` whose extension matches `kind`.
///
/// A missing or unreadable directory is treated like an empty one: the result
/// is [`JobError::ArtifactNotFound`], never a panic.
pub fn resolve_artifact(dir: &Path, kind: MediaKind) -> Result<PathBuf, JobError> {
    let not_found = || JobError::ArtifactNotFound {
        kind: kind.to_string(),
        dir: dir.to_path_buf(),
    };

    let entries = match fs_err::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot list {}: {}", dir.display(), e);
            return Err(not_found());
        }
    };

    let mut candidates: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            let ext = path.extension().and_then(|e| e.to_str())?;
            if !kind.matches_extension(ext) {
                return None;
            }
            let metadata = entry.metadata().ok()?;
            if !metadata.is_file() {
                return None;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            Some((modified, path))
        })
        .collect();

    candidates.sort_by(|a, b| b.0.cmp(&a.0));

    match candidates.into_iter().next() {
        Some((_, path)) => {
            log::debug!("Resolved {} artifact: {}", kind, path.display());
            Ok(path)
        }
        None => {
            log::error!("No {} file found in {}", kind, dir.display());
            Err(not_found())
        }
    }
}

/// Candidate paths for `file_name` inside `dir`: the name itself, then the
/// name with ` (1)`, ` (2)`, ... appended to the stem.
fn destination_candidates(dir: &Path, file_name: &str) -> impl Iterator<Item = PathBuf> {
    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let ext = as_path.extension().map(|e| e.to_string_lossy().into_owned());
    let dir = dir.to_path_buf();

    std::iter::once(dir.join(file_name)).chain((1u32..).map(move |n| match ext {
        Some(ref ext) => dir.join(format!("{} ({}).{}", stem, n, ext)),
        None => dir.join(format!("{} ({})", stem, n)),
    }))
}

/// Move a staged file into `download_dir` and return its final path.
///
/// The destination name is taken atomically, so concurrent publishers of the
/// same title each end up with their own file.
pub fn publish(staged: &Path, download_dir: &Path) -> Result<PathBuf, JobError> {
    let file_name = staged
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| JobError::ArtifactNotFound {
            kind: "file".to_string(),
            dir: staged.to_path_buf(),
        })?;

    for destination in destination_candidates(download_dir, &file_name) {
        match claim_destination(staged, &destination) {
            Ok(()) => {
                log::info!("Published {} -> {}", staged.display(), destination.display());
                return Ok(destination);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(std::io::Error::new(ErrorKind::AlreadyExists, format!("no free name for {}", file_name)).into())
}

/// Give `staged` the name `destination`, failing with `AlreadyExists` when the
/// name is taken. Never overwrites.
fn claim_destination(staged: &Path, destination: &Path) -> std::io::Result<()> {
    match fs_err::hard_link(staged, destination) {
        Ok(()) => return fs_err::remove_file(staged),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(e),
        // Staging lives under the download dir, so this only happens when it
        // has been mounted separately.
        Err(e) => log::warn!("Hard link failed ({}), falling back to copy", e),
    }

    let mut reserved = fs_err::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;
    let copied = fs_err::File::open(staged).and_then(|mut source| std::io::copy(&mut source, &mut reserved));
    if let Err(e) = copied {
        drop(reserved);
        let _ = fs_err::remove_file(destination);
        return Err(e);
    }
    fs_err::remove_file(staged)
}

/// Remove a job's staging directory. Missing is fine, failure is logged.
pub fn remove_staging(dir: &Path) {
    match fs_err::remove_dir_all(dir) {
        Ok(()) => log::debug!("Removed staging dir {}", dir.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove staging dir: {}", e),
    }
}
