//! Time-bounded retention of completed artifacts.
//!
//! Every scheduled artifact gets a JSON expiry record under
//! `<download_dir>/.retention/` plus an in-memory timer. The timer is the fast
//! path; [`RetentionManager::sweep`] reads the records back so that a fresh
//! process (or a periodic task) finishes whatever an earlier one left behind.
//!
//! Deletion happens at most once per artifact: a timer or a sweep must first
//! claim the artifact, either by removing it from the registry or, for
//! records nobody tracks, by removing its record file. A path can be reused
//! once its file is gone, so claims also match the artifact's `created_at`:
//! an older schedule for the same path never deletes a newer file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::core::config::Config;
use crate::core::error::AppResult;
use crate::download::artifact::Artifact;

/// On-disk expiry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryRecord {
    pub artifact: PathBuf,
    pub created_at: DateTime<Utc>,
    pub delete_at: DateTime<Utc>,
}

impl From<&Artifact> for ExpiryRecord {
    fn from(artifact: &Artifact) -> Self {
        Self {
            artifact: artifact.path.clone(),
            created_at: artifact.created_at,
            delete_at: artifact.delete_at,
        }
    }
}

/// What firing an expiry did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryOutcome {
    Deleted,
    AlreadyGone,
    Failed,
    /// Someone else claimed it first
    Skipped,
}

/// Counters since the manager was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionStats {
    pub scheduled: usize,
    pub deleted: usize,
    pub already_gone: usize,
    pub failed: usize,
}

/// Result of one sweep over the record directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub rearmed: usize,
    pub pending: usize,
    pub invalid: usize,
    /// Records for a path that has since been scheduled again
    pub superseded: usize,
}

struct Slot {
    created_at: DateTime<Utc>,
    record_path: PathBuf,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Counters {
    scheduled: AtomicUsize,
    deleted: AtomicUsize,
    already_gone: AtomicUsize,
    failed: AtomicUsize,
}

struct Inner {
    record_dir: PathBuf,
    registry: Mutex<HashMap<PathBuf, Slot>>,
    counters: Counters,
}

/// Schedules and performs artifact deletion. Cheap to clone.
#[derive(Clone)]
pub struct RetentionManager {
    inner: Arc<Inner>,
}

impl RetentionManager {
    pub fn new(config: &Config) -> Self {
        Self::with_record_dir(config.retention_record_dir())
    }

    pub fn with_record_dir(record_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                record_dir: record_dir.into(),
                registry: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
        }
    }

    pub fn record_dir(&self) -> &Path {
        &self.inner.record_dir
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<PathBuf, Slot>> {
        self.inner.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a timer is armed for `path`.
    pub fn is_tracked(&self, path: &Path) -> bool {
        self.registry().contains_key(path)
    }

    pub fn tracked_count(&self) -> usize {
        self.registry().len()
    }

    pub fn stats(&self) -> RetentionStats {
        let c = &self.inner.counters;
        RetentionStats {
            scheduled: c.scheduled.load(Ordering::Relaxed),
            deleted: c.deleted.load(Ordering::Relaxed),
            already_gone: c.already_gone.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }

    /// Persist an expiry record for `artifact` and arm its timer.
    ///
    /// Returns `Ok(false)` without touching anything when the artifact is
    /// already scheduled. A schedule left over from an earlier file at the
    /// same path is replaced. Must be called from within a tokio runtime.
    pub fn schedule(&self, artifact: &Artifact) -> AppResult<bool> {
        match self.tracked_since(&artifact.path) {
            Some(created_at) if created_at == artifact.created_at => {
                log::warn!("Artifact {} is already scheduled for deletion", artifact.path.display());
                return Ok(false);
            }
            Some(_) => self.release(&artifact.path),
            None => {}
        }

        let record = ExpiryRecord::from(artifact);
        let record_path = self.write_record(&record)?;
        if !self.arm(record, record_path) {
            return Ok(false);
        }

        self.inner.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "🗑️ Scheduled deletion of {} at {}",
            artifact.display_name,
            artifact.delete_at.to_rfc3339()
        );
        Ok(true)
    }

    fn tracked_since(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.registry().get(path).map(|slot| slot.created_at)
    }

    /// Drop the schedule for `path` without deleting anything.
    fn release(&self, path: &Path) {
        let Some(slot) = self.registry().remove(path) else {
            return;
        };
        if let Some(timer) = slot.timer {
            timer.abort();
        }
        remove_record(&slot.record_path);
        log::info!("Replaced stale deletion schedule for {}", path.display());
    }

    fn write_record(&self, record: &ExpiryRecord) -> AppResult<PathBuf> {
        fs_err::create_dir_all(&self.inner.record_dir)?;
        let name = uuid::Uuid::new_v4().to_string();
        let record_path = self.inner.record_dir.join(format!("{}.json", name));
        let tmp_path = self.inner.record_dir.join(format!("{}.tmp", name));

        fs_err::write(&tmp_path, serde_json::to_vec_pretty(record)?)?;
        fs_err::rename(&tmp_path, &record_path)?;
        Ok(record_path)
    }

    /// Register `record` and spawn its timer. False if already registered.
    fn arm(&self, record: ExpiryRecord, record_path: PathBuf) -> bool {
        let path = record.artifact.clone();
        let created_at = record.created_at;
        {
            let mut registry = self.registry();
            if registry.contains_key(&path) {
                return false;
            }
            registry.insert(
                path.clone(),
                Slot {
                    created_at,
                    record_path,
                    timer: None,
                },
            );
        }

        let delay = (record.delete_at - Utc::now()).to_std().unwrap_or_default();
        let manager = self.clone();
        let timer_path = path.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.fire(&timer_path, Some(created_at), false);
        });

        if let Some(slot) = self.registry().get_mut(&path) {
            slot.timer = Some(handle);
        }
        true
    }

    /// Expire `path` now, regardless of its deadline.
    pub fn expire(&self, path: &Path) -> ExpiryOutcome {
        self.fire(path, None, true)
    }

    /// Claim through the registry, then delete. With `generation` set, only
    /// the schedule for that `created_at` may be claimed. `abort_timer` is
    /// false when called from the timer task itself.
    fn fire(&self, path: &Path, generation: Option<DateTime<Utc>>, abort_timer: bool) -> ExpiryOutcome {
        let slot = {
            let mut registry = self.registry();
            let claimable = registry
                .get(path)
                .is_some_and(|slot| generation.map_or(true, |at| slot.created_at == at));
            if claimable {
                registry.remove(path)
            } else {
                None
            }
        };
        let Some(slot) = slot else {
            log::debug!("Expiry for {} already handled", path.display());
            return ExpiryOutcome::Skipped;
        };

        if abort_timer {
            if let Some(timer) = slot.timer {
                timer.abort();
            }
        }
        remove_record(&slot.record_path);
        self.delete_artifact(path)
    }

    fn delete_artifact(&self, path: &Path) -> ExpiryOutcome {
        let counters = &self.inner.counters;
        match fs_err::remove_file(path) {
            Ok(()) => {
                log::info!("🗑️ Deleted expired artifact {}", path.display());
                counters.deleted.fetch_add(1, Ordering::Relaxed);
                ExpiryOutcome::Deleted
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("Expired artifact {} was already removed", path.display());
                counters.already_gone.fetch_add(1, Ordering::Relaxed);
                ExpiryOutcome::AlreadyGone
            }
            Err(e) => {
                log::error!("Failed to delete expired artifact: {}", e);
                counters.failed.fetch_add(1, Ordering::Relaxed);
                ExpiryOutcome::Failed
            }
        }
    }

    /// Load every record on disk, delete what is due and re-arm timers for
    /// the rest. Must be called from within a tokio runtime.
    pub fn sweep(&self) -> AppResult<SweepReport> {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let mut report = SweepReport::default();

        let entries = match fs_err::read_dir(&self.inner.record_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries.filter_map(Result::ok) {
            let record_path = entry.path();
            if record_path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_record(&record_path) {
                Some(record) => records.push((record, record_path)),
                None => report.invalid += 1,
            }
        }

        // Only the newest record for a path describes the file now on disk
        let mut newest: HashMap<PathBuf, DateTime<Utc>> = HashMap::new();
        for (record, _) in &records {
            let at = newest.entry(record.artifact.clone()).or_insert(record.created_at);
            *at = (*at).max(record.created_at);
        }

        for (record, record_path) in records {
            let current = self.tracked_since(&record.artifact);
            let latest = current.into_iter().chain(newest.get(&record.artifact).copied()).max();
            if latest.is_some_and(|at| at > record.created_at) {
                log::debug!("Dropping superseded expiry record for {}", record.artifact.display());
                remove_record(&record_path);
                report.superseded += 1;
                continue;
            }

            let tracked = current.is_some();
            if now >= record.delete_at {
                let outcome = if tracked {
                    self.fire(&record.artifact, Some(record.created_at), true)
                } else {
                    self.fire_untracked(&record.artifact, &record_path)
                };
                if outcome != ExpiryOutcome::Skipped {
                    report.expired += 1;
                }
            } else if tracked {
                report.pending += 1;
            } else if self.arm(record, record_path) {
                report.rearmed += 1;
            }
        }

        if report != SweepReport::default() {
            log::info!(
                "Retention sweep: {} expired, {} re-armed, {} pending, {} invalid, {} superseded",
                report.expired,
                report.rearmed,
                report.pending,
                report.invalid,
                report.superseded
            );
        }
        Ok(report)
    }

    /// The record file is the claim token for artifacts with no timer.
    fn fire_untracked(&self, path: &Path, record_path: &Path) -> ExpiryOutcome {
        match fs_err::remove_file(record_path) {
            Ok(()) => self.delete_artifact(path),
            Err(e) if e.kind() == ErrorKind::NotFound => ExpiryOutcome::Skipped,
            Err(e) => {
                log::error!("Failed to remove expiry record: {}", e);
                ExpiryOutcome::Skipped
            }
        }
    }
}

fn read_record(path: &Path) -> Option<ExpiryRecord> {
    let bytes = match fs_err::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Cannot read expiry record: {}", e);
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(record) => Some(record),
        Err(e) => {
            log::warn!("Ignoring malformed expiry record {}: {}", path.display(), e);
            None
        }
    }
}

fn remove_record(path: &Path) {
    if let Err(e) = fs_err::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            log::warn!("Failed to remove expiry record: {}", e);
        }
    }
}
