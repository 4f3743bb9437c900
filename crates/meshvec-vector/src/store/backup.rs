//! Snapshot scheduling and backup jobs.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use meshvec_core::CollectionId;
use meshvec_storage::StorageEngine;
use tracing::{debug, warn};

use crate::error::VectorError;
use crate::index::{write_snapshot_file, HnswIndex};

/// Files owned by one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    dir: PathBuf,
}

impl StorePaths {
    /// Paths rooted at a collection directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The collection directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The collection's durable row store.
    #[must_use]
    pub fn store_file(&self) -> PathBuf {
        self.dir.join("store.redb")
    }

    /// The versioned index snapshot restored on reopen.
    #[must_use]
    pub fn index_snapshot(&self) -> PathBuf {
        self.dir.join("index.snapshot")
    }

    /// Backup copy of the row store.
    #[must_use]
    pub fn store_backup(&self) -> PathBuf {
        self.dir.join("backup").join("store.redb")
    }
}

/// Decides when a collection is snapshotted.
///
/// A snapshot is due when the collection changed since the previous one (or
/// the previous one failed) and at least `interval` has passed since the
/// previous attempt. At most one snapshot per collection is in flight.
#[derive(Debug)]
pub struct BackupPolicy {
    interval: Duration,
    last_attempt: Instant,
    dirty: bool,
    state: Arc<BackupState>,
}

#[derive(Debug, Default)]
struct BackupState {
    in_flight: AtomicBool,
    retry: AtomicBool,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl BackupPolicy {
    /// Default interval between snapshots.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

    /// A policy whose interval starts now.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    /// A policy whose interval starts at `start`.
    #[must_use]
    pub fn starting_at(interval: Duration, start: Instant) -> Self {
        Self { interval, last_attempt: start, dirty: false, state: Arc::default() }
    }

    /// Interval between snapshots.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Record that the collection changed.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether a snapshot should start at `now`.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        (self.dirty || self.state.retry.load(Ordering::SeqCst))
            && !self.state.in_flight.load(Ordering::SeqCst)
            && now.saturating_duration_since(self.last_attempt) >= self.interval
    }

    /// Whether a snapshot is currently running.
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    /// Number of snapshots written successfully.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.state.completed.load(Ordering::SeqCst)
    }

    /// Number of snapshots that failed.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.state.failed.load(Ordering::SeqCst)
    }

    /// Claim the in-flight slot, if free.
    fn begin(&mut self, now: Instant) -> Option<InFlight> {
        if self.state.in_flight.swap(true, Ordering::SeqCst) {
            return None;
        }
        self.last_attempt = now;
        self.dirty = false;
        self.state.retry.store(false, Ordering::SeqCst);
        Some(InFlight { state: Arc::clone(&self.state) })
    }

    /// Claim the in-flight slot if a snapshot is due at `now`.
    pub(crate) fn begin_if_due(&mut self, now: Instant) -> Option<InFlight> {
        if self.is_due(now) {
            self.begin(now)
        } else {
            None
        }
    }

    /// Claim the in-flight slot regardless of interval and changes.
    pub(crate) fn begin_now(&mut self) -> Option<InFlight> {
        self.begin(Instant::now())
    }
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

/// Holds a collection's in-flight slot until dropped.
#[derive(Debug)]
pub(crate) struct InFlight {
    state: Arc<BackupState>,
}

impl InFlight {
    fn finish(&self, ok: bool) {
        if ok {
            self.state.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.state.failed.fetch_add(1, Ordering::SeqCst);
            self.state.retry.store(true, Ordering::SeqCst);
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.state.in_flight.store(false, Ordering::SeqCst);
    }
}

/// A snapshot captured under the collection lock, written out later.
///
/// The index is serialized when the job is prepared; the row store is copied
/// from a read transaction when the job runs, so `run` does not need the
/// collection lock.
pub struct BackupJob<E: StorageEngine> {
    collection: CollectionId,
    index_bytes: Vec<u8>,
    engine: E,
    paths: StorePaths,
    slot: InFlight,
}

impl<E: StorageEngine> BackupJob<E> {
    pub(crate) fn prepare(
        collection: CollectionId,
        index: &HnswIndex,
        engine: E,
        paths: StorePaths,
        slot: InFlight,
    ) -> Result<Self, (VectorError, InFlight)> {
        match index.to_snapshot_bytes() {
            Ok(index_bytes) => Ok(Self { collection, index_bytes, engine, paths, slot }),
            Err(e) => Err((e, slot)),
        }
    }

    /// Write the snapshot. Failures are logged, never returned.
    ///
    /// Returns whether both files were written.
    pub fn run(self) -> bool {
        let result = self.write();
        match &result {
            Ok(()) => debug!(collection = %self.collection, "backup written"),
            Err(e) => warn!(collection = %self.collection, error = %e, "backup failed"),
        }
        self.slot.finish(result.is_ok());
        result.is_ok()
    }

    fn write(&self) -> Result<(), VectorError> {
        write_snapshot_file(&self.paths.index_snapshot(), &self.index_bytes)?;
        self.engine.snapshot_to(&self.paths.store_backup())?;
        Ok(())
    }
}

/// Report a job that failed before it could be prepared.
pub(crate) fn abandon(collection: CollectionId, error: &VectorError, slot: InFlight) {
    warn!(collection = %collection, error = %error, "backup failed");
    slot.finish(false);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_policy_is_never_due() {
        let start = Instant::now();
        let policy = BackupPolicy::starting_at(Duration::from_secs(60), start);
        assert!(!policy.is_due(start + Duration::from_secs(3600)));
    }

    #[test]
    fn test_due_only_after_interval() {
        let start = Instant::now();
        let mut policy = BackupPolicy::starting_at(Duration::from_secs(60), start);
        policy.mark_dirty();
        assert!(!policy.is_due(start + Duration::from_secs(59)));
        assert!(policy.is_due(start + Duration::from_secs(60)));
    }

    #[test]
    fn test_one_slot_per_interval() {
        let start = Instant::now();
        let mut policy = BackupPolicy::starting_at(Duration::from_secs(60), start);
        policy.mark_dirty();

        let t = start + Duration::from_secs(61);
        let slot = policy.begin_if_due(t).expect("first slot");
        assert!(policy.in_flight());

        policy.mark_dirty();
        assert!(policy.begin_if_due(t + Duration::from_secs(120)).is_none(), "slot still held");

        slot.finish(true);
        drop(slot);
        assert!(!policy.in_flight());
        assert_eq!(policy.completed(), 1);
        assert!(policy.begin_if_due(t + Duration::from_secs(1)).is_none(), "interval not elapsed");
        assert!(policy.begin_if_due(t + Duration::from_secs(60)).is_some());
    }

    #[test]
    fn test_failure_schedules_retry() {
        let start = Instant::now();
        let mut policy = BackupPolicy::starting_at(Duration::from_secs(10), start);
        policy.mark_dirty();
        let slot = policy.begin_if_due(start + Duration::from_secs(10)).expect("slot");
        slot.finish(false);
        drop(slot);

        assert_eq!(policy.failed(), 1);
        assert!(policy.is_due(start + Duration::from_secs(20)));
    }

    #[test]
    fn test_paths_layout() {
        let paths = StorePaths::new("/data/collections/c1");
        assert_eq!(paths.store_file(), PathBuf::from("/data/collections/c1/store.redb"));
        assert_eq!(paths.index_snapshot(), PathBuf::from("/data/collections/c1/index.snapshot"));
        assert_eq!(paths.store_backup(), PathBuf::from("/data/collections/c1/backup/store.redb"));
    }
}
