//! Background tasks run by a node.
//!
//! - the backup scheduler snapshots collections whose backup is due
//! - the claim refresher republishes ownership of every local collection

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::directory::LocationDirectory;
use crate::registry::{lock, StoreRegistry};

/// Check every open collection each `tick` and start the snapshots that are due.
///
/// A snapshot is captured under the collection lock and written on a blocking
/// thread. A collection whose previous snapshot is still being written is
/// skipped until it finishes.
pub async fn run_backup_scheduler(registry: Arc<StoreRegistry>, tick: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                start_due_backups(&registry, Instant::now());
            }
        }
    }
    debug!("backup scheduler stopped");
}

/// Start the snapshots due at `now`. Returns how many were started.
pub fn start_due_backups(registry: &StoreRegistry, now: Instant) -> usize {
    let stores = match registry.open_stores() {
        Ok(stores) => stores,
        Err(e) => {
            warn!(error = %e, "backup scheduler cannot list collections");
            return 0;
        }
    };

    let mut started = 0;
    for (id, store) in stores {
        let job = match lock(&store) {
            Ok(mut store) => store.prepare_backup(now),
            Err(e) => {
                warn!(collection = %id, error = %e, "skipping backup");
                continue;
            }
        };
        if let Some(job) = job {
            tokio::task::spawn_blocking(move || job.run());
            started += 1;
        }
    }
    started
}

/// Snapshot every open collection now, waiting for each write.
///
/// Used on shutdown. Collections with a snapshot already in flight are
/// skipped. Returns how many snapshots were written.
pub fn final_backup(registry: &StoreRegistry) -> usize {
    let stores = match registry.open_stores() {
        Ok(stores) => stores,
        Err(e) => {
            warn!(error = %e, "final backup cannot list collections");
            return 0;
        }
    };

    let mut written = 0;
    for (id, store) in stores {
        let job = match lock(&store) {
            Ok(mut store) => store.prepare_forced_backup(),
            Err(e) => {
                warn!(collection = %id, error = %e, "skipping final backup");
                continue;
            }
        };
        match job {
            Some(job) => {
                if job.run() {
                    written += 1;
                }
            }
            None => debug!(collection = %id, "snapshot already in flight"),
        }
    }
    info!(written, "final backup complete");
    written
}

/// Republish ownership of every collection in the catalog every `period`.
///
/// Claims carry no expiry; republishing restores ownership records that
/// were overwritten or lost by peers.
pub async fn run_claim_refresher(
    registry: Arc<StoreRegistry>,
    directory: LocationDirectory,
    address: String,
    period: Duration,
    cancel: CancellationToken,
) {
    loop {
        refresh_claims(&registry, &directory, &address).await;
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(period) => {}
        }
    }
    debug!("claim refresher stopped");
}

/// Claim every collection in the catalog. Returns how many claims succeeded.
pub async fn refresh_claims(registry: &StoreRegistry, directory: &LocationDirectory, address: &str) -> usize {
    let ids = match registry.ids() {
        Ok(ids) => ids,
        Err(e) => {
            warn!(error = %e, "claim refresher cannot list collections");
            return 0;
        }
    };

    let mut claimed = 0;
    for id in ids {
        match directory.claim(id, address).await {
            Ok(()) => claimed += 1,
            Err(e) => warn!(collection = %id, error = %e, "failed to refresh claim"),
        }
    }
    debug!(claimed, "refreshed ownership claims");
    claimed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::MemoryDht;
    use crate::registry::StoreSettings;
    use meshvec_core::{BuildParams, Metric};
    use meshvec_storage::RedbEngine;
    use tempfile::TempDir;

    fn registry(dir: &TempDir, interval: Duration) -> StoreRegistry {
        let catalog = Arc::new(RedbEngine::open(dir.path().join("catalog.redb")).expect("catalog"));
        let settings = StoreSettings { backup_interval: interval, ..StoreSettings::default() };
        StoreRegistry::new(dir.path(), catalog, settings)
    }

    #[tokio::test]
    async fn test_scheduler_starts_only_due_backups() {
        let dir = TempDir::new().expect("tempdir");
        let registry = registry(&dir, Duration::from_secs(60));
        let busy = registry.create(2, Metric::SquaredEuclidean, 10, BuildParams::default()).expect("create");
        registry.create(2, Metric::SquaredEuclidean, 10, BuildParams::default()).expect("create");

        let store = registry.get(busy).expect("get");
        lock(&store).expect("lock").add("a", &[1.0, 2.0], None).expect("add");

        assert_eq!(start_due_backups(&registry, Instant::now()), 0, "interval not elapsed");
        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(start_due_backups(&registry, later), 1, "only the changed collection");
    }

    #[test]
    fn test_final_backup_writes_every_open_collection() {
        let dir = TempDir::new().expect("tempdir");
        let registry = registry(&dir, Duration::from_secs(3600));
        let a = registry.create(2, Metric::SquaredEuclidean, 10, BuildParams::default()).expect("create");
        let b = registry.create(2, Metric::Cosine, 10, BuildParams::default()).expect("create");

        assert_eq!(final_backup(&registry), 2);
        for id in [a, b] {
            let snapshot = dir.path().join("collections").join(id.to_string()).join("index.snapshot");
            assert!(snapshot.exists());
        }
    }

    #[tokio::test]
    async fn test_refresh_claims_every_collection() {
        let dir = TempDir::new().expect("tempdir");
        let registry = registry(&dir, Duration::from_secs(60));
        let a = registry.create(1, Metric::SquaredEuclidean, 10, BuildParams::default()).expect("create");
        let b = registry.create(1, Metric::SquaredEuclidean, 10, BuildParams::default()).expect("create");

        let directory = LocationDirectory::new(Arc::new(MemoryDht::new()));
        assert_eq!(refresh_claims(&registry, &directory, "127.0.0.1:8468").await, 2);
        for id in [a, b] {
            let record = directory.resolve(id).await.expect("resolve").expect("claimed");
            assert_eq!(record.address, "127.0.0.1:8468");
        }
    }
}
