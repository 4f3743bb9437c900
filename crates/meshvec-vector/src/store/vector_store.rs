//! Vector store implementation.

use std::collections::HashSet;
use std::time::Instant;

use meshvec_core::validate;
use meshvec_core::{
    Action, CollectionConfig, CollectionId, Fingerprint, HistoryEntry, Metadata,
    VectorHandle, DEFAULT_MAX_METADATA_BYTES,
};
use meshvec_storage::{names, StorageEngine, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::backup::{abandon, BackupJob, BackupPolicy, InFlight, StorePaths};
use super::filter::Filter;
use super::history::HistoryLog;
use super::rows::{decode_handle, encode_handle, VectorRow, NEXT_HANDLE_KEY};
use crate::error::VectorError;
use crate::identity::{fingerprint, IdentityMapper};
use crate::index::{AnnIndex, HnswConfig, HnswIndex};

/// One query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Dense handle of the matching vector.
    pub handle: VectorHandle,
    /// Distance to the query under the collection metric.
    pub distance: f32,
    /// External id the vector was added under.
    pub external_id: Option<String>,
}

/// The vectors of one collection.
///
/// Owns the collection's HNSW index, identity map and row store. All
/// mutation goes through `&mut self`; callers that share a store wrap it in a
/// lock so each collection has a single writer.
///
/// Every add and update is written to the row store before returning. The
/// index lives in memory and reaches disk only through snapshots; on reopen
/// the snapshot is reconciled against the rows.
pub struct VectorStore<E: StorageEngine + Clone> {
    config: CollectionConfig,
    engine: E,
    history: HistoryLog<E>,
    index: HnswIndex,
    identity: IdentityMapper,
    quality: Option<usize>,
    paths: StorePaths,
    backup: BackupPolicy,
    max_metadata_bytes: usize,
}

impl<E: StorageEngine + Clone> VectorStore<E> {
    /// Create the store of a new, empty collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity counter cannot be initialised.
    pub fn create(
        config: CollectionConfig,
        engine: E,
        history: HistoryLog<E>,
        paths: StorePaths,
        backup: BackupPolicy,
    ) -> Result<Self, VectorError> {
        let index = HnswIndex::new(
            config.dimension,
            config.metric,
            config.capacity,
            HnswConfig::from(config.build),
        );
        let identity = IdentityMapper::new();

        let mut tx = engine.begin_write()?;
        tx.put(names::IDENTITY, NEXT_HANDLE_KEY, &encode_handle(identity.next_handle()))?;
        tx.commit()?;

        Ok(Self {
            config,
            engine,
            history,
            index,
            identity,
            quality: None,
            paths,
            backup,
            max_metadata_bytes: DEFAULT_MAX_METADATA_BYTES,
        })
    }

    /// Reopen an existing collection.
    ///
    /// Restores the index snapshot when one exists and matches the
    /// configuration, then reconciles it with the row store: rows missing
    /// from the index are inserted under their recorded handle, and live
    /// index entries without a row are tombstoned.
    ///
    /// # Errors
    ///
    /// Returns an error if the row store cannot be read.
    pub fn open(
        config: CollectionConfig,
        engine: E,
        history: HistoryLog<E>,
        paths: StorePaths,
        backup: BackupPolicy,
    ) -> Result<Self, VectorError> {
        let (rows, next) = {
            let tx = engine.begin_read()?;
            let rows = tx
                .scan_prefix(names::VECTORS, b"")?
                .into_iter()
                .map(|(key, value)| {
                    let fp = Fingerprint::from_slice(&key)?;
                    Ok::<_, VectorError>((fp, VectorRow::from_bytes(&value)?))
                })
                .collect::<Result<Vec<_>, VectorError>>()?;
            let next = match tx.get(names::IDENTITY, NEXT_HANDLE_KEY)? {
                Some(bytes) => decode_handle(&bytes)?,
                None => VectorHandle::new(0),
            };
            (rows, next)
        };

        let mut index = Self::restore_index(&config, &paths);
        if index.capacity() < config.capacity {
            index.resize(config.capacity)?;
        }

        // Tombstoned handles in the snapshot must stay unused too.
        let next = index.handles().last().map_or(next, |h| next.max(h.next()));
        let identity = IdentityMapper::restore(rows.iter().map(|(fp, row)| (*fp, row.handle)), next);

        let mut repaired = 0usize;
        let mut row_handles = HashSet::with_capacity(rows.len());
        for (_, row) in &rows {
            row_handles.insert(row.handle);
            let current = index.fetch(row.handle).ok();
            if current.as_deref() != Some(row.vector.as_slice()) {
                if index.len() >= index.capacity() && !index.contains(row.handle) {
                    index.resize(index.capacity() + 1)?;
                }
                index.insert(row.handle, &row.vector)?;
                repaired += 1;
            }
        }
        for handle in index.handles() {
            if index.is_live(handle) && !row_handles.contains(&handle) {
                index.tombstone(handle)?;
                repaired += 1;
            }
        }

        info!(
            collection = %config.id,
            vectors = rows.len(),
            repaired,
            "opened collection"
        );

        Ok(Self {
            config,
            engine,
            history,
            index,
            identity,
            quality: None,
            paths,
            backup,
            max_metadata_bytes: DEFAULT_MAX_METADATA_BYTES,
        })
    }

    fn restore_index(config: &CollectionConfig, paths: &StorePaths) -> HnswIndex {
        let empty = || {
            HnswIndex::new(config.dimension, config.metric, config.capacity, HnswConfig::from(config.build))
        };
        let path = paths.index_snapshot();
        if !path.exists() {
            return empty();
        }
        match HnswIndex::restore(&path) {
            Ok(index) if index.dimension() == config.dimension && index.metric() == config.metric => index,
            Ok(_) => {
                warn!(collection = %config.id, "index snapshot does not match collection, rebuilding");
                empty()
            }
            Err(e) => {
                warn!(collection = %config.id, error = %e, "unreadable index snapshot, rebuilding");
                empty()
            }
        }
    }

    /// Set the maximum accepted metadata size in bytes.
    #[must_use]
    pub fn with_max_metadata_bytes(mut self, max: usize) -> Self {
        self.max_metadata_bytes = max;
        self
    }

    /// The collection configuration.
    #[must_use]
    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// The collection id.
    #[must_use]
    pub fn id(&self) -> CollectionId {
        self.config.id
    }

    /// Number of live vectors.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.index.live_count()
    }

    /// Number of handles ever inserted and not superseded, including tombstones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the collection holds no live vectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count() == 0
    }

    /// The search-quality parameter, if set.
    #[must_use]
    pub const fn quality(&self) -> Option<usize> {
        self.quality
    }

    /// The backup policy of this collection.
    #[must_use]
    pub fn backup_policy(&self) -> &BackupPolicy {
        &self.backup
    }

    /// Whether a vector is stored under `external_id`.
    #[must_use]
    pub fn contains(&self, external_id: &str) -> bool {
        self.identity.lookup(&fingerprint(external_id)).is_ok()
    }

    fn check_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }
        validate::finite(vector)?;
        Ok(())
    }

    fn check_metadata(&self, metadata: &Metadata) -> Result<(), VectorError> {
        if metadata.len() > self.max_metadata_bytes {
            return Err(VectorError::MetadataTooLarge { size: metadata.len(), max: self.max_metadata_bytes });
        }
        Ok(())
    }

    fn record(&self, action: Action, fp: Option<Fingerprint>, detail: String) -> Result<(), VectorError> {
        self.history.append(&HistoryEntry::now(action, fp, detail))
    }

    /// Add a vector under `external_id`, with optional metadata.
    ///
    /// Adding an id that is already present replaces its vector and keeps its
    /// handle.
    ///
    /// # Errors
    ///
    /// - [`VectorError::DimensionMismatch`] if the vector has the wrong length
    /// - [`VectorError::CapacityExceeded`] if a new handle does not fit
    /// - storage errors if the row cannot be persisted
    pub fn add(
        &mut self,
        external_id: &str,
        vector: &[f32],
        metadata: Option<Metadata>,
    ) -> Result<VectorHandle, VectorError> {
        self.check_vector(vector)?;
        if let Some(meta) = &metadata {
            self.check_metadata(meta)?;
        }

        let fp = fingerprint(external_id);
        let assignment = self.identity.handle_for(fp);
        let handle = assignment.handle;

        if assignment.fresh && self.index.len() >= self.index.capacity() {
            self.identity.release(&fp)?;
            return Err(VectorError::CapacityExceeded { capacity: self.index.capacity() });
        }

        let previous = if assignment.fresh { None } else { self.index.fetch(handle).ok() };
        if previous.is_some() {
            self.index.tombstone(handle)?;
        }
        if let Err(e) = self.index.insert(handle, vector) {
            self.undo_insert(fp, handle, assignment.fresh, previous.as_deref());
            return Err(e);
        }

        let row = VectorRow { external_id: external_id.to_owned(), handle, vector: vector.to_vec() };
        if let Err(e) = self.persist_row(&fp, &row, metadata.as_ref(), assignment.fresh) {
            self.undo_insert(fp, handle, assignment.fresh, previous.as_deref());
            return Err(e);
        }

        self.record(Action::Add, Some(fp), format!("handle {handle}, {} dims", vector.len()))?;
        if let Some(meta) = &metadata {
            self.record(Action::AddMetadata, Some(fp), format!("{} bytes", meta.len()))?;
        }
        self.backup.mark_dirty();
        debug!(collection = %self.config.id, %handle, fresh = assignment.fresh, "added vector");
        Ok(handle)
    }

    fn undo_insert(&mut self, fp: Fingerprint, handle: VectorHandle, fresh: bool, previous: Option<&[f32]>) {
        if fresh {
            let _ = self.index.tombstone(handle);
            let _ = self.identity.release(&fp);
        } else if let Some(old) = previous {
            let _ = self.index.insert(handle, old);
        }
    }

    fn persist_row(
        &self,
        fp: &Fingerprint,
        row: &VectorRow,
        metadata: Option<&Metadata>,
        fresh: bool,
    ) -> Result<(), VectorError> {
        let mut tx = self.engine.begin_write()?;
        tx.put(names::VECTORS, fp.as_bytes(), &row.to_bytes()?)?;
        if fresh {
            tx.put(names::IDENTITY, NEXT_HANDLE_KEY, &encode_handle(self.identity.next_handle()))?;
        }
        if let Some(meta) = metadata {
            tx.put(names::METADATA, fp.as_bytes(), meta.as_bytes())?;
        }
        tx.commit()?;
        Ok(())
    }

    /// The vector stored under `external_id`.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::NotFound`] if the id was never added or was deleted.
    pub fn get(&self, external_id: &str) -> Result<Vec<f32>, VectorError> {
        let handle = self.lookup(external_id)?;
        self.index.fetch(handle)
    }

    fn lookup(&self, external_id: &str) -> Result<VectorHandle, VectorError> {
        self.identity
            .lookup(&fingerprint(external_id))
            .map_err(|_| VectorError::NotFound(format!("vector '{external_id}'")))
    }

    /// Replace the vector of an existing id, keeping its handle.
    ///
    /// Metadata, when given, is overwritten or inserted.
    ///
    /// # Errors
    ///
    /// - [`VectorError::NotFound`] if the id has no vector
    /// - [`VectorError::DimensionMismatch`] if the vector has the wrong length
    pub fn update(
        &mut self,
        external_id: &str,
        vector: &[f32],
        metadata: Option<Metadata>,
    ) -> Result<VectorHandle, VectorError> {
        let handle = self.lookup(external_id)?;
        self.check_vector(vector)?;
        if let Some(meta) = &metadata {
            self.check_metadata(meta)?;
        }

        let fp = fingerprint(external_id);
        let previous = self.index.fetch(handle).ok();
        if previous.is_some() {
            self.index.tombstone(handle)?;
        }
        if let Err(e) = self.index.insert(handle, vector) {
            self.undo_insert(fp, handle, false, previous.as_deref());
            return Err(e);
        }

        let row = VectorRow { external_id: external_id.to_owned(), handle, vector: vector.to_vec() };
        if let Err(e) = self.persist_row(&fp, &row, metadata.as_ref(), false) {
            self.undo_insert(fp, handle, false, previous.as_deref());
            return Err(e);
        }

        self.record(Action::Update, Some(fp), format!("handle {handle}"))?;
        if let Some(meta) = &metadata {
            self.record(Action::UpdateMetadata, Some(fp), format!("{} bytes", meta.len()))?;
        }
        self.backup.mark_dirty();
        Ok(handle)
    }

    /// Delete the vector of `external_id`.
    ///
    /// The handle is tombstoned and will not be reused; adding the same id
    /// again allocates a new handle. Metadata is kept.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::NotFound`] if the id has no vector.
    pub fn delete(&mut self, external_id: &str) -> Result<VectorHandle, VectorError> {
        let fp = fingerprint(external_id);
        let handle = self.lookup(external_id)?;

        let mut tx = self.engine.begin_write()?;
        tx.delete(names::VECTORS, fp.as_bytes())?;
        tx.commit()?;

        if self.index.is_live(handle) {
            self.index.tombstone(handle)?;
        }
        self.identity.release(&fp)?;

        self.record(Action::Delete, Some(fp), format!("handle {handle}"))?;
        self.backup.mark_dirty();
        Ok(handle)
    }

    /// Set the search-quality parameter (candidate-list size) used by queries.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::InvalidArgument`] if `ef` is zero.
    pub fn set_quality(&mut self, ef: usize) -> Result<(), VectorError> {
        validate::positive("ef", ef)?;
        self.quality = Some(ef);
        self.record(Action::SetQuality, None, format!("ef={ef}"))
    }

    /// The `k` live vectors nearest to `vector`, closest first.
    ///
    /// `k` larger than the number of live vectors is clamped. Failures inside
    /// the index yield an empty result rather than an error.
    ///
    /// # Errors
    ///
    /// - [`VectorError::Configuration`] if [`set_quality`](Self::set_quality)
    ///   was never called
    /// - [`VectorError::DimensionMismatch`] if the query has the wrong length
    /// - [`VectorError::InvalidArgument`] if `k` is zero
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>, VectorError> {
        let ef = self.quality.ok_or_else(|| {
            VectorError::Configuration("search quality is not set; call set_quality first".into())
        })?;
        self.check_vector(vector)?;
        validate::positive("k", k)?;

        let k = k.min(self.index.live_count().max(1));
        let results = match self.index.search(vector, k, ef) {
            Ok(results) => results,
            Err(e) => {
                warn!(collection = %self.config.id, error = %e, "index search failed, returning no results");
                return Ok(Vec::new());
            }
        };

        let tx = self.engine.begin_read()?;
        results
            .into_iter()
            .map(|r| {
                let external_id = match self.identity.fingerprint_of(r.handle) {
                    Some(fp) => tx
                        .get(names::VECTORS, fp.as_bytes())?
                        .map(|bytes| VectorRow::from_bytes(&bytes))
                        .transpose()?
                        .map(|row| row.external_id),
                    None => None,
                };
                Ok::<_, VectorError>(Neighbor { handle: r.handle, distance: r.distance, external_id })
            })
            .collect()
    }

    /// Like [`query`](Self::query), keeping only results that pass every filter.
    ///
    /// Filtering happens after the search, so fewer than `k` results may
    /// come back.
    ///
    /// # Errors
    ///
    /// Same as [`query`](Self::query).
    pub fn query_filtered(
        &self,
        vector: &[f32],
        k: usize,
        filters: &[Filter],
    ) -> Result<Vec<Neighbor>, VectorError> {
        let mut results = self.query(vector, k)?;
        results.retain(|n| match self.index.fetch(n.handle) {
            Ok(stored) => filters.iter().all(|f| f.accepts(n.handle, &stored)),
            Err(_) => false,
        });
        Ok(results)
    }

    /// Attach metadata to `external_id`, replacing any previous payload.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::MetadataTooLarge`] for oversized payloads.
    pub fn add_metadata(&mut self, external_id: &str, metadata: Metadata) -> Result<(), VectorError> {
        self.put_metadata(external_id, &metadata, Action::AddMetadata)
    }

    /// Overwrite or insert the metadata of `external_id`.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::MetadataTooLarge`] for oversized payloads.
    pub fn update_metadata(&mut self, external_id: &str, metadata: Metadata) -> Result<(), VectorError> {
        self.put_metadata(external_id, &metadata, Action::UpdateMetadata)
    }

    fn put_metadata(&mut self, external_id: &str, metadata: &Metadata, action: Action) -> Result<(), VectorError> {
        self.check_metadata(metadata)?;
        let fp = fingerprint(external_id);
        let mut tx = self.engine.begin_write()?;
        tx.put(names::METADATA, fp.as_bytes(), metadata.as_bytes())?;
        tx.commit()?;
        self.record(action, Some(fp), format!("{} bytes", metadata.len()))?;
        self.backup.mark_dirty();
        Ok(())
    }

    /// The metadata of `external_id`.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::NotFound`] if none is stored.
    pub fn get_metadata(&self, external_id: &str) -> Result<Metadata, VectorError> {
        let fp = fingerprint(external_id);
        let tx = self.engine.begin_read()?;
        tx.get(names::METADATA, fp.as_bytes())?
            .map(Metadata::from_stored)
            .ok_or_else(|| VectorError::NotFound(format!("metadata for '{external_id}'")))
    }

    /// Remove the metadata of `external_id`.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::NotFound`] if none is stored.
    pub fn delete_metadata(&mut self, external_id: &str) -> Result<(), VectorError> {
        let fp = fingerprint(external_id);
        let mut tx = self.engine.begin_write()?;
        if !tx.delete(names::METADATA, fp.as_bytes())? {
            tx.rollback()?;
            return Err(VectorError::NotFound(format!("metadata for '{external_id}'")));
        }
        tx.commit()?;
        self.record(Action::DeleteMetadata, Some(fp), String::new())?;
        self.backup.mark_dirty();
        Ok(())
    }

    /// The collection's full history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be read.
    pub fn history(&self) -> Result<Vec<HistoryEntry>, VectorError> {
        self.history.entries()
    }

    /// History entries for one external id, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be read.
    pub fn history_for(&self, external_id: &str) -> Result<Vec<HistoryEntry>, VectorError> {
        self.history.entries_for(&fingerprint(external_id))
    }

    /// Raise the capacity bound of the collection.
    ///
    /// The caller persists the updated [`config`](Self::config).
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::InvalidArgument`] if `capacity` is below the
    /// current bound.
    pub fn resize(&mut self, capacity: usize) -> Result<(), VectorError> {
        self.config.grow(capacity)?;
        self.index.resize(capacity)
    }

    /// Capture a snapshot if one is due at `now`.
    ///
    /// The returned job holds the collection's in-flight slot; run it outside
    /// the collection lock.
    pub fn prepare_backup(&mut self, now: Instant) -> Option<BackupJob<E>> {
        let slot = self.backup.begin_if_due(now)?;
        self.job(slot)
    }

    /// Capture a snapshot now, unless one is already in flight.
    pub fn prepare_forced_backup(&mut self) -> Option<BackupJob<E>> {
        let slot = self.backup.begin_now()?;
        self.job(slot)
    }

    fn job(&self, slot: InFlight) -> Option<BackupJob<E>> {
        match BackupJob::prepare(self.config.id, &self.index, self.engine.clone(), self.paths.clone(), slot) {
            Ok(job) => Some(job),
            Err((e, slot)) => {
                abandon(self.config.id, &e, slot);
                None
            }
        }
    }

    /// Snapshot inline if due at `now`. Returns whether a snapshot was written.
    ///
    /// Failures are logged and reported as `false`.
    pub fn backup_if_due(&mut self, now: Instant) -> bool {
        self.prepare_backup(now).is_some_and(BackupJob::run)
    }
}
