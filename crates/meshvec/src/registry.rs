//! Collection registry.
//!
//! The [`StoreRegistry`] owns every collection on this node. Collection
//! configurations live in the catalog's `collections` table; the
//! [`VectorStore`] for a collection is opened on first use and cached behind
//! its own lock, so each collection has a single writer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use meshvec_core::{Action, BuildParams, CollectionConfig, CollectionId, HistoryEntry, Metric};
use meshvec_storage::{names, RedbEngine, StorageEngine, Transaction};
use meshvec_vector::{BackupPolicy, HistoryLog, StorePaths, VectorStore};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Storage engine used by the catalog and every collection.
pub type Engine = Arc<RedbEngine>;

/// A collection's store, shared behind its exclusive lock.
pub type SharedStore = Arc<Mutex<VectorStore<Engine>>>;

/// Lock a shared store.
///
/// # Errors
///
/// Returns [`Error::LockPoisoned`] if a thread panicked while holding it.
pub fn lock(store: &SharedStore) -> Result<MutexGuard<'_, VectorStore<Engine>>> {
    store.lock().map_err(|_| Error::lock_poisoned("collection store"))
}

/// Settings applied to every store the registry opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    /// Minimum time between snapshots of one collection.
    pub backup_interval: Duration,
    /// Largest metadata payload accepted.
    pub max_metadata_bytes: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backup_interval: BackupPolicy::DEFAULT_INTERVAL,
            max_metadata_bytes: meshvec_core::DEFAULT_MAX_METADATA_BYTES,
        }
    }
}

/// Creates, persists and caches the collections owned by this node.
pub struct StoreRegistry {
    data_dir: PathBuf,
    catalog: Engine,
    settings: StoreSettings,
    stores: RwLock<HashMap<CollectionId, SharedStore>>,
}

impl StoreRegistry {
    /// A registry over `catalog`, keeping collection files under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>, catalog: Engine, settings: StoreSettings) -> Self {
        Self { data_dir: data_dir.into(), catalog, settings, stores: RwLock::new(HashMap::new()) }
    }

    /// The catalog engine.
    #[must_use]
    pub fn catalog(&self) -> &Engine {
        &self.catalog
    }

    /// Create a collection and return its identifier.
    ///
    /// The configuration is committed to the catalog before the store is
    /// built, so the collection survives a restart as soon as this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a zero dimension, capacity or
    /// build parameter, or a storage error.
    pub fn create(
        &self,
        dimension: usize,
        metric: Metric,
        capacity: usize,
        build: BuildParams,
    ) -> Result<CollectionId> {
        let config = CollectionConfig::new(dimension, metric, capacity, build)?;
        let id = config.id;

        self.save_config(&config)?;
        let history = self.history_log(id);
        history.append(&HistoryEntry::now(
            Action::Create,
            None,
            format!("dim={dimension} metric={metric} capacity={capacity}"),
        ))?;

        let (engine, paths) = self.open_files(id)?;
        let store = VectorStore::create(config, engine, history, paths, self.backup_policy())?
            .with_max_metadata_bytes(self.settings.max_metadata_bytes);

        self.write_stores()?.insert(id, Arc::new(Mutex::new(store)));
        info!(collection = %id, dimension, %metric, capacity, "created collection");
        Ok(id)
    }

    /// The store of a collection, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no configuration exists for `id`.
    pub fn get(&self, id: CollectionId) -> Result<SharedStore> {
        self.lookup(id)?.ok_or_else(|| Error::NotFound(format!("collection {id}")))
    }

    /// Like [`get`](Self::get), returning `None` for unknown collections.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection exists but cannot be opened.
    pub fn lookup(&self, id: CollectionId) -> Result<Option<SharedStore>> {
        if let Some(store) = self.read_stores()?.get(&id) {
            return Ok(Some(Arc::clone(store)));
        }

        let Some(config) = self.load_config(id)? else {
            return Ok(None);
        };

        let mut stores = self.write_stores()?;
        // Another caller may have opened it while we read the config.
        if let Some(store) = stores.get(&id) {
            return Ok(Some(Arc::clone(store)));
        }

        let (engine, paths) = self.open_files(id)?;
        let store = VectorStore::open(config, engine, self.history_log(id), paths, self.backup_policy())?
            .with_max_metadata_bytes(self.settings.max_metadata_bytes);
        let store = Arc::new(Mutex::new(store));
        stores.insert(id, Arc::clone(&store));
        debug!(collection = %id, "opened collection from catalog");
        Ok(Some(store))
    }

    /// Whether a configuration exists for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    pub fn contains(&self, id: CollectionId) -> Result<bool> {
        if self.read_stores()?.contains_key(&id) {
            return Ok(true);
        }
        Ok(self.load_config(id)?.is_some())
    }

    /// Configurations of every collection in the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    pub fn list(&self) -> Result<Vec<CollectionConfig>> {
        let tx = self.catalog.begin_read()?;
        tx.scan_prefix(names::COLLECTIONS, b"")?
            .into_iter()
            .map(|(_, value)| decode_config(&value))
            .collect()
    }

    /// Identifiers of every collection in the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    pub fn ids(&self) -> Result<Vec<CollectionId>> {
        Ok(self.list()?.into_iter().map(|c| c.id).collect())
    }

    /// Stores currently open, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockPoisoned`] if the registry lock is poisoned.
    pub fn open_stores(&self) -> Result<Vec<(CollectionId, SharedStore)>> {
        Ok(self.read_stores()?.iter().map(|(id, store)| (*id, Arc::clone(store))).collect())
    }

    /// Raise the capacity of a collection and persist the new configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown collections and
    /// [`Error::InvalidArgument`] if `capacity` would shrink the collection.
    pub fn resize(&self, id: CollectionId, capacity: usize) -> Result<()> {
        let store = self.get(id)?;
        let mut store = lock(&store)?;
        store.resize(capacity)?;
        self.save_config(store.config())?;
        info!(collection = %id, capacity, "resized collection");
        Ok(())
    }

    fn backup_policy(&self) -> BackupPolicy {
        BackupPolicy::new(self.settings.backup_interval)
    }

    fn history_log(&self, id: CollectionId) -> HistoryLog<Engine> {
        HistoryLog::new(Arc::clone(&self.catalog), id)
    }

    fn open_files(&self, id: CollectionId) -> Result<(Engine, StorePaths)> {
        let paths = StorePaths::new(self.data_dir.join("collections").join(id.to_string()));
        std::fs::create_dir_all(paths.dir())?;
        let engine = Arc::new(RedbEngine::open(paths.store_file())?);
        Ok((engine, paths))
    }

    fn save_config(&self, config: &CollectionConfig) -> Result<()> {
        let value = bincode::serde::encode_to_vec(config, bincode::config::standard())
            .map_err(|e| Error::serialization(e.to_string()))?;
        let mut tx = self.catalog.begin_write()?;
        tx.put(names::COLLECTIONS, config.id.as_bytes(), &value)?;
        tx.commit()?;
        Ok(())
    }

    fn load_config(&self, id: CollectionId) -> Result<Option<CollectionConfig>> {
        let tx = self.catalog.begin_read()?;
        tx.get(names::COLLECTIONS, id.as_bytes())?.map(|bytes| decode_config(&bytes)).transpose()
    }

    fn read_stores(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<CollectionId, SharedStore>>> {
        self.stores.read().map_err(|_| Error::lock_poisoned("store registry"))
    }

    fn write_stores(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<CollectionId, SharedStore>>> {
        self.stores.write().map_err(|_| Error::lock_poisoned("store registry"))
    }
}

fn decode_config(bytes: &[u8]) -> Result<CollectionConfig> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(config, _)| config)
        .map_err(|e| Error::serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshvec_core::VectorHandle;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> StoreRegistry {
        let catalog = Arc::new(RedbEngine::open(dir.path().join("catalog.redb")).expect("catalog"));
        StoreRegistry::new(dir.path(), catalog, StoreSettings::default())
    }

    #[test]
    fn test_create_and_get() {
        let dir = TempDir::new().expect("tempdir");
        let registry = registry(&dir);
        let id = registry.create(3, Metric::SquaredEuclidean, 100, BuildParams::default()).expect("create");

        assert!(registry.contains(id).expect("contains"));
        let store = registry.get(id).expect("get");
        assert_eq!(lock(&store).expect("lock").config().dimension, 3);
        assert!(dir.path().join("collections").join(id.to_string()).join("store.redb").exists());
    }

    #[test]
    fn test_unknown_collection() {
        let dir = TempDir::new().expect("tempdir");
        let registry = registry(&dir);
        let id = CollectionId::generate();
        assert!(matches!(registry.get(id), Err(Error::NotFound(_))));
        assert!(registry.lookup(id).expect("lookup").is_none());
    }

    #[test]
    fn test_rejects_zero_dimension() {
        let dir = TempDir::new().expect("tempdir");
        let registry = registry(&dir);
        let err = registry.create(0, Metric::Cosine, 10, BuildParams::default()).expect_err("zero dim");
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(registry.list().expect("list").is_empty());
    }

    #[test]
    fn test_collections_survive_restart() {
        let dir = TempDir::new().expect("tempdir");
        let (id, handle) = {
            let registry = registry(&dir);
            let id = registry.create(2, Metric::InnerProduct, 10, BuildParams::default()).expect("create");
            let store = registry.get(id).expect("get");
            let handle = lock(&store).expect("lock").add("v", &[0.5, 0.5], None).expect("add");
            (id, handle)
        };

        let registry = registry(&dir);
        assert_eq!(registry.ids().expect("ids"), vec![id]);
        let store = registry.get(id).expect("reopen");
        let store = lock(&store).expect("lock");
        assert_eq!(store.config().metric, Metric::InnerProduct);
        assert_eq!(store.get("v").expect("get"), vec![0.5, 0.5]);
        assert_eq!(handle, VectorHandle::new(0));
    }

    #[test]
    fn test_resize_is_persisted() {
        let dir = TempDir::new().expect("tempdir");
        let id = {
            let registry = registry(&dir);
            let id = registry.create(1, Metric::SquaredEuclidean, 1, BuildParams::default()).expect("create");
            registry.resize(id, 5).expect("resize");
            assert!(matches!(registry.resize(id, 2), Err(Error::InvalidArgument(_))));
            id
        };
        let registry = registry(&dir);
        assert_eq!(registry.list().expect("list")[0].capacity, 5);
        assert!(registry.contains(id).expect("contains"));
    }

    #[test]
    fn test_create_records_history() {
        let dir = TempDir::new().expect("tempdir");
        let registry = registry(&dir);
        let id = registry.create(4, Metric::Cosine, 10, BuildParams::default()).expect("create");
        let store = registry.get(id).expect("get");
        let history = lock(&store).expect("lock").history().expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, Action::Create);
    }
}
