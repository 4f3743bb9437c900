//! redb-backed storage engine.

use std::fs;
use std::path::Path;

use redb::{Database, ReadableTable, TableError};
use tracing::debug;

use crate::engine::{StorageEngine, StorageError};

use super::tables::DATA_TABLE;
use super::transaction::RedbTransaction;

/// A storage engine over one redb database file.
///
/// The node catalog and every collection get their own file. Commits are
/// durable when they return, so [`flush`](StorageEngine::flush) has nothing
/// left to do.
///
/// ```ignore
/// use meshvec_storage::{names, RedbEngine, StorageEngine, Transaction};
///
/// let engine = RedbEngine::open("catalog.redb")?;
/// let mut tx = engine.begin_write()?;
/// tx.put(names::COLLECTIONS, id.as_bytes(), &config_bytes)?;
/// tx.commit()?;
/// ```
pub struct RedbEngine {
    db: Database,
}

impl RedbEngine {
    /// Open the database at `path`, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened, for
    /// example because another engine holds it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(open_error)?;
        Ok(Self { db })
    }

    /// A database that lives in memory only.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if redb cannot initialise the backend.
    pub fn in_memory() -> Result<Self, StorageError> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(open_error)?;
        Ok(Self { db })
    }

    fn copy_rows(&self, target: &Database) -> Result<usize, StorageError> {
        let source = self.db.begin_read().map_err(tx_error)?;
        let dest = target.begin_write().map_err(tx_error)?;
        let mut copied = 0;
        {
            let mut out = dest.open_table(DATA_TABLE).map_err(internal)?;
            let table = match source.open_table(DATA_TABLE) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => {
                    drop(out);
                    dest.commit().map_err(tx_error)?;
                    return Ok(0);
                }
                Err(e) => return Err(internal(e)),
            };
            for row in table.iter().map_err(internal)? {
                let (key, value) = row.map_err(internal)?;
                out.insert(key.value(), value.value()).map_err(internal)?;
                copied += 1;
            }
        }
        dest.commit().map_err(tx_error)?;
        Ok(copied)
    }
}

impl StorageEngine for RedbEngine {
    type Transaction<'a> = RedbTransaction;

    fn begin_read(&self) -> Result<Self::Transaction<'_>, StorageError> {
        Ok(RedbTransaction::new_read(self.db.begin_read().map_err(tx_error)?))
    }

    fn begin_write(&self) -> Result<Self::Transaction<'_>, StorageError> {
        Ok(RedbTransaction::new_write(self.db.begin_write().map_err(tx_error)?))
    }

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn snapshot_to(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Written beside the target and renamed, so a crash never leaves a torn copy.
        let staging = path.with_extension("partial");
        if staging.exists() {
            fs::remove_file(&staging)?;
        }

        let rows = {
            let target = Database::create(&staging).map_err(open_error)?;
            self.copy_rows(&target)?
        };
        fs::rename(&staging, path)?;
        debug!(path = %path.display(), rows, "wrote storage snapshot");
        Ok(())
    }
}

fn open_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Open(e.to_string())
}

fn tx_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Transaction(e.to_string())
}

fn internal(e: impl std::fmt::Display) -> StorageError {
    StorageError::Internal(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::names;
    use crate::engine::Transaction;

    #[test]
    fn test_read_transactions_are_read_only() {
        let engine = RedbEngine::in_memory().expect("engine");
        assert!(engine.begin_read().expect("read").is_read_only());
        assert!(!engine.begin_write().expect("write").is_read_only());
    }

    #[test]
    fn test_snapshot_copies_every_logical_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = RedbEngine::in_memory().expect("engine");
        {
            let mut tx = engine.begin_write().expect("write");
            tx.put(names::VECTORS, b"fp", b"row").expect("put");
            tx.put(names::METADATA, b"fp", b"meta").expect("put");
            tx.commit().expect("commit");
        }

        let path = dir.path().join("backup").join("store.redb");
        engine.snapshot_to(&path).expect("snapshot");
        assert!(!path.with_extension("partial").exists());

        let copy = RedbEngine::open(&path).expect("open copy");
        let tx = copy.begin_read().expect("read");
        assert_eq!(tx.get(names::VECTORS, b"fp").expect("get"), Some(b"row".to_vec()));
        assert_eq!(tx.get(names::METADATA, b"fp").expect("get"), Some(b"meta".to_vec()));
    }

    #[test]
    fn test_snapshot_of_empty_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = RedbEngine::in_memory().expect("engine");
        let path = dir.path().join("empty.redb");
        engine.snapshot_to(&path).expect("snapshot");

        let copy = RedbEngine::open(&path).expect("open copy");
        let tx = copy.begin_read().expect("read");
        assert!(tx.scan_prefix(names::VECTORS, b"").expect("scan").is_empty());
    }

    #[test]
    fn test_second_snapshot_replaces_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = RedbEngine::in_memory().expect("engine");
        let path = dir.path().join("store.redb");
        engine.snapshot_to(&path).expect("first");

        {
            let mut tx = engine.begin_write().expect("write");
            tx.put(names::VECTORS, b"late", b"row").expect("put");
            tx.commit().expect("commit");
        }
        engine.snapshot_to(&path).expect("second");

        let copy = RedbEngine::open(&path).expect("open copy");
        let tx = copy.begin_read().expect("read");
        assert!(tx.get(names::VECTORS, b"late").expect("get").is_some());
    }
}
