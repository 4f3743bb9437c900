//! Core storage engine traits.

use std::path::Path;
use std::sync::Arc;

use super::StorageError;

/// An owned key-value pair returned by scans.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// A storage engine that provides transactional key-value operations.
///
/// Keys live in named logical tables. Engines must be usable from several
/// threads at once; isolation between concurrent transactions is provided by
/// the backend.
pub trait StorageEngine: Send + Sync {
    /// The transaction type for this engine.
    type Transaction<'a>: Transaction
    where
        Self: 'a;

    /// Begin a read-only transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] if the backend cannot start one.
    fn begin_read(&self) -> Result<Self::Transaction<'_>, StorageError>;

    /// Begin a read-write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] if the backend cannot start one.
    fn begin_write(&self) -> Result<Self::Transaction<'_>, StorageError>;

    /// Make committed data durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to flush.
    fn flush(&self) -> Result<(), StorageError>;

    /// Write a consistent copy of every committed row to a new database file
    /// at `path`, replacing any previous copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy cannot be created or written.
    fn snapshot_to(&self, path: &Path) -> Result<(), StorageError>;
}

/// A transaction that provides key-value operations.
pub trait Transaction {
    /// Get a value by key from a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Put a key-value pair into a table, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`] on a read transaction.
    fn put(&mut self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Delete a key from a table. Returns whether the key existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`] on a read transaction.
    fn delete(&mut self, table: &str, key: &[u8]) -> Result<bool, StorageError>;

    /// All pairs of a table whose key starts with `prefix`, in key order.
    ///
    /// An empty prefix scans the whole table.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn scan_prefix(&self, table: &str, prefix: &[u8]) -> Result<Vec<KeyValue>, StorageError>;

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] if the commit fails.
    fn commit(self) -> Result<(), StorageError>;

    /// Roll back the transaction (implicit on drop for uncommitted transactions).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses to abort.
    fn rollback(self) -> Result<(), StorageError>;

    /// Whether this transaction rejects writes.
    fn is_read_only(&self) -> bool;
}

impl<E: StorageEngine> StorageEngine for Arc<E> {
    type Transaction<'a>
        = E::Transaction<'a>
    where
        Self: 'a;

    fn begin_read(&self) -> Result<Self::Transaction<'_>, StorageError> {
        (**self).begin_read()
    }

    fn begin_write(&self) -> Result<Self::Transaction<'_>, StorageError> {
        (**self).begin_write()
    }

    fn flush(&self) -> Result<(), StorageError> {
        (**self).flush()
    }

    fn snapshot_to(&self, path: &Path) -> Result<(), StorageError> {
        (**self).snapshot_to(path)
    }
}
