//! Redb transaction implementation.

use redb::{ReadTransaction, ReadableTable, WriteTransaction};

use crate::engine::{KeyValue, StorageError, Transaction};

use super::tables::{decode_key, encode_key, prefix_end, DATA_TABLE};

/// A transaction for the Redb storage engine.
///
/// Wraps both read-only and read-write Redb transactions behind the
/// [`Transaction`] trait.
#[allow(clippy::large_enum_variant)]
pub enum RedbTransaction {
    /// A read-only transaction.
    Read(ReadTransaction),
    /// A read-write transaction.
    Write(WriteTransaction),
}

impl RedbTransaction {
    /// Create a new read-only transaction.
    pub const fn new_read(tx: ReadTransaction) -> Self {
        Self::Read(tx)
    }

    /// Create a new read-write transaction.
    pub const fn new_write(tx: WriteTransaction) -> Self {
        Self::Write(tx)
    }
}

/// Collect every row in `[start, end)` of a readable table, stripping the
/// logical table prefix from the keys.
fn collect_range<T>(table: &T, start: &[u8], end: Option<&[u8]>) -> Result<Vec<KeyValue>, StorageError>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let range = match end {
        Some(end) => table.range(start..end),
        None => table.range(start..),
    }
    .map_err(|e| StorageError::Internal(e.to_string()))?;

    let mut entries = Vec::new();
    for row in range {
        let (k, v) = row.map_err(|e| StorageError::Internal(e.to_string()))?;
        if let Some((_, key)) = decode_key(k.value()) {
            entries.push((key.to_vec(), v.value().to_vec()));
        }
    }
    Ok(entries)
}

impl Transaction for RedbTransaction {
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let encoded_key = encode_key(table, key);

        let found = match self {
            Self::Read(tx) => match tx.open_table(DATA_TABLE) {
                Ok(t) => t.get(encoded_key.as_slice()).map(|v| v.map(|v| v.value().to_vec())),
                // No data table means no data, which is not an error
                Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(e) => return Err(StorageError::Internal(e.to_string())),
            },
            Self::Write(tx) => match tx.open_table(DATA_TABLE) {
                Ok(t) => t.get(encoded_key.as_slice()).map(|v| v.map(|v| v.value().to_vec())),
                Err(e) => return Err(StorageError::Internal(e.to_string())),
            },
        };
        found.map_err(|e| StorageError::Internal(e.to_string()))
    }

    fn put(&mut self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        match self {
            Self::Read(_) => Err(StorageError::ReadOnly),
            Self::Write(tx) => {
                let encoded_key = encode_key(table, key);
                let mut t =
                    tx.open_table(DATA_TABLE).map_err(|e| StorageError::Internal(e.to_string()))?;
                t.insert(encoded_key.as_slice(), value)
                    .map_err(|e| StorageError::Internal(e.to_string()))?;
                Ok(())
            }
        }
    }

    fn delete(&mut self, table: &str, key: &[u8]) -> Result<bool, StorageError> {
        match self {
            Self::Read(_) => Err(StorageError::ReadOnly),
            Self::Write(tx) => {
                let encoded_key = encode_key(table, key);
                let mut t =
                    tx.open_table(DATA_TABLE).map_err(|e| StorageError::Internal(e.to_string()))?;
                let removed = t
                    .remove(encoded_key.as_slice())
                    .map_err(|e| StorageError::Internal(e.to_string()))?;
                Ok(removed.is_some())
            }
        }
    }

    fn scan_prefix(&self, table: &str, prefix: &[u8]) -> Result<Vec<KeyValue>, StorageError> {
        let start = encode_key(table, prefix);
        let end = prefix_end(&start);

        match self {
            Self::Read(tx) => match tx.open_table(DATA_TABLE) {
                Ok(t) => collect_range(&t, &start, end.as_deref()),
                Err(redb::TableError::TableDoesNotExist(_)) => Ok(Vec::new()),
                Err(e) => Err(StorageError::Internal(e.to_string())),
            },
            Self::Write(tx) => match tx.open_table(DATA_TABLE) {
                Ok(t) => collect_range(&t, &start, end.as_deref()),
                Err(e) => Err(StorageError::Internal(e.to_string())),
            },
        }
    }

    fn commit(self) -> Result<(), StorageError> {
        match self {
            Self::Read(_) => Ok(()),
            Self::Write(tx) => tx.commit().map_err(|e| StorageError::Transaction(e.to_string())),
        }
    }

    fn rollback(self) -> Result<(), StorageError> {
        match self {
            Self::Read(_) => Ok(()),
            Self::Write(tx) => tx.abort().map_err(|e| StorageError::Transaction(e.to_string())),
        }
    }

    fn is_read_only(&self) -> bool {
        matches!(self, Self::Read(_))
    }
}
