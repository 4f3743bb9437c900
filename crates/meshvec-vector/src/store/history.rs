//! Append-only collection history.

use std::sync::atomic::{AtomicU64, Ordering};

use meshvec_core::{CollectionId, Fingerprint, HistoryEntry};
use meshvec_storage::{names, StorageEngine, Transaction};

use crate::error::VectorError;

/// History of one collection, stored in the node catalog.
///
/// Keys are `collection id ‖ timestamp (µs, big-endian) ‖ entry id`, so a
/// prefix scan returns entries oldest first. Entries are never rewritten.
pub struct HistoryLog<E: StorageEngine> {
    engine: E,
    collection: CollectionId,
    last_micros: AtomicU64,
}

impl<E: StorageEngine> HistoryLog<E> {
    /// History of `collection` in `engine`.
    pub fn new(engine: E, collection: CollectionId) -> Self {
        Self { engine, collection, last_micros: AtomicU64::new(0) }
    }

    /// The collection this log belongs to.
    pub fn collection(&self) -> CollectionId {
        self.collection
    }

    /// Append an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be encoded or stored.
    pub fn append(&self, entry: &HistoryEntry) -> Result<(), VectorError> {
        let key = self.next_key(entry);
        let value = bincode::serde::encode_to_vec(entry, bincode::config::standard())
            .map_err(|e| VectorError::Encoding(e.to_string()))?;
        let mut tx = self.engine.begin_write()?;
        tx.put(names::HISTORY, &key, &value)?;
        tx.commit()?;
        Ok(())
    }

    /// Every entry, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be read or decoded.
    pub fn entries(&self) -> Result<Vec<HistoryEntry>, VectorError> {
        let tx = self.engine.begin_read()?;
        tx.scan_prefix(names::HISTORY, self.collection.as_bytes())?
            .into_iter()
            .map(|(_, value)| {
                bincode::serde::decode_from_slice::<HistoryEntry, _>(&value, bincode::config::standard())
                    .map(|(entry, _)| entry)
                    .map_err(|e| VectorError::Encoding(e.to_string()))
            })
            .collect()
    }

    /// Entries recorded for one fingerprint, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be read or decoded.
    pub fn entries_for(&self, fingerprint: &Fingerprint) -> Result<Vec<HistoryEntry>, VectorError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.fingerprint.as_ref() == Some(fingerprint))
            .collect())
    }

    /// Storage key for `entry`, strictly after every key this log produced.
    #[allow(clippy::cast_sign_loss)]
    fn next_key(&self, entry: &HistoryEntry) -> Vec<u8> {
        let stamp = entry.timestamp.timestamp_micros().max(0) as u64;
        let prev = self
            .last_micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(stamp.max(last + 1)))
            .unwrap_or(stamp);
        let micros = stamp.max(prev + 1);

        let mut key = Vec::with_capacity(16 + 8 + 16);
        key.extend_from_slice(self.collection.as_bytes());
        key.extend_from_slice(&micros.to_be_bytes());
        key.extend_from_slice(entry.id.as_bytes());
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshvec_core::Action;
    use meshvec_storage::RedbEngine;
    use std::sync::Arc;

    #[test]
    fn test_entries_are_ordered_and_scoped() {
        let engine = Arc::new(RedbEngine::in_memory().expect("engine"));
        let a = HistoryLog::new(Arc::clone(&engine), CollectionId::generate());
        let b = HistoryLog::new(Arc::clone(&engine), CollectionId::generate());

        let fp = Fingerprint::from_bytes([1; 32]);
        a.append(&HistoryEntry::now(Action::Create, None, "dim=3")).expect("append");
        a.append(&HistoryEntry::now(Action::Add, Some(fp), "first")).expect("append");
        b.append(&HistoryEntry::now(Action::Create, None, "other")).expect("append");
        a.append(&HistoryEntry::now(Action::Delete, Some(fp), "gone")).expect("append");

        let actions: Vec<_> = a.entries().expect("entries").iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![Action::Create, Action::Add, Action::Delete]);
        assert_eq!(b.entries().expect("entries").len(), 1);
        assert_eq!(a.entries_for(&fp).expect("entries").len(), 2);
    }
}
