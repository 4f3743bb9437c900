//! In-process DHT.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{Dht, DhtSnapshot};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Shared {
    entries: BTreeMap<String, String>,
    peers: BTreeSet<String>,
}

/// A DHT backed by one in-memory table.
///
/// Every clone shares the table, so nodes in the same process that hold
/// clones of one `MemoryDht` see a single, immediately consistent
/// directory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDht {
    shared: Arc<RwLock<Shared>>,
}

impl MemoryDht {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockPoisoned`] if the table lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.entries.len())
    }

    /// Whether no key is stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockPoisoned`] if the table lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Shared>> {
        self.shared.read().map_err(|_| Error::lock_poisoned("memory dht"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Shared>> {
        self.shared.write().map_err(|_| Error::lock_poisoned("memory dht"))
    }
}

#[async_trait]
impl Dht for MemoryDht {
    async fn listen(&self, address: &str) -> Result<()> {
        self.write()?.peers.insert(address.to_owned());
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn join(&self, _seed: &str) -> Result<()> {
        Ok(())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.write()?.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.entries.get(key).cloned())
    }

    async fn store_local(&self, key: &str, value: &str) -> Result<()> {
        self.put(key, value).await
    }

    async fn fetch_local(&self, key: &str) -> Result<Option<String>> {
        self.get(key).await
    }

    async fn accept_peer(&self, address: &str) -> Result<DhtSnapshot> {
        let mut shared = self.write()?;
        shared.peers.insert(address.to_owned());
        Ok(DhtSnapshot {
            peers: shared.peers.iter().cloned().collect(),
            entries: shared.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }

    async fn peers(&self) -> Result<Vec<String>> {
        Ok(self.read()?.peers.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_the_table() {
        let a = MemoryDht::new();
        let b = a.clone();
        a.put("k", "v1").await.expect("put");
        assert_eq!(b.get("k").await.expect("get").as_deref(), Some("v1"));

        b.put("k", "v2").await.expect("put");
        assert_eq!(a.get("k").await.expect("get").as_deref(), Some("v2"));
        assert_eq!(a.len().expect("len"), 1);
    }

    #[tokio::test]
    async fn test_missing_key() {
        let dht = MemoryDht::new();
        assert!(dht.get("nope").await.expect("get").is_none());
        assert!(dht.is_empty().expect("empty"));
    }
}
