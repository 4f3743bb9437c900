//! Collection ownership directory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use meshvec_core::CollectionId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dht::Dht;
use crate::error::Result;

/// Who owns a collection, as published in the DHT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// `host:port` of the owning node.
    pub address: String,
    /// When the owner last published the claim.
    pub claimed_at: DateTime<Utc>,
}

impl LocationRecord {
    /// Whether this claim was published after `other`.
    #[must_use]
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.claimed_at > other.claimed_at
    }
}

/// DHT precedence for encoded records: the later claim wins.
///
/// A malformed stored copy is always replaced; a malformed incoming copy
/// never replaces anything.
#[must_use]
pub fn newer_claim(current: &str, incoming: &str) -> bool {
    let Ok(incoming) = serde_json::from_str::<LocationRecord>(incoming) else {
        return false;
    };
    serde_json::from_str::<LocationRecord>(current).map_or(true, |current| incoming.is_newer_than(&current))
}

/// Maps collection identifiers to the address of their owning node.
///
/// Records are JSON [`LocationRecord`]s keyed by the collection id. A claim
/// overwrites whatever was there; there is no lease and no expiry. Replicas
/// that disagree settle on the later claim through [`newer_claim`].
#[derive(Clone)]
pub struct LocationDirectory {
    dht: Arc<dyn Dht>,
}

impl LocationDirectory {
    /// A directory stored in `dht`.
    pub fn new(dht: Arc<dyn Dht>) -> Self {
        Self { dht }
    }

    /// The underlying DHT.
    #[must_use]
    pub fn dht(&self) -> &Arc<dyn Dht> {
        &self.dht
    }

    /// Publish `address` as the owner of `collection`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or stored.
    pub async fn claim(&self, collection: CollectionId, address: &str) -> Result<()> {
        let record = LocationRecord { address: address.to_owned(), claimed_at: Utc::now() };
        self.dht.put(&collection.to_string(), &serde_json::to_string(&record)?).await?;
        debug!(%collection, address, "claimed collection");
        Ok(())
    }

    /// The current owner of `collection`, if any node has claimed it.
    ///
    /// # Errors
    ///
    /// Returns an error if the DHT fails or holds a malformed record.
    pub async fn resolve(&self, collection: CollectionId) -> Result<Option<LocationRecord>> {
        let Some(raw) = self.dht.get(&collection.to_string()).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::MemoryDht;
    use crate::error::Error;

    #[tokio::test]
    async fn test_unclaimed_collection_resolves_to_none() {
        let directory = LocationDirectory::new(Arc::new(MemoryDht::new()));
        assert!(directory.resolve(CollectionId::generate()).await.expect("resolve").is_none());
    }

    #[tokio::test]
    async fn test_last_claim_wins() {
        let dht = MemoryDht::new();
        let a = LocationDirectory::new(Arc::new(dht.clone()));
        let b = LocationDirectory::new(Arc::new(dht));
        let id = CollectionId::generate();

        a.claim(id, "10.0.0.1:8468").await.expect("claim");
        assert_eq!(b.resolve(id).await.expect("resolve").expect("record").address, "10.0.0.1:8468");

        b.claim(id, "10.0.0.2:8468").await.expect("claim");
        assert_eq!(a.resolve(id).await.expect("resolve").expect("record").address, "10.0.0.2:8468");
    }

    fn encoded(address: &str, claimed_at: &str) -> String {
        let claimed_at = claimed_at.parse().expect("timestamp");
        serde_json::to_string(&LocationRecord { address: address.to_owned(), claimed_at }).expect("encode")
    }

    #[test]
    fn test_later_claim_takes_precedence() {
        let stale = encoded("127.0.0.1:9", "2020-01-01T00:00:00Z");
        let fresh = encoded("127.0.0.1:8468", "2024-06-01T12:00:00Z");

        assert!(newer_claim(&stale, &fresh));
        assert!(!newer_claim(&fresh, &stale));
        assert!(!newer_claim(&fresh, &fresh));
    }

    #[test]
    fn test_malformed_copies_lose() {
        let fresh = encoded("127.0.0.1:8468", "2024-06-01T12:00:00Z");
        assert!(newer_claim("not json", &fresh));
        assert!(!newer_claim(&fresh, "not json"));
    }

    #[tokio::test]
    async fn test_malformed_record() {
        let dht = MemoryDht::new();
        let id = CollectionId::generate();
        dht.put(&id.to_string(), "not json").await.expect("put");
        let directory = LocationDirectory::new(Arc::new(dht));
        assert!(matches!(directory.resolve(id).await, Err(Error::Serialization(_))));
    }
}
