//! Distributed key-value collaborator.
//!
//! The location directory only needs eventually consistent `put`/`get`
//! over string keys. [`Dht`] is that contract plus the replica protocol a
//! node serves to its peers (`store_local`, `fetch_local`, `accept_peer`).
//!
//! Implementations:
//!
//! - [`MemoryDht`]: one table shared in-process; clones see each other's writes
//! - [`PeerDht`]: a persisted table per node, replicated to known peers over RPC

mod memory;
mod peer;

pub use memory::MemoryDht;
pub use peer::PeerDht;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Decides whether `incoming` replaces `current` when two copies of one
/// key meet.
pub type Precedence = fn(current: &str, incoming: &str) -> bool;

/// The copy that arrives last replaces the stored one.
#[must_use]
pub fn latest_arrival(_current: &str, _incoming: &str) -> bool {
    true
}

/// What a node hands to a peer that joins through it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhtSnapshot {
    /// Peers known to the node, including itself.
    pub peers: Vec<String>,
    /// Every key-value pair the node stores.
    pub entries: Vec<(String, String)>,
}

/// An eventually consistent, best-effort key-value service.
#[async_trait]
pub trait Dht: Send + Sync {
    /// Start serving under `address` (`host:port`).
    async fn listen(&self, address: &str) -> Result<()>;

    /// Stop serving. Later calls are answered from local state only.
    async fn stop(&self) -> Result<()>;

    /// Join the network through the node at `seed`.
    async fn join(&self, seed: &str) -> Result<()>;

    /// Publish `value` under `key`. The latest write wins.
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Look up `key` anywhere in the network.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a pair pushed by a peer, without propagating it further.
    async fn store_local(&self, key: &str, value: &str) -> Result<()>;

    /// Look up `key` in this node's table only.
    async fn fetch_local(&self, key: &str) -> Result<Option<String>>;

    /// Register a joining peer and return this node's view of the network.
    async fn accept_peer(&self, address: &str) -> Result<DhtSnapshot>;

    /// Peers this node knows about.
    async fn peers(&self) -> Result<Vec<String>>;
}
