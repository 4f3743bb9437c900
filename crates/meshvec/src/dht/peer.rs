//! Replicated DHT over the node RPC surface.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use meshvec_storage::{names, StorageEngine, Transaction};
use tracing::{debug, info, warn};

use super::{latest_arrival, Dht, DhtSnapshot, Precedence};
use crate::error::{Error, Result};
use crate::registry::Engine;
use crate::rpc::{Reply, Request, RpcClient};

/// A DHT where every node keeps a full, persisted copy of the table.
///
/// - `put` writes the local table and pushes the pair to every known peer
/// - `get` merges the local copy with every reachable peer's copy
/// - `join` registers with a seed, adopts its peers and merges its table
///
/// When two copies of a key meet, the [`Precedence`] hook picks the one
/// kept; by default the copy that arrives last. Pushes and pulls are best
/// effort: unreachable peers are logged and skipped. There is no bucket routing; the table is small (one entry per
/// collection) and the peer set is expected to be small too.
pub struct PeerDht {
    catalog: Engine,
    client: RpcClient,
    own: RwLock<Option<String>>,
    peers: RwLock<BTreeSet<String>>,
    running: AtomicBool,
    precedence: Precedence,
}

impl PeerDht {
    /// A DHT persisting its table in `catalog` and talking to peers with `client`.
    pub fn new(catalog: Engine, client: RpcClient) -> Self {
        Self {
            catalog,
            client,
            own: RwLock::new(None),
            peers: RwLock::new(BTreeSet::new()),
            running: AtomicBool::new(false),
            precedence: latest_arrival,
        }
    }

    /// Use `precedence` to decide which copy of a key is kept.
    #[must_use]
    pub fn with_precedence(mut self, precedence: Precedence) -> Self {
        self.precedence = precedence;
        self
    }

    /// Whether `incoming` should replace `current`.
    fn prefers(&self, current: Option<&str>, incoming: &str) -> bool {
        match current {
            None => true,
            Some(current) => current != incoming && (self.precedence)(current, incoming),
        }
    }

    /// Store `value` unless the local copy takes precedence. Returns whether
    /// the local table changed.
    fn merge_local(&self, key: &str, value: &str) -> Result<bool> {
        if !self.prefers(self.read_local(key)?.as_deref(), value) {
            return Ok(false);
        }
        self.write_local(key, value)?;
        Ok(true)
    }

    fn own_address(&self) -> Result<Option<String>> {
        Ok(self.own.read().map_err(|_| Error::lock_poisoned("dht address"))?.clone())
    }

    fn peer_list(&self) -> Result<Vec<String>> {
        Ok(self.peers.read().map_err(|_| Error::lock_poisoned("dht peers"))?.iter().cloned().collect())
    }

    /// Add peers, ignoring this node. Returns the ones that were new.
    fn add_peers(&self, candidates: impl IntoIterator<Item = String>) -> Result<Vec<String>> {
        let own = self.own_address()?;
        let mut peers = self.peers.write().map_err(|_| Error::lock_poisoned("dht peers"))?;
        Ok(candidates
            .into_iter()
            .filter(|p| own.as_deref() != Some(p.as_str()))
            .filter(|p| peers.insert(p.clone()))
            .collect())
    }

    fn read_local(&self, key: &str) -> Result<Option<String>> {
        let tx = self.catalog.begin_read()?;
        tx.get(names::DHT, key.as_bytes())?
            .map(|bytes| String::from_utf8(bytes).map_err(|e| Error::serialization(e.to_string())))
            .transpose()
    }

    fn write_local(&self, key: &str, value: &str) -> Result<()> {
        let mut tx = self.catalog.begin_write()?;
        tx.put(names::DHT, key.as_bytes(), value.as_bytes())?;
        tx.commit()?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, String)>> {
        let tx = self.catalog.begin_read()?;
        tx.scan_prefix(names::DHT, b"")?
            .into_iter()
            .map(|(k, v)| {
                let key = String::from_utf8(k).map_err(|e| Error::serialization(e.to_string()))?;
                let value = String::from_utf8(v).map_err(|e| Error::serialization(e.to_string()))?;
                Ok((key, value))
            })
            .collect()
    }

    async fn register_with(&self, address: &str) -> Result<DhtSnapshot> {
        let own = self.own_address()?.ok_or_else(|| {
            Error::Configuration("dht must listen before joining".into())
        })?;
        match self.client.call(address, &Request::DhtJoin { address: own }).await? {
            Reply::Snapshot(snapshot) => Ok(snapshot),
            other => Err(Error::Remote(format!("unexpected reply to join: {other:?}"))),
        }
    }
}

#[async_trait]
impl Dht for PeerDht {
    async fn listen(&self, address: &str) -> Result<()> {
        *self.own.write().map_err(|_| Error::lock_poisoned("dht address"))? = Some(address.to_owned());
        self.running.store(true, Ordering::SeqCst);
        debug!(address, "dht listening");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.catalog.flush()?;
        debug!("dht stopped");
        Ok(())
    }

    async fn join(&self, seed: &str) -> Result<()> {
        let snapshot = self.register_with(seed).await?;
        let mut learned = self.add_peers(std::iter::once(seed.to_owned()).chain(snapshot.peers))?;
        learned.retain(|p| p != seed);

        let mut pulled = 0usize;
        for (key, value) in snapshot.entries {
            if self.merge_local(&key, &value)? {
                pulled += 1;
            }
        }

        // Announce ourselves to the rest of the network.
        for peer in learned {
            if let Err(e) = self.register_with(&peer).await {
                warn!(peer = %peer, error = %e, "failed to register with peer");
            }
        }

        info!(seed, peers = self.peer_list()?.len(), pulled, "joined network");
        Ok(())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.write_local(key, value)?;
        if !self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        for peer in self.peer_list()? {
            let request = Request::DhtStore { key: key.to_owned(), value: value.to_owned() };
            if let Err(e) = self.client.call(&peer, &request).await {
                warn!(peer = %peer, key, error = %e, "failed to push dht entry");
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let local = self.read_local(key)?;
        if !self.running.load(Ordering::SeqCst) {
            return Ok(local);
        }
        let mut best = local.clone();
        for peer in self.peer_list()? {
            match self.client.call(&peer, &Request::DhtFetch { key: key.to_owned() }).await {
                Ok(Reply::Value(Some(value))) => {
                    if self.prefers(best.as_deref(), &value) {
                        best = Some(value);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(peer = %peer, key, error = %e, "failed to query peer"),
            }
        }
        if let Some(value) = best.as_deref().filter(|v| local.as_deref() != Some(*v)) {
            debug!(key, "refreshed local copy");
            self.write_local(key, value)?;
        }
        Ok(best)
    }

    async fn store_local(&self, key: &str, value: &str) -> Result<()> {
        if !self.merge_local(key, value)? {
            debug!(key, "kept local copy over pushed one");
        }
        Ok(())
    }

    async fn fetch_local(&self, key: &str) -> Result<Option<String>> {
        self.read_local(key)
    }

    async fn accept_peer(&self, address: &str) -> Result<DhtSnapshot> {
        if !self.add_peers(std::iter::once(address.to_owned()))?.is_empty() {
            info!(peer = address, "peer joined");
        }
        let mut peers = self.peer_list()?;
        if let Some(own) = self.own_address()? {
            peers.push(own);
        }
        Ok(DhtSnapshot { peers, entries: self.entries()? })
    }

    async fn peers(&self) -> Result<Vec<String>> {
        self.peer_list()
    }
}
