//! Request routing between nodes.
//!
//! Every collection operation goes through [`PeerNode::route`]:
//!
//! ```text
//!  Unresolved ──local registry hit──▶ LocalHit (execute, then claim if mutating)
//!      │
//!      └─miss─▶ resolve in directory ──none──────────▶ Failed (LocationUnknown)
//!                    │
//!                    ├─ own address ─────────────────▶ Failed (LocalNotFound)
//!                    │
//!                    └─ other address ─▶ RemoteForward (owner's result)
//! ```
//!
//! Forwarded requests carry the addresses they already passed through. A
//! node refuses a request that has visited it before or that would exceed
//! the hop limit, so a stale or cyclic directory cannot loop forever.

use std::sync::Arc;

use meshvec_core::{BuildParams, CollectionId, HistoryEntry, Metadata, Metric, VectorHandle};
use meshvec_vector::{Filter, Neighbor};
use tracing::{debug, instrument, warn};

use crate::directory::LocationDirectory;
use crate::error::{Error, Result};
use crate::registry::{lock, SharedStore, StoreRegistry};
use crate::rpc::{Operation, Reply, Request, Routed, RpcClient};

/// The node-level façade: local registry first, then the owner.
pub struct PeerNode {
    address: String,
    registry: Arc<StoreRegistry>,
    directory: LocationDirectory,
    client: RpcClient,
    max_hops: usize,
}

impl PeerNode {
    /// A node published as `address`.
    pub fn new(
        address: impl Into<String>,
        registry: Arc<StoreRegistry>,
        directory: LocationDirectory,
        client: RpcClient,
        max_hops: usize,
    ) -> Self {
        Self { address: address.into(), registry, directory, client, max_hops }
    }

    /// The address this node publishes.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The local registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    /// The ownership directory.
    #[must_use]
    pub fn directory(&self) -> &LocationDirectory {
        &self.directory
    }

    /// Create a collection on this node and claim it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for invalid parameters, or a storage error.
    pub async fn create(
        &self,
        dimension: usize,
        metric: Metric,
        capacity: usize,
        build: BuildParams,
    ) -> Result<CollectionId> {
        let id = self.registry.create(dimension, metric, capacity, build)?;
        self.publish_claim(id).await;
        Ok(id)
    }

    /// Route `operation` to the owner of `collection`.
    ///
    /// `visited` lists the nodes that already forwarded the request; callers
    /// starting a new request pass an empty list.
    ///
    /// # Errors
    ///
    /// - [`Error::LocationUnknown`] if no owner is recorded
    /// - [`Error::LocalNotFound`] if this node is recorded as owner but lacks the collection
    /// - [`Error::RemoteUnreachable`] if the owner cannot be reached, or the
    ///   request looped or ran out of hops
    /// - any error the owner's store reports
    #[instrument(skip(self, operation, visited), fields(node = %self.address, op = operation.name()))]
    pub async fn route(
        &self,
        collection: CollectionId,
        operation: Operation,
        mut visited: Vec<String>,
    ) -> Result<Reply> {
        if visited.iter().any(|a| a == &self.address) {
            debug!(?visited, "refusing looped request");
            let path = visited.join(" -> ");
            return Err(Error::unreachable(&self.address, format!("forwarding loop through {path}")));
        }

        if let Some(store) = self.registry.lookup(collection)? {
            debug!("local hit");
            let mutating = operation.is_mutating();
            let reply = execute(&store, operation)?;
            if mutating {
                self.publish_claim(collection).await;
            }
            return Ok(reply);
        }

        let record = match self.directory.resolve(collection).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(Error::LocationUnknown(collection)),
            Err(e) => {
                warn!(error = %e, "directory lookup failed");
                return Err(Error::LocationUnknown(collection));
            }
        };

        if record.address == self.address {
            return Err(Error::LocalNotFound(collection));
        }
        if visited.len() >= self.max_hops {
            debug!(hops = visited.len(), "hop limit reached");
            return Err(Error::unreachable(
                &record.address,
                format!("hop limit of {} reached", self.max_hops),
            ));
        }

        debug!(owner = %record.address, "forwarding");
        visited.push(self.address.clone());
        let request = Request::Route(Routed { collection, operation, visited });
        self.client.call(&record.address, &request).await
    }

    async fn publish_claim(&self, collection: CollectionId) {
        if let Err(e) = self.directory.claim(collection, &self.address).await {
            warn!(%collection, error = %e, "failed to publish ownership claim");
        }
    }

    /// Add a vector to a collection, wherever it lives.
    ///
    /// # Errors
    ///
    /// See [`route`](Self::route).
    pub async fn add(
        &self,
        collection: CollectionId,
        external_id: &str,
        vector: Vec<f32>,
        metadata: Option<Metadata>,
    ) -> Result<VectorHandle> {
        let op = Operation::Add {
            external_id: external_id.to_owned(),
            vector,
            metadata: metadata.map(Metadata::into_bytes),
        };
        match self.route(collection, op, Vec::new()).await? {
            Reply::Handle(handle) => Ok(handle),
            other => Err(unexpected(&other)),
        }
    }

    /// Fetch a stored vector.
    ///
    /// # Errors
    ///
    /// See [`route`](Self::route).
    pub async fn get(&self, collection: CollectionId, external_id: &str) -> Result<Vec<f32>> {
        let op = Operation::Get { external_id: external_id.to_owned() };
        match self.route(collection, op, Vec::new()).await? {
            Reply::Vector(vector) => Ok(vector),
            other => Err(unexpected(&other)),
        }
    }

    /// Replace a stored vector, keeping its handle.
    ///
    /// # Errors
    ///
    /// See [`route`](Self::route).
    pub async fn update(
        &self,
        collection: CollectionId,
        external_id: &str,
        vector: Vec<f32>,
        metadata: Option<Metadata>,
    ) -> Result<VectorHandle> {
        let op = Operation::Update {
            external_id: external_id.to_owned(),
            vector,
            metadata: metadata.map(Metadata::into_bytes),
        };
        match self.route(collection, op, Vec::new()).await? {
            Reply::Handle(handle) => Ok(handle),
            other => Err(unexpected(&other)),
        }
    }

    /// Delete a stored vector.
    ///
    /// # Errors
    ///
    /// See [`route`](Self::route).
    pub async fn delete(&self, collection: CollectionId, external_id: &str) -> Result<VectorHandle> {
        let op = Operation::Delete { external_id: external_id.to_owned() };
        match self.route(collection, op, Vec::new()).await? {
            Reply::Handle(handle) => Ok(handle),
            other => Err(unexpected(&other)),
        }
    }

    /// Set the search-quality parameter of a collection.
    ///
    /// # Errors
    ///
    /// See [`route`](Self::route).
    pub async fn set_quality(&self, collection: CollectionId, ef: usize) -> Result<()> {
        match self.route(collection, Operation::SetQuality { ef }, Vec::new()).await? {
            Reply::Ack => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// The `k` nearest live vectors, optionally post-filtered.
    ///
    /// # Errors
    ///
    /// See [`route`](Self::route).
    pub async fn query(
        &self,
        collection: CollectionId,
        vector: Vec<f32>,
        k: usize,
        filters: Vec<Filter>,
    ) -> Result<Vec<Neighbor>> {
        match self.route(collection, Operation::Query { vector, k, filters }, Vec::new()).await? {
            Reply::Neighbors(neighbors) => Ok(neighbors),
            other => Err(unexpected(&other)),
        }
    }

    /// Fetch the metadata of an external id.
    ///
    /// # Errors
    ///
    /// See [`route`](Self::route).
    pub async fn get_metadata(&self, collection: CollectionId, external_id: &str) -> Result<Metadata> {
        let op = Operation::GetMetadata { external_id: external_id.to_owned() };
        match self.route(collection, op, Vec::new()).await? {
            Reply::Metadata(bytes) => Ok(Metadata::from_stored(bytes)),
            other => Err(unexpected(&other)),
        }
    }

    /// Overwrite or insert the metadata of an external id.
    ///
    /// # Errors
    ///
    /// See [`route`](Self::route).
    pub async fn put_metadata(
        &self,
        collection: CollectionId,
        external_id: &str,
        metadata: Metadata,
    ) -> Result<()> {
        let op = Operation::PutMetadata { external_id: external_id.to_owned(), metadata: metadata.into_bytes() };
        match self.route(collection, op, Vec::new()).await? {
            Reply::Ack => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Remove the metadata of an external id.
    ///
    /// # Errors
    ///
    /// See [`route`](Self::route).
    pub async fn delete_metadata(&self, collection: CollectionId, external_id: &str) -> Result<()> {
        let op = Operation::DeleteMetadata { external_id: external_id.to_owned() };
        match self.route(collection, op, Vec::new()).await? {
            Reply::Ack => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// History of a collection, or of one external id in it.
    ///
    /// # Errors
    ///
    /// See [`route`](Self::route).
    pub async fn history(
        &self,
        collection: CollectionId,
        external_id: Option<&str>,
    ) -> Result<Vec<HistoryEntry>> {
        let op = Operation::History { external_id: external_id.map(str::to_owned) };
        match self.route(collection, op, Vec::new()).await? {
            Reply::History(entries) => Ok(entries),
            other => Err(unexpected(&other)),
        }
    }
}

/// Run `operation` against a local store under its lock.
///
/// # Errors
///
/// Returns whatever the store reports.
pub fn execute(store: &SharedStore, operation: Operation) -> Result<Reply> {
    let mut store = lock(store)?;
    let reply = match operation {
        Operation::Add { external_id, vector, metadata } => {
            Reply::Handle(store.add(&external_id, &vector, metadata.map(Metadata::from_stored))?)
        }
        Operation::Get { external_id } => Reply::Vector(store.get(&external_id)?),
        Operation::Update { external_id, vector, metadata } => {
            Reply::Handle(store.update(&external_id, &vector, metadata.map(Metadata::from_stored))?)
        }
        Operation::Delete { external_id } => Reply::Handle(store.delete(&external_id)?),
        Operation::Query { vector, k, filters } => {
            if filters.is_empty() {
                Reply::Neighbors(store.query(&vector, k)?)
            } else {
                Reply::Neighbors(store.query_filtered(&vector, k, &filters)?)
            }
        }
        Operation::SetQuality { ef } => {
            store.set_quality(ef)?;
            Reply::Ack
        }
        Operation::GetMetadata { external_id } => {
            Reply::Metadata(store.get_metadata(&external_id)?.into_bytes())
        }
        Operation::PutMetadata { external_id, metadata } => {
            store.update_metadata(&external_id, Metadata::from_stored(metadata))?;
            Reply::Ack
        }
        Operation::DeleteMetadata { external_id } => {
            store.delete_metadata(&external_id)?;
            Reply::Ack
        }
        Operation::History { external_id: Some(external_id) } => {
            Reply::History(store.history_for(&external_id)?)
        }
        Operation::History { external_id: None } => Reply::History(store.history()?),
    };
    Ok(reply)
}

fn unexpected(reply: &Reply) -> Error {
    Error::Remote(format!("unexpected reply: {reply:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::{Dht, MemoryDht};
    use crate::registry::StoreSettings;
    use meshvec_storage::RedbEngine;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Setup {
        _dir: TempDir,
        dht: MemoryDht,
        node: PeerNode,
    }

    fn setup(address: &str, max_hops: usize) -> Setup {
        let dir = TempDir::new().expect("tempdir");
        let catalog = Arc::new(RedbEngine::open(dir.path().join("catalog.redb")).expect("catalog"));
        let registry = Arc::new(StoreRegistry::new(dir.path(), catalog, StoreSettings::default()));
        let dht = MemoryDht::new();
        let directory = LocationDirectory::new(Arc::new(dht.clone()));
        let client = RpcClient::new(Duration::from_millis(300)).expect("client");
        let node = PeerNode::new(address, registry, directory, client, max_hops);
        Setup { _dir: dir, dht, node }
    }

    #[tokio::test]
    async fn test_local_hit_and_claim() {
        let s = setup("127.0.0.1:7001", 8);
        let id = s.node.create(3, Metric::SquaredEuclidean, 100, BuildParams::default()).await.expect("create");
        let record = s.node.directory().resolve(id).await.expect("resolve").expect("claimed on create");
        assert_eq!(record.address, "127.0.0.1:7001");

        s.node.add(id, "a", vec![1.0, 0.0, 0.0], None).await.expect("add");
        s.node.add(id, "b", vec![0.0, 1.0, 0.0], None).await.expect("add");
        s.node.add(id, "c", vec![0.0, 0.0, 1.0], None).await.expect("add");
        assert_eq!(s.node.get(id, "a").await.expect("get"), vec![1.0, 0.0, 0.0]);

        s.node.set_quality(id, 50).await.expect("quality");
        let results = s.node.query(id, vec![1.0, 0.0, 0.0], 2, Vec::new()).await.expect("query");
        assert_eq!(results[0].external_id.as_deref(), Some("a"));
        assert!((results[1].distance - 2.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_unknown_collection_is_location_unknown() {
        let s = setup("127.0.0.1:7002", 8);
        let id = CollectionId::generate();
        assert!(matches!(s.node.get(id, "a").await, Err(Error::LocationUnknown(c)) if c == id));
    }

    #[tokio::test]
    async fn test_self_owned_but_missing_is_local_not_found() {
        let s = setup("127.0.0.1:7003", 8);
        let id = CollectionId::generate();
        s.node.directory().claim(id, "127.0.0.1:7003").await.expect("claim");
        assert!(matches!(s.node.get(id, "a").await, Err(Error::LocalNotFound(c)) if c == id));
    }

    #[tokio::test]
    async fn test_unreachable_owner() {
        let s = setup("127.0.0.1:7004", 8);
        let id = CollectionId::generate();
        s.node.directory().claim(id, "127.0.0.1:9").await.expect("claim");
        let err = s.node.get(id, "a").await.expect_err("owner is down");
        assert!(matches!(err, Error::RemoteUnreachable { ref address, .. } if address == "127.0.0.1:9"));
    }

    #[tokio::test]
    async fn test_hop_limit() {
        let s = setup("127.0.0.1:7005", 0);
        let id = CollectionId::generate();
        s.node.directory().claim(id, "127.0.0.1:7999").await.expect("claim");
        let err = s.node.get(id, "a").await.expect_err("no hops allowed");
        assert!(matches!(err, Error::RemoteUnreachable { ref reason, .. } if reason.contains("hop limit")));
    }

    #[tokio::test]
    async fn test_revisit_is_refused() {
        let s = setup("127.0.0.1:7006", 8);
        let id = CollectionId::generate();
        let visited = vec!["127.0.0.1:7100".to_owned(), "127.0.0.1:7006".to_owned()];
        let err = s
            .node
            .route(id, Operation::Get { external_id: "a".into() }, visited)
            .await
            .expect_err("looped");
        assert!(matches!(err, Error::RemoteUnreachable { .. }));
    }

    #[tokio::test]
    async fn test_store_errors_surface_unchanged() {
        let s = setup("127.0.0.1:7007", 8);
        let id = s.node.create(2, Metric::Cosine, 10, BuildParams::default()).await.expect("create");
        assert!(matches!(
            s.node.add(id, "a", vec![1.0], None).await,
            Err(Error::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(s.node.get(id, "zzz").await, Err(Error::NotFound(_))));
        assert!(matches!(
            s.node.query(id, vec![1.0, 0.0], 1, Vec::new()).await,
            Err(Error::Configuration(_))
        ));
        assert_eq!(s.dht.len().expect("len"), 1);
    }

    #[tokio::test]
    async fn test_reads_do_not_reclaim() {
        let s = setup("127.0.0.1:7008", 8);
        let id = s.node.create(1, Metric::SquaredEuclidean, 10, BuildParams::default()).await.expect("create");
        // Someone else claims it; a local read must not take it back.
        s.dht.put(&id.to_string(), r#"{"address":"10.9.9.9:1","claimed_at":"2026-01-01T00:00:00Z"}"#)
            .await
            .expect("put");
        s.node.history(id, None).await.expect("history");
        let record = s.node.directory().resolve(id).await.expect("resolve").expect("record");
        assert_eq!(record.address, "10.9.9.9:1");

        s.node.add(id, "x", vec![1.0], None).await.expect("add");
        let record = s.node.directory().resolve(id).await.expect("resolve").expect("record");
        assert_eq!(record.address, "127.0.0.1:7008");
    }
}
