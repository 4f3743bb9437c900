//! Multi-node tests over real sockets.

use std::sync::Arc;
use std::time::Duration;

use meshvec::{Error, LocationDirectory, LocationRecord, MemoryDht, Node, NodeConfig, Request, RpcClient};
use meshvec_core::{BuildParams, Metadata, Metric};
use tempfile::TempDir;

fn config(dir: &TempDir) -> NodeConfig {
    NodeConfig::default()
        .host("127.0.0.1")
        .port(0)
        .data_dir(dir.path())
        .backup_interval(Duration::from_secs(3600))
        .backup_tick(Duration::from_secs(3600))
        .forward_timeout(Duration::from_secs(5))
}

fn client() -> RpcClient {
    RpcClient::new(Duration::from_secs(5)).expect("client")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forwarding_through_peer_dht() {
    let dir_a = TempDir::new().expect("tempdir");
    let dir_b = TempDir::new().expect("tempdir");

    let a = Node::start(config(&dir_a)).await.expect("start a");
    let b = Node::start(config(&dir_b).bootstrap(a.address())).await.expect("start b");

    let id = a.peer().create(3, Metric::SquaredEuclidean, 100, BuildParams::default()).await.expect("create");
    assert!(!b.registry().contains(id).expect("contains"));

    b.peer().add(id, "x", vec![1.0, 0.0, 0.0], None).await.expect("add through b");
    b.peer().add(id, "y", vec![0.0, 1.0, 0.0], None).await.expect("add through b");
    a.peer().add(id, "z", vec![0.0, 0.0, 1.0], None).await.expect("add on a");

    let from_a = a.peer().get(id, "x").await.expect("get on a");
    let from_b = b.peer().get(id, "x").await.expect("get through b");
    assert_eq!(from_a, vec![1.0, 0.0, 0.0]);
    assert_eq!(from_a, from_b);

    b.peer().set_quality(id, 32).await.expect("set quality");
    let hits = b.peer().query(id, vec![0.0, 0.9, 0.1], 1, Vec::new()).await.expect("query");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].external_id.as_deref(), Some("y"));

    b.stop().await.expect("stop b");
    a.stop().await.expect("stop a");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rejoining_node_adopts_newer_claims() {
    let dir_a = TempDir::new().expect("tempdir");
    let dir_b = TempDir::new().expect("tempdir");

    let a = Node::start(config(&dir_a)).await.expect("start a");
    let id = a.peer().create(2, Metric::SquaredEuclidean, 10, BuildParams::default()).await.expect("create");
    a.peer().add(id, "p", vec![1.0, 2.0], None).await.expect("add");

    // B remembers an old owner for the collection from an earlier run.
    let b = Node::start(config(&dir_b)).await.expect("start b alone");
    let stale = r#"{"address":"127.0.0.1:9","claimed_at":"2020-01-01T00:00:00Z"}"#;
    b.dht().store_local(&id.to_string(), stale).await.expect("store stale");
    b.stop().await.expect("stop b");

    let b = Node::start(config(&dir_b).bootstrap(a.address())).await.expect("restart b");
    let directory = LocationDirectory::new(Arc::clone(b.dht()));
    let record = directory.resolve(id).await.expect("resolve").expect("record");
    assert_eq!(record.address, a.address());
    assert_eq!(b.peer().get(id, "p").await.expect("get through b"), vec![1.0, 2.0]);

    // A newer copy held only by A is picked up by B's next lookup.
    let later = LocationRecord {
        address: a.address().to_owned(),
        claimed_at: record.claimed_at + chrono::Duration::hours(1),
    };
    let encoded = serde_json::to_string(&later).expect("encode");
    let request = Request::DhtStore { key: id.to_string(), value: encoded.clone() };
    client().call(a.address(), &request).await.expect("store on a");
    let refreshed = directory.resolve(id).await.expect("resolve").expect("record");
    assert_eq!(refreshed, later);
    assert_eq!(b.dht().fetch_local(&id.to_string()).await.expect("fetch"), Some(encoded));

    b.stop().await.expect("stop b");
    a.stop().await.expect("stop a");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_errors_keep_their_kind() {
    let dir_a = TempDir::new().expect("tempdir");
    let dir_b = TempDir::new().expect("tempdir");
    let dht = MemoryDht::new();

    let a = Node::start_with_dht(config(&dir_a), Arc::new(dht.clone())).await.expect("start a");
    let b = Node::start_with_dht(config(&dir_b), Arc::new(dht)).await.expect("start b");

    let id = a.peer().create(2, Metric::Cosine, 10, BuildParams::default()).await.expect("create");

    let err = b.peer().get(id, "missing").await.expect_err("no such id");
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");

    let err = b.peer().add(id, "v", vec![1.0, 2.0, 3.0], None).await.expect_err("wrong dimension");
    assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }), "got {err:?}");

    let err = b.peer().query(id, vec![1.0, 0.0], 1, Vec::new()).await.expect_err("no quality yet");
    assert!(matches!(err, Error::Configuration(_)), "got {err:?}");

    b.stop().await.expect("stop b");
    a.stop().await.expect("stop a");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_metadata_and_history_through_peer() {
    let dir_a = TempDir::new().expect("tempdir");
    let dir_b = TempDir::new().expect("tempdir");
    let dht = MemoryDht::new();

    let a = Node::start_with_dht(config(&dir_a), Arc::new(dht.clone())).await.expect("start a");
    let b = Node::start_with_dht(config(&dir_b), Arc::new(dht)).await.expect("start b");

    let id = a.peer().create(2, Metric::SquaredEuclidean, 10, BuildParams::default()).await.expect("create");
    let meta = Metadata::from_stored(b"tag=red".to_vec());
    b.peer().add(id, "p", vec![0.5, 0.5], Some(meta)).await.expect("add");

    let fetched = b.peer().get_metadata(id, "p").await.expect("metadata");
    assert_eq!(fetched.as_bytes(), b"tag=red");

    b.peer().delete_metadata(id, "p").await.expect("delete metadata");
    let err = b.peer().get_metadata(id, "p").await.expect_err("metadata gone");
    assert!(matches!(err, Error::NotFound(_)));

    let history = b.peer().history(id, Some("p")).await.expect("history");
    assert!(history.len() >= 2, "add and metadata changes are recorded");

    b.stop().await.expect("stop b");
    a.stop().await.expect("stop a");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cyclic_directory_is_refused() {
    let dir_a = TempDir::new().expect("tempdir");
    let dir_b = TempDir::new().expect("tempdir");
    let dht_a = MemoryDht::new();
    let dht_b = MemoryDht::new();

    let a = Node::start_with_dht(config(&dir_a), Arc::new(dht_a.clone())).await.expect("start a");
    let b = Node::start_with_dht(config(&dir_b), Arc::new(dht_b.clone())).await.expect("start b");

    // Each node believes the other owns a collection neither has.
    let orphan = meshvec_core::CollectionId::generate();
    LocationDirectory::new(Arc::new(dht_a)).claim(orphan, b.address()).await.expect("claim");
    LocationDirectory::new(Arc::new(dht_b)).claim(orphan, a.address()).await.expect("claim");

    let err = a.peer().get(orphan, "x").await.expect_err("loop");
    assert!(matches!(err, Error::RemoteUnreachable { .. }), "got {err:?}");

    b.stop().await.expect("stop b");
    a.stop().await.expect("stop a");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_collection_on_fresh_network() {
    let dir = TempDir::new().expect("tempdir");
    let node = Node::start_with_dht(config(&dir), Arc::new(MemoryDht::new())).await.expect("start");

    let err = node.peer().get(meshvec_core::CollectionId::generate(), "x").await.expect_err("unknown");
    assert!(matches!(err, Error::LocationUnknown(_)));

    node.stop().await.expect("stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_health_reports_collections() {
    let dir = TempDir::new().expect("tempdir");
    let node = Node::start_with_dht(config(&dir), Arc::new(MemoryDht::new())).await.expect("start");
    node.peer().create(4, Metric::Cosine, 10, BuildParams::default()).await.expect("create");

    let health = client().health(node.address()).await.expect("health");
    assert_eq!(health.status, "ok");
    assert_eq!(health.address, node.address());
    assert_eq!(health.collections, 1);

    node.stop().await.expect("stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_request_writes_final_backup() {
    let dir = TempDir::new().expect("tempdir");
    let node = Node::start_with_dht(config(&dir), Arc::new(MemoryDht::new())).await.expect("start");
    let id = node.peer().create(2, Metric::SquaredEuclidean, 10, BuildParams::default()).await.expect("create");
    node.peer().add(id, "a", vec![1.0, 1.0], None).await.expect("add");

    client().call(node.address(), &Request::Shutdown).await.expect("shutdown");
    tokio::time::timeout(Duration::from_secs(10), node.wait())
        .await
        .expect("node stops after a shutdown request")
        .expect("clean stop");

    let snapshot = dir.path().join("collections").join(id.to_string()).join("index.snapshot");
    assert!(snapshot.exists());
}
