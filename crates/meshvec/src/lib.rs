//! # meshvec
//!
//! A peer-to-peer vector store node.
//!
//! Each node owns a set of collections (HNSW-indexed vector stores) and
//! publishes their ownership in a DHT. A request for a collection can be
//! sent to any node; it is executed locally when the node owns the
//! collection and forwarded to the owner otherwise.
//!
//! ## Quick Start
//!
//! ```ignore
//! use meshvec::{Node, NodeConfig};
//! use meshvec_core::{BuildParams, Metric};
//!
//! let node = Node::start(NodeConfig::default().port(8468)).await?;
//! let id = node.peer().create(3, Metric::SquaredEuclidean, 1000, BuildParams::default()).await?;
//! node.peer().add(id, "a", vec![1.0, 0.0, 0.0], None).await?;
//! node.peer().set_quality(id, 50).await?;
//! let hits = node.peer().query(id, vec![1.0, 0.0, 0.0], 1, Vec::new()).await?;
//! ```
//!
//! ## Modules
//!
//! - [`registry`]: collections owned by this node
//! - [`directory`]: collection ownership records in the DHT
//! - [`peer`]: local execution or forwarding
//! - [`rpc`]: wire types, client and HTTP server
//! - [`node`]: process lifecycle and background tasks

#![deny(clippy::unwrap_used)]

pub mod config;
pub mod dht;
pub mod directory;
pub mod error;
pub mod node;
pub mod peer;
pub mod registry;
pub mod rpc;
pub mod tasks;

pub use config::NodeConfig;
pub use dht::{Dht, DhtSnapshot, MemoryDht, PeerDht, Precedence};
pub use directory::{newer_claim, LocationDirectory, LocationRecord};
pub use error::{Error, Result, WireError};
pub use node::Node;
pub use peer::PeerNode;
pub use registry::{lock, Engine, SharedStore, StoreRegistry, StoreSettings};
pub use rpc::{Health, Operation, Reply, Request, Routed, RpcClient};
