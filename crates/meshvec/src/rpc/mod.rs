//! Node-to-node and client-to-node RPC.
//!
//! Every call is a JSON [`Request`] posted to `/rpc`; the answer is a JSON
//! `Result<Reply, WireError>`.

mod client;
pub mod server;

pub use client::{Health, RpcClient};

use meshvec_core::{BuildParams, CollectionConfig, CollectionId, HistoryEntry, Metric, VectorHandle};
use meshvec_vector::{Filter, Neighbor};
use serde::{Deserialize, Serialize};

use crate::dht::DhtSnapshot;
use crate::error::WireError;

/// A vector-level operation on one collection.
///
/// These are the operations routed to a collection's owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Add a vector, with optional metadata.
    Add {
        /// External id.
        external_id: String,
        /// Components.
        vector: Vec<f32>,
        /// Optional metadata payload.
        #[serde(default)]
        metadata: Option<Vec<u8>>,
    },
    /// Fetch a vector.
    Get {
        /// External id.
        external_id: String,
    },
    /// Replace a vector, keeping its handle.
    Update {
        /// External id.
        external_id: String,
        /// New components.
        vector: Vec<f32>,
        /// Optional metadata payload.
        #[serde(default)]
        metadata: Option<Vec<u8>>,
    },
    /// Delete a vector.
    Delete {
        /// External id.
        external_id: String,
    },
    /// Nearest-neighbour query.
    Query {
        /// Query vector.
        vector: Vec<f32>,
        /// Number of results.
        k: usize,
        /// Post-filters.
        #[serde(default)]
        filters: Vec<Filter>,
    },
    /// Set the search-quality parameter.
    SetQuality {
        /// Candidate-list size.
        ef: usize,
    },
    /// Fetch metadata.
    GetMetadata {
        /// External id.
        external_id: String,
    },
    /// Overwrite or insert metadata.
    PutMetadata {
        /// External id.
        external_id: String,
        /// Payload.
        metadata: Vec<u8>,
    },
    /// Remove metadata.
    DeleteMetadata {
        /// External id.
        external_id: String,
    },
    /// Read the collection history, optionally for one external id.
    History {
        /// Restrict to this external id.
        #[serde(default)]
        external_id: Option<String>,
    },
}

impl Operation {
    /// Whether the operation changes the collection.
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Add { .. }
                | Self::Update { .. }
                | Self::Delete { .. }
                | Self::SetQuality { .. }
                | Self::PutMetadata { .. }
                | Self::DeleteMetadata { .. }
        )
    }

    /// Short name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Get { .. } => "get",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Query { .. } => "query",
            Self::SetQuality { .. } => "set_quality",
            Self::GetMetadata { .. } => "get_metadata",
            Self::PutMetadata { .. } => "put_metadata",
            Self::DeleteMetadata { .. } => "delete_metadata",
            Self::History { .. } => "history",
        }
    }
}

/// An operation on its way to the owner of `collection`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routed {
    /// Target collection.
    pub collection: CollectionId,
    /// The operation.
    pub operation: Operation,
    /// Addresses of the nodes that already forwarded this request, in order.
    #[serde(default)]
    pub visited: Vec<String>,
}

/// A request to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    /// A collection operation, executed locally or forwarded to the owner.
    Route(Routed),
    /// Create a collection on the receiving node.
    Create {
        /// Vector dimension.
        dimension: usize,
        /// Distance metric.
        metric: Metric,
        /// Capacity bound.
        capacity: usize,
        /// Index build parameters.
        build: BuildParams,
    },
    /// List collections stored on the receiving node.
    List,
    /// Raise the capacity of a local collection.
    Resize {
        /// Target collection.
        collection: CollectionId,
        /// New capacity.
        capacity: usize,
    },
    /// Stop the receiving node after a final backup.
    Shutdown,
    /// Publish a DHT pair through the receiving node.
    DhtPut {
        /// Key.
        key: String,
        /// Value.
        value: String,
    },
    /// Look a DHT key up through the receiving node.
    DhtGet {
        /// Key.
        key: String,
    },
    /// Store a pushed DHT pair without propagating it.
    DhtStore {
        /// Key.
        key: String,
        /// Value.
        value: String,
    },
    /// Look a key up in the receiving node's DHT table only.
    DhtFetch {
        /// Key.
        key: String,
    },
    /// Register the sender as a DHT peer.
    DhtJoin {
        /// Sender's address.
        address: String,
    },
    /// List the receiving node's DHT peers.
    DhtPeers,
}

/// A successful answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    /// The operation completed with nothing to return.
    Ack,
    /// The handle of an added, updated or deleted vector.
    Handle(VectorHandle),
    /// A stored vector.
    Vector(Vec<f32>),
    /// Query results, nearest first.
    Neighbors(Vec<Neighbor>),
    /// A metadata payload.
    Metadata(Vec<u8>),
    /// History entries, oldest first.
    History(Vec<HistoryEntry>),
    /// Identifier of a created collection.
    Created(CollectionId),
    /// Collection configurations.
    Collections(Vec<CollectionConfig>),
    /// A DHT value.
    Value(Option<String>),
    /// DHT peer addresses.
    Peers(Vec<String>),
    /// A joining peer's view of the network.
    Snapshot(DhtSnapshot),
}

/// What `/rpc` answers.
pub type Response = std::result::Result<Reply, WireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_wire_format() {
        let op = Operation::Query { vector: vec![1.0, 0.0], k: 3, filters: Vec::new() };
        let json = serde_json::to_value(&op).expect("serialize");
        assert_eq!(json["op"], "query");
        assert_eq!(json["k"], 3);

        let parsed: Operation =
            serde_json::from_str(r#"{"op":"get","external_id":"a"}"#).expect("deserialize");
        assert_eq!(parsed, Operation::Get { external_id: "a".into() });
    }

    #[test]
    fn test_visited_defaults_to_empty() {
        let id = CollectionId::generate();
        let json = format!(r#"{{"route":{{"collection":"{id}","operation":{{"op":"delete","external_id":"x"}}}}}}"#);
        let request: Request = serde_json::from_str(&json).expect("deserialize");
        let Request::Route(routed) = request else { panic!("expected a routed request") };
        assert!(routed.visited.is_empty());
        assert!(routed.operation.is_mutating());
    }

    #[test]
    fn test_error_response_roundtrip() {
        let response: Response = Err(WireError::NotFound { message: "vector 'a'".into() });
        let json = serde_json::to_string(&response).expect("serialize");
        let back: Response = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, response);
    }
}
