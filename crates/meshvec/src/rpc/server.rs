//! HTTP server setup and routing.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Health, Reply, Request, Response};
use crate::dht::Dht;
use crate::error::{Result, WireError};
use crate::peer::PeerNode;

/// Everything a request handler can reach.
pub struct ServerState {
    /// Routing façade.
    pub peer: Arc<PeerNode>,
    /// The DHT this node serves.
    pub dht: Arc<dyn Dht>,
    /// Cancelled to stop the node.
    pub shutdown: CancellationToken,
}

/// Build the node router.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn rpc_handler(State(state): State<Arc<ServerState>>, Json(request): Json<Request>) -> Json<Response> {
    let result = dispatch(&state, request).await;
    if let Err(e) = &result {
        debug!(error = %e, "rpc failed");
    }
    Json(result.map_err(|e| WireError::from(&e)))
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> Json<Health> {
    let collections = state.peer.registry().ids().map_or(0, |ids| ids.len());
    Json(Health { status: "ok".to_owned(), address: state.peer.address().to_owned(), collections })
}

/// Execute one request against this node.
///
/// # Errors
///
/// Returns whatever the underlying operation reports.
pub async fn dispatch(state: &ServerState, request: Request) -> Result<Reply> {
    match request {
        Request::Route(routed) => state.peer.route(routed.collection, routed.operation, routed.visited).await,
        Request::Create { dimension, metric, capacity, build } => {
            Ok(Reply::Created(state.peer.create(dimension, metric, capacity, build).await?))
        }
        Request::List => Ok(Reply::Collections(state.peer.registry().list()?)),
        Request::Resize { collection, capacity } => {
            state.peer.registry().resize(collection, capacity)?;
            Ok(Reply::Ack)
        }
        Request::Shutdown => {
            info!("shutdown requested");
            state.shutdown.cancel();
            Ok(Reply::Ack)
        }
        Request::DhtPut { key, value } => {
            state.dht.put(&key, &value).await?;
            Ok(Reply::Ack)
        }
        Request::DhtGet { key } => Ok(Reply::Value(state.dht.get(&key).await?)),
        Request::DhtStore { key, value } => {
            state.dht.store_local(&key, &value).await?;
            Ok(Reply::Ack)
        }
        Request::DhtFetch { key } => Ok(Reply::Value(state.dht.fetch_local(&key).await?)),
        Request::DhtJoin { address } => Ok(Reply::Snapshot(state.dht.accept_peer(&address).await?)),
        Request::DhtPeers => Ok(Reply::Peers(state.dht.peers().await?)),
    }
}
