//! HTTP client for the node RPC surface.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Reply, Request, Response};
use crate::error::{Error, Result};

/// What `GET /health` answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Always `"ok"` for a serving node.
    pub status: String,
    /// The node's published address.
    pub address: String,
    /// Number of collections in the node's catalog.
    pub collections: usize,
}

/// Calls other nodes.
///
/// Every call is bounded by the configured timeout; connection failures,
/// timeouts and undecodable answers all surface as
/// [`Error::RemoteUnreachable`]. Errors the remote node reports are rebuilt
/// as the same [`enum@Error`] variant.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl RpcClient {
    /// A client whose calls give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build http client: {e}")))?;
        Ok(Self { http, timeout })
    }

    /// The per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request` to the node at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteUnreachable`] if the node cannot be reached, or
    /// the error the node reported.
    pub async fn call(&self, address: &str, request: &Request) -> Result<Reply> {
        debug!(address, "rpc call");
        let response = self
            .http
            .post(format!("http://{address}/rpc"))
            .json(request)
            .send()
            .await
            .map_err(|e| Error::unreachable(address, describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::unreachable(address, format!("HTTP {status}")));
        }

        let body: Response = response
            .json()
            .await
            .map_err(|e| Error::unreachable(address, format!("invalid response: {e}")))?;
        body.map_err(Error::from)
    }

    /// Ask the node at `address` whether it is serving.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteUnreachable`] if the node cannot be reached.
    pub async fn health(&self, address: &str) -> Result<Health> {
        let response = self
            .http
            .get(format!("http://{address}/health"))
            .send()
            .await
            .map_err(|e| Error::unreachable(address, describe(&e)))?;
        response.json().await.map_err(|e| Error::unreachable(address, format!("invalid response: {e}")))
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "timed out".to_owned()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
