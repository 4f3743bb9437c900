//! Command implementations.

pub mod collections;
pub mod logs;
pub mod node;
pub mod vectors;

use std::time::Duration;

use meshvec::{Operation, Reply, Request, Routed, RpcClient};
use meshvec_core::CollectionId;

use crate::error::{CliError, Result};

/// Host a client command talks to when none is given.
const DEFAULT_HOST: &str = "127.0.0.1";

/// Port a client command talks to when none is given.
const DEFAULT_PORT: u16 = 8468;

/// Client calls give up after this long.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// The node a client command talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    address: String,
}

impl Target {
    /// Target `host:port`, defaulting to the local node.
    pub fn new(host: Option<&str>, port: Option<u16>) -> Self {
        let host = host.unwrap_or(DEFAULT_HOST);
        let port = port.unwrap_or(DEFAULT_PORT);
        Self { address: format!("{host}:{port}") }
    }

    /// The node address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send one request and wait for the reply.
    pub fn call(&self, request: Request) -> Result<Reply> {
        let rt = tokio::runtime::Runtime::new()?;
        let client = RpcClient::new(CALL_TIMEOUT)?;
        Ok(rt.block_on(client.call(&self.address, &request))?)
    }

    /// Route a collection operation through the target node.
    pub fn route(&self, collection: CollectionId, operation: Operation) -> Result<Reply> {
        self.call(Request::Route(Routed { collection, operation, visited: Vec::new() }))
    }
}

/// Error for a reply of the wrong shape.
pub fn unexpected(reply: &Reply) -> CliError {
    CliError::UnexpectedReply(format!("{reply:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_defaults_to_local_node() {
        assert_eq!(Target::new(None, None).address(), "127.0.0.1:8468");
        assert_eq!(Target::new(Some("10.1.2.3"), Some(9000)).address(), "10.1.2.3:9000");
    }

    #[test]
    fn test_unreachable_node_is_reported() {
        let err = Target::new(Some("127.0.0.1"), Some(9)).call(Request::List).expect_err("nothing listens");
        assert!(matches!(err, CliError::Node(meshvec::Error::RemoteUnreachable { .. })));
    }
}
