//! Node configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for a meshvec node.
///
/// Every field has a default, so a TOML file only needs the values it
/// changes:
///
/// ```toml
/// port = 9000
/// bootstrap = "10.0.0.5:8468"
/// backup_interval = 60
/// ```
///
/// Durations are written in whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Interface the RPC server binds to.
    /// Default: `0.0.0.0`.
    pub host: String,

    /// Port the RPC server binds to. `0` picks a free port.
    /// Default: 8468.
    pub port: u16,

    /// Address published in the location directory.
    /// Default: `host:port`, with `0.0.0.0` replaced by `127.0.0.1`.
    pub advertise_address: Option<String>,

    /// Seed node (`host:port`) joined on start.
    pub bootstrap: Option<String>,

    /// Directory holding the catalog and collection files.
    /// Default: `$XDG_DATA_HOME/meshvec`, or `./meshvec-data` without a home.
    pub data_dir: PathBuf,

    /// Minimum time between two snapshots of the same collection.
    /// Default: 300 seconds.
    #[serde(with = "secs")]
    pub backup_interval: Duration,

    /// How often the backup scheduler checks collections.
    /// Default: 5 seconds.
    #[serde(with = "secs")]
    pub backup_tick: Duration,

    /// Timeout for one forwarded call.
    /// Default: 10 seconds.
    #[serde(with = "secs")]
    pub forward_timeout: Duration,

    /// Longest chain of nodes a request may be forwarded through.
    /// Default: 8.
    pub max_hops: usize,

    /// How often ownership claims are republished.
    /// Default: 60 seconds.
    #[serde(with = "secs")]
    pub claim_refresh_interval: Duration,

    /// Largest metadata payload accepted.
    /// Default: 64 KiB.
    pub max_metadata_bytes: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8468,
            advertise_address: None,
            bootstrap: None,
            data_dir: default_data_dir(),
            backup_interval: Duration::from_secs(300),
            backup_tick: Duration::from_secs(5),
            forward_timeout: Duration::from_secs(10),
            max_hops: 8,
            claim_refresh_interval: Duration::from_secs(60),
            max_metadata_bytes: meshvec_core::DEFAULT_MAX_METADATA_BYTES,
        }
    }
}

impl NodeConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the text is not a valid configuration.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Configuration(format!("invalid node config: {e}")))
    }

    /// Set the bind host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the bind port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the seed node.
    #[must_use]
    pub fn bootstrap(mut self, address: impl Into<String>) -> Self {
        self.bootstrap = Some(address.into());
        self
    }

    /// Set the published address.
    #[must_use]
    pub fn advertise_address(mut self, address: impl Into<String>) -> Self {
        self.advertise_address = Some(address.into());
        self
    }

    /// Set the data directory.
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the backup interval.
    #[must_use]
    pub const fn backup_interval(mut self, interval: Duration) -> Self {
        self.backup_interval = interval;
        self
    }

    /// Set the backup scheduler tick.
    #[must_use]
    pub const fn backup_tick(mut self, tick: Duration) -> Self {
        self.backup_tick = tick;
        self
    }

    /// Set the forward timeout.
    #[must_use]
    pub const fn forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = timeout;
        self
    }

    /// Set the hop limit.
    #[must_use]
    pub const fn max_hops(mut self, hops: usize) -> Self {
        self.max_hops = hops;
        self
    }

    /// Set the claim refresh interval.
    #[must_use]
    pub const fn claim_refresh_interval(mut self, interval: Duration) -> Self {
        self.claim_refresh_interval = interval;
        self
    }

    /// Set the metadata size limit.
    #[must_use]
    pub const fn max_metadata_bytes(mut self, max: usize) -> Self {
        self.max_metadata_bytes = max;
        self
    }

    /// The `host:port` the server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The address this node publishes for a server bound to `port`.
    #[must_use]
    pub fn published_address(&self, port: u16) -> String {
        if let Some(address) = &self.advertise_address {
            return address.clone();
        }
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" | "" => "127.0.0.1",
            other => other,
        };
        format!("{host}:{port}")
    }

    /// Path of the node catalog.
    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("catalog.redb")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| PathBuf::from("meshvec-data"), |dir| dir.join("meshvec"))
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.port, 8468);
        assert_eq!(config.backup_interval, Duration::from_secs(300));
        assert_eq!(config.max_hops, 8);
        assert_eq!(config.bind_address(), "0.0.0.0:8468");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = NodeConfig::from_toml("port = 9000\nbackup_interval = 60\nbootstrap = \"10.0.0.5:8468\"")
            .expect("parse");
        assert_eq!(config.port, 9000);
        assert_eq!(config.backup_interval, Duration::from_secs(60));
        assert_eq!(config.bootstrap.as_deref(), Some("10.0.0.5:8468"));
        assert_eq!(config.forward_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(NodeConfig::from_toml("port = \"x\""), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_published_address() {
        let config = NodeConfig::new().port(0);
        assert_eq!(config.published_address(4100), "127.0.0.1:4100");

        let config = config.host("10.1.2.3");
        assert_eq!(config.published_address(4100), "10.1.2.3:4100");

        let config = config.advertise_address("node-a:8468");
        assert_eq!(config.published_address(4100), "node-a:8468");
    }
}
