//! Node lifecycle commands.
//!
//! `start-node` runs a node in the foreground until Ctrl+C or a `stop-node`
//! request, and keeps a state file in the data directory while it runs.

use std::fs;
use std::path::{Path, PathBuf};

use meshvec::{Node, NodeConfig, Reply, Request};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{unexpected, Target};
use crate::error::{CliError, Result};

/// Node state persisted to disk while a node runs.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    /// Process ID of the running node.
    pub pid: u32,
    /// Address the node publishes.
    pub address: String,
    /// Timestamp when the node was started.
    pub started_at: String,
}

/// State file path for a node listening on `port`.
pub fn state_file(data_dir: &Path, port: u16) -> PathBuf {
    data_dir.join(format!("node-{port}.json"))
}

/// Write node state to disk.
pub fn write_state(path: &Path, state: &NodeState) -> Result<()> {
    let content = serde_json::to_string_pretty(state)?;
    fs::write(path, content)?;
    Ok(())
}

/// Build the node configuration: defaults, then the file, then flags.
pub fn build_config(
    config: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
    bootstrap: Option<String>,
    data_dir: Option<PathBuf>,
) -> Result<NodeConfig> {
    let mut cfg = match config {
        Some(path) if !path.exists() => return Err(CliError::ConfigNotFound(path.to_path_buf())),
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };
    if let Some(host) = host {
        cfg = cfg.host(host);
    }
    if let Some(port) = port {
        cfg = cfg.port(port);
    }
    if let Some(seed) = bootstrap {
        cfg = cfg.bootstrap(seed);
    }
    if let Some(dir) = data_dir {
        cfg = cfg.data_dir(dir);
    }
    Ok(cfg)
}

/// Run a node in the foreground.
pub fn start(
    config: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
    bootstrap: Option<String>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let cfg = build_config(config, host, port, bootstrap, data_dir)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        let node = Node::start(cfg).await?;
        let port = published_port(node.address()).unwrap_or(node.config().port);
        let state_path = state_file(&node.config().data_dir, port);
        write_state(
            &state_path,
            &NodeState {
                pid: std::process::id(),
                address: node.address().to_owned(),
                started_at: chrono::Utc::now().to_rfc3339(),
            },
        )?;

        println!("meshvec node listening on {}", node.address());
        println!("Data directory: {}", node.config().data_dir.display());
        println!("Press Ctrl+C to stop");

        let token = node.shutdown_token();
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "cannot listen for Ctrl+C");
                }
            }
            () = token.cancelled() => {}
        }

        node.shutdown();
        let result = node.wait().await;
        if let Err(e) = fs::remove_file(&state_path) {
            warn!(path = %state_path.display(), error = %e, "failed to remove state file");
        }
        result?;
        println!("Node stopped");
        Ok::<(), CliError>(())
    })
}

/// Ask the target node to shut down.
pub fn stop(target: &Target) -> Result<()> {
    match target.call(Request::Shutdown)? {
        Reply::Ack => {
            println!("Stop requested for node at {}", target.address());
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

fn published_port(address: &str) -> Option<u16> {
    address.rsplit_once(':').and_then(|(_, port)| port.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_state_file_roundtrip() {
        let dir = TempDir::new().expect("tempdir");
        let path = state_file(dir.path(), 8468);
        assert!(path.ends_with("node-8468.json"));

        let state = NodeState { pid: 42, address: "127.0.0.1:8468".into(), started_at: "now".into() };
        write_state(&path, &state).expect("write");
        let read: NodeState = serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(read, state);
    }

    #[test]
    fn test_flags_override_file_values() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("node.toml");
        fs::write(&path, "port = 9000\nhost = \"10.0.0.2\"\nbackup_interval = 30\n").expect("write");

        let cfg = build_config(Some(&path), None, Some(9100), Some("10.0.0.1:8468".into()), None).expect("config");
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.host, "10.0.0.2");
        assert_eq!(cfg.bootstrap.as_deref(), Some("10.0.0.1:8468"));
        assert_eq!(cfg.backup_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_config_file_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let missing = dir.path().join("absent.toml");
        let err = build_config(Some(&missing), None, None, None, None).expect_err("missing");
        assert!(matches!(err, CliError::ConfigNotFound(_)));
    }

    #[test]
    fn test_published_port() {
        assert_eq!(published_port("127.0.0.1:8468"), Some(8468));
        assert_eq!(published_port("localhost"), None);
    }
}
