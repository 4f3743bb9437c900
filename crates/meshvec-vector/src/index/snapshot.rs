//! Versioned snapshot files.
//!
//! Layout: 4-byte magic `MVIX`, little-endian `u32` format version, then the
//! bincode-encoded graph.

use std::fs;
use std::io::Write;
use std::path::Path;

use meshvec_core::{Metric, VectorHandle};
use serde::{Deserialize, Serialize};

use super::config::HnswConfig;
use crate::error::VectorError;

/// Magic bytes at the start of every snapshot file.
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"MVIX";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct IndexSnapshot {
    pub dimension: usize,
    pub metric: Metric,
    pub capacity: usize,
    pub config: HnswConfig,
    pub entry_point: Option<VectorHandle>,
    pub max_layer: usize,
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct NodeSnapshot {
    pub handle: VectorHandle,
    pub vector: Vec<f32>,
    pub max_layer: usize,
    pub connections: Vec<Vec<VectorHandle>>,
    pub deleted: bool,
}

pub(crate) fn encode(snapshot: &IndexSnapshot) -> Result<Vec<u8>, VectorError> {
    let payload = bincode::serde::encode_to_vec(snapshot, bincode::config::standard())
        .map_err(|e| VectorError::Encoding(e.to_string()))?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(SNAPSHOT_MAGIC);
    bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<IndexSnapshot, VectorError> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != SNAPSHOT_MAGIC {
        return Err(VectorError::Snapshot("not an index snapshot".into()));
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[4..HEADER_LEN]);
    let version = u32::from_le_bytes(version);
    if version != SNAPSHOT_VERSION {
        return Err(VectorError::Snapshot(format!(
            "unsupported snapshot version {version} (expected {SNAPSHOT_VERSION})"
        )));
    }
    let (snapshot, _) = bincode::serde::decode_from_slice::<IndexSnapshot, _>(
        &bytes[HEADER_LEN..],
        bincode::config::standard(),
    )
    .map_err(|e| VectorError::Snapshot(e.to_string()))?;
    Ok(snapshot)
}

/// Write `bytes` to `path` via a temporary file and rename.
pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<(), VectorError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> IndexSnapshot {
        IndexSnapshot {
            dimension: 2,
            metric: Metric::Cosine,
            capacity: 10,
            config: HnswConfig::default(),
            entry_point: None,
            max_layer: 0,
            nodes: Vec::new(),
        }
    }

    #[test]
    fn test_header_is_checked() {
        let mut bytes = encode(&empty()).expect("encode");
        assert_eq!(&bytes[..4], SNAPSHOT_MAGIC);
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(VectorError::Snapshot(_))));
    }

    #[test]
    fn test_future_version_is_rejected() {
        let mut bytes = encode(&empty()).expect("encode");
        bytes[4..8].copy_from_slice(&(SNAPSHOT_VERSION + 1).to_le_bytes());
        let err = decode(&bytes).expect_err("version");
        assert!(err.to_string().contains("unsupported snapshot version"));
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        assert!(decode(b"MVI").is_err());
    }
}
