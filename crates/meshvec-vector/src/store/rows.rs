//! Durable row encoding for a collection's store file.

use meshvec_core::VectorHandle;
use serde::{Deserialize, Serialize};

use crate::error::VectorError;

/// Key in the identity table holding the next free handle.
pub(crate) const NEXT_HANDLE_KEY: &[u8] = b"next";

/// A persisted vector, keyed by fingerprint in the vectors table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct VectorRow {
    pub external_id: String,
    pub handle: VectorHandle,
    pub vector: Vec<f32>,
}

impl VectorRow {
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>, VectorError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| VectorError::Encoding(e.to_string()))
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, VectorError> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(row, _)| row)
            .map_err(|e| VectorError::Encoding(e.to_string()))
    }
}

pub(crate) fn encode_handle(handle: VectorHandle) -> [u8; 8] {
    handle.as_u64().to_be_bytes()
}

pub(crate) fn decode_handle(bytes: &[u8]) -> Result<VectorHandle, VectorError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| VectorError::Encoding(format!("handle must be 8 bytes, got {}", bytes.len())))?;
    Ok(VectorHandle::new(u64::from_be_bytes(arr)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_bytes_roundtrip() {
        let row = VectorRow { external_id: "doc-1".into(), handle: VectorHandle::new(9), vector: vec![0.5, -1.0] };
        let back = VectorRow::from_bytes(&row.to_bytes().expect("encode")).expect("decode");
        assert_eq!(back, row);
    }

    #[test]
    fn test_handle_encoding_sorts_numerically() {
        assert!(encode_handle(VectorHandle::new(2)) < encode_handle(VectorHandle::new(256)));
        assert_eq!(decode_handle(&encode_handle(VectorHandle::new(77))).expect("decode"), VectorHandle::new(77));
        assert!(decode_handle(&[1, 2]).is_err());
    }
}
