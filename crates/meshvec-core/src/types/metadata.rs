//! Opaque metadata payloads.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default maximum metadata payload size (64 KiB).
pub const DEFAULT_MAX_METADATA_BYTES: usize = 64 * 1024;

/// Opaque metadata attached to a vector.
///
/// The store never interprets the bytes. Payloads are bounded; see
/// [`Metadata::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata(Vec<u8>);

impl Metadata {
    /// Wrap a payload, rejecting it if it is larger than `max` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MetadataTooLarge`] when `bytes.len() > max`.
    pub fn new(bytes: Vec<u8>, max: usize) -> Result<Self, CoreError> {
        if bytes.len() > max {
            return Err(CoreError::MetadataTooLarge { size: bytes.len(), max });
        }
        Ok(Self(bytes))
    }

    /// Wrap a UTF-8 string with the default size bound.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MetadataTooLarge`] for oversized strings.
    pub fn from_text(text: &str) -> Result<Self, CoreError> {
        Self::new(text.as_bytes().to_vec(), DEFAULT_MAX_METADATA_BYTES)
    }

    /// Wrap bytes read back from storage. No bound is applied.
    #[must_use]
    pub fn from_stored(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The raw payload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The payload as text, if it is valid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the payload bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}
