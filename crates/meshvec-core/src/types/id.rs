//! Identifiers for collections and the vectors they hold.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Unique identifier for a collection.
///
/// A random 128-bit token assigned when the collection is created. Its
/// string form is the hyphenated UUID and is what the location directory
/// uses as its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionId(Uuid);

impl CollectionId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `CollectionId` from a UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Rebuild an identifier from its 16 raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// The 16 raw bytes, used as a storage key prefix.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for CollectionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| CoreError::Parse(format!("invalid collection id '{s}': {e}")))
    }
}

/// Dense integer handle of a vector inside a collection's index.
///
/// Handles are allocated in increasing order and never reused, even after
/// the vector they named has been deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VectorHandle(u64);

impl VectorHandle {
    /// Create a new `VectorHandle` from a raw u64 value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw u64 value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The handle allocated after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u64> for VectorHandle {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for VectorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 digest of an external vector identifier.
///
/// Displayed and parsed as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Length of a fingerprint in bytes.
    pub const LEN: usize = 32;

    /// Wrap raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Rebuild a fingerprint from a byte slice, e.g. a storage key.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CoreError::Parse(format!("fingerprint must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// The raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

impl FromStr for Fingerprint {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| CoreError::Parse(format!("invalid fingerprint: {e}")))?;
        Self::from_slice(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_handle_roundtrip() {
        let id = VectorHandle::new(42);
        assert_eq!(id.as_u64(), 42);
        assert_eq!(id.next(), VectorHandle::new(43));
    }

    #[test]
    fn handles_are_ordered() {
        let a = VectorHandle::new(1);
        let b = VectorHandle::new(2);
        assert!(a < b);
    }

    #[test]
    fn collection_id_parses_its_display_form() {
        let id = CollectionId::generate();
        let parsed: CollectionId = id.to_string().parse().expect("parse collection id");
        assert_eq!(parsed, id);
        assert_eq!(CollectionId::from_bytes(*id.as_bytes()), id);
    }

    #[test]
    fn collection_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<CollectionId>().is_err());
    }

    #[test]
    fn fingerprint_hex_roundtrip() {
        let fp = Fingerprint::from_bytes([0xab; 32]);
        assert_eq!(fp.to_hex().len(), 64);
        let parsed: Fingerprint = fp.to_hex().parse().expect("parse fingerprint");
        assert_eq!(parsed, fp);
    }

    #[test]
    fn fingerprint_from_short_slice_fails() {
        assert!(Fingerprint::from_slice(&[1, 2, 3]).is_err());
    }
}
