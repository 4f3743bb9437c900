//! External identifier to dense handle mapping.
//!
//! External ids are arbitrary caller strings. Each is reduced to a SHA-256
//! [`Fingerprint`], and each fingerprint is assigned a [`VectorHandle`] on
//! first use. Handles only ever increase; releasing a fingerprint forgets
//! its assignment but never frees the number.

use std::collections::HashMap;

use meshvec_core::{Fingerprint, VectorHandle};
use sha2::{Digest, Sha256};

use crate::error::VectorError;

/// Fingerprint of an external identifier.
#[must_use]
pub fn fingerprint(external_id: &str) -> Fingerprint {
    let digest = Sha256::digest(external_id.as_bytes());
    let mut bytes = [0u8; Fingerprint::LEN];
    bytes.copy_from_slice(&digest);
    Fingerprint::from_bytes(bytes)
}

/// Outcome of [`IdentityMapper::handle_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    /// The handle for the fingerprint.
    pub handle: VectorHandle,
    /// Whether the handle was allocated by this call.
    pub fresh: bool,
}

/// Bidirectional fingerprint/handle map with a monotonic allocator.
#[derive(Debug)]
pub struct IdentityMapper {
    forward: HashMap<Fingerprint, VectorHandle>,
    reverse: HashMap<VectorHandle, Fingerprint>,
    next: VectorHandle,
}

impl Default for IdentityMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityMapper {
    /// An empty mapper whose first handle is 0.
    #[must_use]
    pub fn new() -> Self {
        Self { forward: HashMap::new(), reverse: HashMap::new(), next: VectorHandle::new(0) }
    }

    /// Rebuild a mapper from persisted assignments and the next free handle.
    ///
    /// `next` is raised above every restored handle if it is not already.
    pub fn restore(
        assignments: impl IntoIterator<Item = (Fingerprint, VectorHandle)>,
        next: VectorHandle,
    ) -> Self {
        let mut mapper = Self { next, ..Self::new() };
        for (fp, handle) in assignments {
            if handle >= mapper.next {
                mapper.next = handle.next();
            }
            mapper.forward.insert(fp, handle);
            mapper.reverse.insert(handle, fp);
        }
        mapper
    }

    /// Fingerprint of an external identifier.
    #[must_use]
    pub fn fingerprint(&self, external_id: &str) -> Fingerprint {
        fingerprint(external_id)
    }

    /// The handle for `fp`, allocating the next one on first use.
    pub fn handle_for(&mut self, fp: Fingerprint) -> Assignment {
        if let Some(&handle) = self.forward.get(&fp) {
            return Assignment { handle, fresh: false };
        }
        let handle = self.next;
        self.next = handle.next();
        self.forward.insert(fp, handle);
        self.reverse.insert(handle, fp);
        Assignment { handle, fresh: true }
    }

    /// The handle currently assigned to `fp`.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::NotFound`] if `fp` has no handle.
    pub fn lookup(&self, fp: &Fingerprint) -> Result<VectorHandle, VectorError> {
        self.forward
            .get(fp)
            .copied()
            .ok_or_else(|| VectorError::NotFound(format!("no vector with fingerprint {fp}")))
    }

    /// Reverse lookup.
    #[must_use]
    pub fn fingerprint_of(&self, handle: VectorHandle) -> Option<Fingerprint> {
        self.reverse.get(&handle).copied()
    }

    /// Forget the assignment of `fp`. The handle is not reused.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::NotFound`] if `fp` has no handle.
    pub fn release(&mut self, fp: &Fingerprint) -> Result<VectorHandle, VectorError> {
        let handle = self
            .forward
            .remove(fp)
            .ok_or_else(|| VectorError::NotFound(format!("no vector with fingerprint {fp}")))?;
        self.reverse.remove(&handle);
        Ok(handle)
    }

    /// The handle the next allocation will return.
    #[must_use]
    pub const fn next_handle(&self) -> VectorHandle {
        self.next
    }

    /// Number of live assignments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether there are no live assignments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_sha256_hex() {
        // sha256("a")
        assert_eq!(
            fingerprint("a").to_hex(),
            "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb"
        );
        assert_eq!(fingerprint("a"), fingerprint("a"));
        assert_ne!(fingerprint("a"), fingerprint("b"));
    }

    #[test]
    fn handles_are_stable_and_monotonic() {
        let mut mapper = IdentityMapper::new();
        let a = mapper.handle_for(fingerprint("a"));
        let b = mapper.handle_for(fingerprint("b"));
        let again = mapper.handle_for(fingerprint("a"));

        assert_eq!(a, Assignment { handle: VectorHandle::new(0), fresh: true });
        assert_eq!(b.handle, VectorHandle::new(1));
        assert_eq!(again, Assignment { handle: a.handle, fresh: false });
        assert_eq!(mapper.fingerprint_of(b.handle), Some(fingerprint("b")));
    }

    #[test]
    fn released_handles_are_never_reused() {
        let mut mapper = IdentityMapper::new();
        let fp = fingerprint("x");
        let first = mapper.handle_for(fp).handle;
        assert_eq!(mapper.release(&fp).expect("release"), first);
        assert!(mapper.lookup(&fp).is_err());
        assert!(mapper.fingerprint_of(first).is_none());

        let second = mapper.handle_for(fp).handle;
        assert!(second > first);
    }

    #[test]
    fn release_of_unknown_fingerprint_fails() {
        let mut mapper = IdentityMapper::new();
        assert!(matches!(mapper.release(&fingerprint("nope")), Err(VectorError::NotFound(_))));
    }

    #[test]
    fn restore_raises_next_above_existing_handles() {
        let mapper = IdentityMapper::restore(
            [(fingerprint("a"), VectorHandle::new(7))],
            VectorHandle::new(3),
        );
        assert_eq!(mapper.next_handle(), VectorHandle::new(8));
        assert_eq!(mapper.lookup(&fingerprint("a")).expect("lookup"), VectorHandle::new(7));
    }
}
