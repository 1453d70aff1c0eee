//! Content fingerprints of live memory.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::protection::Region;

/// SHA-256 digest of a byte range.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Digest of `bytes`.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }

    /// Digest of the memory in `region`.
    ///
    /// # Safety
    ///
    /// `region` must be mapped, readable and not written concurrently.
    #[must_use]
    pub unsafe fn of(region: Region) -> Self {
        let start = std::ptr::with_exposed_provenance::<u8>(region.start);
        // SAFETY: guaranteed by the caller.
        let bytes = unsafe { std::slice::from_raw_parts(start, region.len) };
        Self::of_bytes(bytes)
    }

    /// Returns `true` if both digests are equal.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self == other
    }

    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            Fingerprint::of_bytes(b"").to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn detects_a_changed_byte() {
        let mut data = *b"I am Static Data";
        let region = Region::from_ptr(data.as_ptr(), data.len());
        // SAFETY: `data` is a live local not written during hashing.
        let before = unsafe { Fingerprint::of(region) };
        assert!(before.matches(&Fingerprint::of_bytes(&data)));

        data[0] = b'U';
        // SAFETY: as above.
        let after = unsafe { Fingerprint::of(region) };
        assert!(!before.matches(&after));
    }
}
