//! 32-byte SHA3-256 hash type with zero-allocation operations.

use sha3::{Digest, Sha3_256};
use std::fmt;

/// SHA3-256 hash length in bytes.
pub const HASH_LEN: usize = 32;

/// Fixed-size 32-byte hash used for asset identifiers, reference data and
/// signature hashes.
///
/// This type is `Copy` - hashes are passed frequently during predicate
/// evaluation and should live on the stack to avoid heap allocations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash, Ord, PartialOrd)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    /// Creates a zero-valued hash (all bytes are 0x00).
    pub fn zero() -> Hash {
        Hash([0u8; HASH_LEN])
    }

    /// Creates a hash from a byte slice, returning `None` on length mismatch.
    pub fn from_slice(bytes: &[u8]) -> Option<Hash> {
        let arr: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(Hash(arr))
    }

    /// Returns the hash as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Copies the hash into a new `Vec<u8>`.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Creates a new SHA3-256 hash builder for incremental hashing.
    ///
    /// Use this for computing hashes over multiple inputs without
    /// intermediate allocations.
    pub fn sha3() -> HashBuilder {
        HashBuilder::new()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Incremental SHA3-256 hash builder.
///
/// Allows feeding data in chunks and finalizing to produce a [`Hash`].
pub struct HashBuilder {
    hasher: Sha3_256,
}

impl HashBuilder {
    /// Creates a new hash builder with empty state.
    pub fn new() -> Self {
        Self {
            hasher: Sha3_256::new(),
        }
    }

    /// Feeds data into the hash computation.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Feeds data and returns the builder for chaining.
    pub fn chain(mut self, data: &[u8]) -> Self {
        self.update(data);
        self
    }

    /// Consumes the builder and returns the final hash.
    pub fn finalize(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_matches_chained() {
        let mut h = Hash::sha3();
        h.update(b"pred");
        h.update(b"icate");
        assert_eq!(h.finalize(), Hash::sha3().chain(b"predicate").finalize());
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(Hash::from_slice(&[0u8; 32]).is_some());
        assert!(Hash::from_slice(&[0u8; 31]).is_none());
        assert!(Hash::from_slice(&[0u8; 33]).is_none());
    }

    #[test]
    fn zero_hash_is_all_zeroes() {
        assert!(Hash::zero().to_vec().iter().all(|&b| b == 0));
    }

    #[test]
    fn display_is_lowercase_hex() {
        assert_eq!(Hash::zero().to_string(), "0".repeat(64));
    }
}
