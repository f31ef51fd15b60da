//! Cryptographic hash type using Blake3.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte Blake3 hash.
///
/// Used for transaction hashes and ledger accumulators. Safe to use as a
/// `HashMap` key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Zero hash (all bytes are 0x00).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Hash arbitrary bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Hash the concatenation of several byte slices.
    pub fn from_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Self(*hasher.finalize().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Fold `other` into this accumulator: `H(self || other)`.
    pub fn accumulate(&self, other: &Hash) -> Hash {
        Self::from_parts(&[&self.0, &other.0])
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Hash({}..{})", &hex[..8], &hex[56..])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(Hash::from_bytes(b"ledger"), Hash::from_bytes(b"ledger"));
        assert_ne!(Hash::from_bytes(b"ledger"), Hash::from_bytes(b"ledgers"));
    }

    #[test]
    fn test_accumulate_is_order_sensitive() {
        let a = Hash::from_bytes(b"a");
        let b = Hash::from_bytes(b"b");
        assert_ne!(a.accumulate(&b), b.accumulate(&a));
    }
}
