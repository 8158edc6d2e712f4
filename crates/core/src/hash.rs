//! Blake3 hashing utilities for blocks, transactions and storage keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a digest in bytes.
pub const HASH_SIZE: usize = 32;

/// A named alias for a 32-byte(u8) array, used to represent a 256-bit hash.
pub type H256 = [u8; HASH_SIZE];

/// A 256-bit digest identifying a block or a transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash(pub H256);

impl Hash {
    /// The zero hash. Used as the previous hash of a genesis block and as the
    /// hash of a null output point.
    pub const ZERO: Self = Self([0u8; HASH_SIZE]);

    /// Create a new Hash from raw bytes.
    pub fn from_bytes(bytes: H256) -> Self {
        Self(bytes)
    }

    /// Copy a hash out of a buffer read from storage.
    ///
    /// Returns `None` if the slice is shorter than a digest.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: H256 = bytes.get(..HASH_SIZE)?.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &H256 {
        &self.0
    }

    /// Check for the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }

    /// Convert to a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex form used in log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut arr = [0u8; HASH_SIZE];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<H256> for Hash {
    fn from(bytes: H256) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Hash arbitrary data using Blake3.
pub fn hash(data: &[u8]) -> Hash {
    Hash(blake3::hash(data).into())
}

/// Hash multiple pieces of data by concatenating them.
pub fn hash_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    Hash(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash(b"block"), hash(b"block"));
        assert_ne!(hash(b"block"), hash(b"blocks"));
    }

    #[test]
    fn test_hash_hex_roundtrip() {
        let h = hash(b"test data");
        let parsed = Hash::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, parsed);
        assert!(Hash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_from_slice() {
        let h = hash(b"slice");
        let mut buffer = h.0.to_vec();
        buffer.extend_from_slice(&[1, 2, 3]);

        assert_eq!(Hash::from_slice(&buffer), Some(h));
        assert_eq!(Hash::from_slice(&buffer[..31]), None);
    }

    #[test]
    fn test_short_form() {
        let h = Hash([0xAB; HASH_SIZE]);
        assert_eq!(h.short(), "abababab");
        assert_eq!(format!("{:?}", h), "Hash(abababab)");
        assert_eq!(format!("{}", h).len(), 64);
    }

    #[test]
    fn test_hash_concat() {
        assert_eq!(hash_concat(&[b"hello", b"world"]), hash(b"helloworld"));
    }

    #[test]
    fn test_zero_hash() {
        assert!(Hash::ZERO.is_zero());
        assert!(!hash(b"x").is_zero());
    }
}
