//! Content hashing for sprite bundles
//!
//! Provides [`ContentHash`], the 32-byte digest that names every published
//! bundle. Two byte-identical normalized sprites always share a hash; the
//! short form is what ends up in `sprite-{section}-{hash8}.svg`.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Number of hex characters used when a hash is embedded in a file name.
pub const SHORT_HASH_LEN: usize = 8;

/// A 32-byte content hash (Blake3)
///
/// Immutable and cheap to clone (Copy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Wrap raw digest bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Underlying digest bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create hash from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HashError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| HashError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Digest arbitrary bytes
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self::new(*blake3::hash(data).as_bytes())
    }

    /// Leading [`SHORT_HASH_LEN`] hex characters, used in bundle file names
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..SHORT_HASH_LEN / 2])
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

// Manifests carry the hash as a plain hex string.
impl serde::Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing content hashes
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Invalid hash length
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn compute_is_deterministic() {
        let h1 = ContentHash::compute(b"<symbol id=\"icon-cart\"/>");
        let h2 = ContentHash::compute(b"<symbol id=\"icon-cart\"/>");
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_data_different_hash() {
        assert_ne!(ContentHash::compute(b"cart"), ContentHash::compute(b"user"));
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        let result = ContentHash::from_slice(&[1u8; 31]);
        assert!(matches!(
            result,
            Err(HashError::InvalidLength {
                expected: 32,
                actual: 31
            })
        ));
    }

    #[test]
    fn short_is_prefix_of_full_hex() {
        let hash = ContentHash::compute(b"sprite");
        let short = hash.short();
        assert_eq!(short.len(), SHORT_HASH_LEN);
        assert!(hash.to_string().starts_with(&short));
    }

    #[test]
    fn serde_uses_hex_string() {
        let hash = ContentHash::compute(b"sprite");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{hash}\""));
        let decoded: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, decoded);
    }

    proptest! {
        #[test]
        fn display_parse_roundtrip(bytes in proptest::array::uniform32(any::<u8>())) {
            let hash = ContentHash::new(bytes);
            let parsed: ContentHash = hash.to_string().parse().unwrap();
            prop_assert_eq!(hash, parsed);
        }
    }
}
