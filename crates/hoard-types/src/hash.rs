use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Length of the BLAKE3 digest portion of a [`ChunkHash`].
pub const DIGEST_LEN: usize = 32;

/// Length of the canonical binary form of a [`ChunkHash`].
pub const HASH_LEN: usize = DIGEST_LEN + 8;

/// Content-derived identifier for a chunk.
///
/// The canonical binary form is the 32-byte BLAKE3 digest of the chunk's
/// bytes followed by the chunk's length as a big-endian `u64`. Identical
/// content always produces the same `ChunkHash`, and the length can be read
/// back without fetching the chunk.
///
/// Ordering is byte-wise over the canonical form; hash spans rely on it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkHash([u8; HASH_LEN]);

impl ChunkHash {
    /// The smallest possible hash.
    pub const MIN: Self = Self([0u8; HASH_LEN]);

    /// The largest possible hash.
    pub const MAX: Self = Self([0xffu8; HASH_LEN]);

    /// Compute the hash of a chunk's bytes.
    pub fn compute(data: &[u8]) -> Self {
        Self::from_parts(*blake3::hash(data).as_bytes(), data.len() as u64)
    }

    /// Assemble a hash from a digest and a length.
    pub fn from_parts(digest: [u8; DIGEST_LEN], length: u64) -> Self {
        let mut bytes = [0u8; HASH_LEN];
        bytes[..DIGEST_LEN].copy_from_slice(&digest);
        bytes[DIGEST_LEN..].copy_from_slice(&length.to_be_bytes());
        Self(bytes)
    }

    /// Parse the canonical binary form.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; HASH_LEN] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: HASH_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The canonical binary form.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// The BLAKE3 digest portion.
    pub fn digest(&self) -> &[u8] {
        &self.0[..DIGEST_LEN]
    }

    /// Byte length of the chunk this hash identifies.
    pub fn length(&self) -> u64 {
        let mut len = [0u8; 8];
        len.copy_from_slice(&self.0[DIGEST_LEN..]);
        u64::from_be_bytes(len)
    }

    /// Returns `true` if `data` hashes to this value.
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute(data) == *self
    }

    /// Hex-encoded text form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse the hex text form.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s.trim()).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkHash({}, {}B)", self.short_hex(), self.length())
    }
}

impl fmt::Display for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ChunkHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ChunkHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChunkHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
