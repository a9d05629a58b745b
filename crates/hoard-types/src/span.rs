use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::ChunkHash;

/// Inclusive interval of the hash space a server declares responsibility for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashSpan {
    pub first: ChunkHash,
    pub last: ChunkHash,
}

impl HashSpan {
    /// Create a span, rejecting one whose bounds are inverted.
    pub fn new(first: ChunkHash, last: ChunkHash) -> Result<Self, TypeError> {
        if first > last {
            return Err(TypeError::InvertedSpan {
                first: first.short_hex(),
                last: last.short_hex(),
            });
        }
        Ok(Self { first, last })
    }

    /// The span covering the whole hash space.
    pub const fn full() -> Self {
        Self {
            first: ChunkHash::MIN,
            last: ChunkHash::MAX,
        }
    }

    /// Returns `true` if `hash` falls inside this span.
    pub fn contains(&self, hash: &ChunkHash) -> bool {
        self.first <= *hash && *hash <= self.last
    }

    /// Returns `true` if any span in `spans` contains `hash`.
    pub fn any_contains(spans: &[HashSpan], hash: &ChunkHash) -> bool {
        spans.iter().any(|span| span.contains(hash))
    }
}
