//! Foundation types for Hoard.
//!
//! Every chunk stored on the network is addressed by a [`ChunkHash`], a
//! fixed-format identifier carrying both a BLAKE3 digest of the chunk's
//! bytes and the chunk's length. Servers declare which part of the hash
//! space they are responsible for through [`HashSpan`]s.
//!
//! # Key Types
//!
//! - [`ChunkHash`]: Content-derived identifier (digest + length)
//! - [`HashSpan`]: Inclusive interval of the hash space
//! - [`ChunkKind`]: Whether a chunk holds file data or a metadata record

pub mod error;
pub mod hash;
pub mod kind;
pub mod span;

pub use error::TypeError;
pub use hash::{ChunkHash, DIGEST_LEN, HASH_LEN};
pub use kind::ChunkKind;
pub use span::HashSpan;
