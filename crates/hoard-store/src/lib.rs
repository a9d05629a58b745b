//! Chunk store capability for Hoard.
//!
//! A chunk store is an addressable network peer holding chunks in two
//! namespaces: data chunks keyed by their own hash, and metadata chunks
//! keyed by the hash of the object they describe. The replication engine
//! talks to peers only through the [`ChunkStore`] trait.
//!
//! # Backends
//!
//! - [`InMemoryChunkStore`] -- `HashMap`-based store for tests and embedding,
//!   with fault injection
//! - [`DirectoryChunkStore`] -- one file per chunk under a local directory
//!
//! # Collaborators
//!
//! - [`Topology`] -- the currently known set of peers
//! - [`Connector`] -- turns a peer's host name into a [`ChunkStore`]
//!
//! # Design Rules
//!
//! 1. Data chunks are immutable; a store verifies a data chunk's hash before
//!    accepting it.
//! 2. Every push carries a [`ChunkSignature`](hoard_crypto::ChunkSignature)
//!    that the store checks.
//! 3. A push may partially fail; failures are reported in [`PushOutcome`]
//!    rather than as an `Err`.

pub mod directory;
pub mod error;
pub mod memory;
pub mod metadata;
pub mod network;
pub mod traits;

pub use directory::{DirectoryChunkStore, DirectoryConnector};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryChunkStore;
pub use metadata::{Encoding, ObjectKind, ObjectMetadata};
pub use network::{Connector, PeerDescriptor, StaticTopology, Topology};
pub use traits::{ChunkStore, PushOutcome, ServerConfiguration};
