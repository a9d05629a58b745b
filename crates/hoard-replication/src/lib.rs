//! Replication engine for Hoard.
//!
//! Brings every chunk of a project (or a single file) up to a required
//! number of copies across the network's writable peers.
//!
//! # Architecture
//!
//! - **ReplicationEngine**: walks the root object, feeds member files to a
//!   bounded queue drained by a fixed worker pool, and reports the outcome
//! - **ChunkInjector**: the per-chunk protocol (acquire a verified copy,
//!   survey holders, push to in-range peers first)
//! - **ReplicationListener**: observer for run, file, and chunk events
//! - **MetadataCache**: bounded LRU of parsed metadata records
//!
//! # Ordering
//!
//! The project manifest's chunks are replicated before any member file.
//! Within a file, its metadata chunk is replicated before its data chunks.
//! Files are otherwise replicated in no particular order.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod injector;
pub mod listener;
pub mod stats;

pub use cache::MetadataCache;
pub use config::ReplicationConfig;
pub use engine::ReplicationEngine;
pub use error::{ReplicationError, ReplicationResult};
pub use injector::{ChunkInjector, ChunkRole, SpanCache};
pub use listener::{EventSink, ReplicationListener};
pub use stats::{ReplicationStats, StatsSnapshot, TallySnapshot};
