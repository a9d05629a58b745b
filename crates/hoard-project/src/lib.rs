//! Project manifests for Hoard.
//!
//! A project is a directory-like bundle of files. Its manifest maps each
//! file's relative name to the hash of the file's contents and is itself
//! stored on the network as an ordinary object.
//!
//! # Architecture
//!
//! - **ChunkReference**: one `(name, hash, padding)` entry, ordered by name
//! - **DiskBackedPartSet**: sorted entry set that spills to temporary files
//!   so manifests with millions of entries fit in bounded memory
//! - **ProjectManifest**: name, description, license, size, and parts
//! - **ManifestCodec**: the line-oriented `.pf` format, versions 1 through 4
//! - **ProjectPublisher**: chunks files and manifests and pushes them to stores

pub mod codec;
pub mod error;
pub mod manifest;
pub mod part_set;
pub mod publish;
pub mod reference;

pub use codec::ManifestCodec;
pub use error::{ProjectError, ProjectResult};
pub use manifest::{ManifestVersion, ProjectManifest, PROJECT_FILE_EXTENSION, PROJECT_FILE_NAME};
pub use part_set::{sweep_orphaned_spill_files, DiskBackedPartSet, PartIter, DEFAULT_BUFFER_THRESHOLD};
pub use publish::{ProjectPublisher, DEFAULT_CHUNK_SIZE};
pub use reference::ChunkReference;
