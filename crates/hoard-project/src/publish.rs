//! Uploading files and projects to chunk stores.
//!
//! An object is split into fixed-size data chunks. Its metadata record,
//! listing those chunks in order, is stored as a metadata chunk under the
//! hash of the whole object. A project is published as the object whose
//! bytes are its encoded manifest.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use hoard_crypto::SigningKey;
use hoard_store::{ChunkStore, ObjectKind, ObjectMetadata};
use hoard_types::{ChunkHash, ChunkKind};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::codec::ManifestCodec;
use crate::error::{ProjectError, ProjectResult};
use crate::manifest::ProjectManifest;
use crate::reference::ChunkReference;

/// Size of the data chunks objects are split into.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;

/// Pushes objects to every configured store.
///
/// A chunk counts as published once at least one store accepts it.
pub struct ProjectPublisher<'a> {
    stores: Vec<Arc<dyn ChunkStore>>,
    signer: &'a SigningKey,
    chunk_size: usize,
}

impl<'a> ProjectPublisher<'a> {
    pub fn new(stores: Vec<Arc<dyn ChunkStore>>, signer: &'a SigningKey) -> Self {
        Self {
            stores,
            signer,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Publish a single file and return its hash.
    pub fn publish_file(&self, name: &str, data: &[u8]) -> ProjectResult<ChunkHash> {
        self.publish_object(ObjectKind::File, name, data)
    }

    /// Encode and publish a manifest, returning the project's root hash.
    pub fn publish_project(&self, manifest: &mut ProjectManifest) -> ProjectResult<ChunkHash> {
        let encoded = ManifestCodec::encode_to_vec(manifest)?;
        let name = manifest.name().to_owned();
        let root = self.publish_object(ObjectKind::Project, &name, &encoded)?;
        info!(project = %name, %root, parts = manifest.part_count(), "published project");
        Ok(root)
    }

    /// Publish every regular file under `dir` as members of a new project.
    ///
    /// Member names are paths relative to `dir` with `/` separators. The
    /// returned manifest has already been published.
    pub fn publish_directory(
        &self,
        dir: &Path,
        name: &str,
        description: &str,
    ) -> ProjectResult<(ChunkHash, ProjectManifest)> {
        let mut manifest = ProjectManifest::new(name, description)?;
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| ProjectError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = relative_name(dir, entry.path())?;
            let data = std::fs::read(entry.path())?;
            let hash = self.publish_file(&relative, &data)?;
            manifest.add_part(ChunkReference::new(relative, hash, Vec::new()))?;
        }
        let root = self.publish_project(&mut manifest)?;
        Ok((root, manifest))
    }

    fn publish_object(&self, kind: ObjectKind, name: &str, data: &[u8]) -> ProjectResult<ChunkHash> {
        let hash = ChunkHash::compute(data);
        let mut parts = Vec::new();
        for chunk in data.chunks(self.chunk_size) {
            let chunk_hash = ChunkHash::compute(chunk);
            self.push(&chunk_hash, ChunkKind::Data, Bytes::copy_from_slice(chunk))?;
            parts.push(chunk_hash);
        }
        let metadata = match kind {
            ObjectKind::File => ObjectMetadata::file(name, parts),
            ObjectKind::Project => ObjectMetadata::project(name, parts),
        };
        self.push(&hash, ChunkKind::MetaData, Bytes::from(metadata.to_bytes()?))?;
        debug!(%hash, name, chunks = metadata.parts.len(), "published object");
        Ok(hash)
    }

    fn push(&self, hash: &ChunkHash, kind: ChunkKind, data: Bytes) -> ProjectResult<()> {
        let signature = self.signer.sign_chunk(hash, kind, &data);
        let mut accepted = 0usize;
        for store in &self.stores {
            match store.set_chunk(&signature, hash, kind, &data) {
                Ok(outcome) if outcome.is_success() => accepted += 1,
                Ok(outcome) => {
                    for error in &outcome.errors {
                        warn!(host = store.host(), %hash, %error, "push attempt failed");
                    }
                }
                Err(error) => warn!(host = store.host(), %hash, %error, "push failed"),
            }
        }
        if accepted == 0 {
            return Err(ProjectError::PublishFailed(hash.to_hex()));
        }
        Ok(())
    }
}

fn relative_name(root: &Path, path: &Path) -> ProjectResult<String> {
    let relative = path.strip_prefix(root).map_err(|e| ProjectError::InvalidField {
        field: "path",
        reason: e.to_string(),
    })?;
    let mut name = String::new();
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| ProjectError::InvalidField {
            field: "path",
            reason: format!("{} is not valid UTF-8", relative.display()),
        })?;
        if !name.is_empty() {
            name.push('/');
        }
        name.push_str(part);
    }
    Ok(name)
}
