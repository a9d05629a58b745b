//! Directory-backed chunk store.
//!
//! Stores one file per chunk with a 2-level fan-out directory structure:
//! `{root}/{data|meta}/{hex[0..2]}/{hex[2..4]}/{hex}`. An optional
//! `server.toml` at the root declares the hash spans the store advertises.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use hoard_crypto::{ChunkSignature, VerifyingKey};
use hoard_types::{ChunkHash, ChunkKind};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::network::Connector;
use crate::traits::{check_push, ChunkStore, PushOutcome, ServerConfiguration};

/// Name of the optional configuration file at a store's root.
pub const SERVER_CONFIG_FILE: &str = "server.toml";

/// Chunk store rooted in a local directory.
///
/// Writes are atomic: data is written to a temporary file first, then
/// renamed into place.
pub struct DirectoryChunkStore {
    root: PathBuf,
    host: String,
}

impl DirectoryChunkStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let host = root.display().to_string();
        Ok(Self { root, host })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the configuration advertised by this store.
    pub fn write_configuration(&self, config: &ServerConfiguration) -> StoreResult<()> {
        let text = toml::to_string(config).map_err(|e| StoreError::Config(e.to_string()))?;
        std::fs::write(self.root.join(SERVER_CONFIG_FILE), text)?;
        Ok(())
    }

    fn chunk_path(&self, hash: &ChunkHash, kind: ChunkKind) -> PathBuf {
        let hex = hash.to_hex();
        let namespace = match kind {
            ChunkKind::Data => "data",
            ChunkKind::MetaData => "meta",
        };
        self.root
            .join(namespace)
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(&hex)
    }
}

impl ChunkStore for DirectoryChunkStore {
    fn host(&self) -> &str {
        &self.host
    }

    fn has_chunk(&self, hash: &ChunkHash, kind: ChunkKind) -> StoreResult<bool> {
        match std::fs::metadata(self.chunk_path(hash, kind)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn get_chunk(&self, hash: &ChunkHash, kind: ChunkKind) -> StoreResult<Bytes> {
        match std::fs::read(self.chunk_path(hash, kind)) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound { hash: *hash, kind })
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn set_chunk(
        &self,
        signature: &ChunkSignature,
        hash: &ChunkHash,
        kind: ChunkKind,
        data: &Bytes,
    ) -> StoreResult<PushOutcome> {
        if let Err(e) = check_push(signature, hash, kind, data) {
            warn!(host = %self.host, %hash, error = %e, "refusing push");
            return Ok(PushOutcome::failed(e));
        }
        let path = self.chunk_path(hash, kind);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, &path)?;
        debug!(host = %self.host, %hash, %kind, size = data.len(), "stored chunk");
        Ok(PushOutcome::ok())
    }

    fn configuration(&self, _identity: &VerifyingKey) -> StoreResult<ServerConfiguration> {
        let path = self.root.join(SERVER_CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).map_err(|e| StoreError::Config(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfiguration::default()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

/// Connector treating every host name as a store directory.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectoryConnector;

impl Connector for DirectoryConnector {
    fn connect(&self, host: &str) -> StoreResult<Arc<dyn ChunkStore>> {
        Ok(Arc::new(DirectoryChunkStore::open(host)?))
    }
}
