use hoard_types::{ChunkHash, ChunkKind};

/// Errors from chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested chunk was not found.
    #[error("{kind} chunk not found: {hash}")]
    NotFound { hash: ChunkHash, kind: ChunkKind },

    /// The peer could not be reached.
    #[error("server unreachable: {0}")]
    Unreachable(String),

    /// The peer refused a push.
    #[error("push rejected by {host}: {reason}")]
    Rejected { host: String, reason: String },

    /// A data chunk's bytes do not hash to its key.
    #[error("hash mismatch for {expected}: computed {computed}")]
    HashMismatch {
        expected: ChunkHash,
        computed: ChunkHash,
    },

    /// The push signature did not verify.
    #[error("invalid push signature for {0}")]
    InvalidSignature(ChunkHash),

    /// A metadata record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A server configuration file could not be read.
    #[error("invalid server configuration: {0}")]
    Config(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
