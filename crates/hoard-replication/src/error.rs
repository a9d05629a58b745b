use hoard_project::ProjectError;
use hoard_store::StoreError;
use hoard_types::ChunkHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplicationError {
    /// No read server returned a parseable metadata record.
    #[error("metadata unavailable for {0}")]
    MetadataUnavailable(ChunkHash),

    /// A data chunk could not be fetched from any read server.
    #[error("chunk unavailable: {0}")]
    ChunkUnavailable(ChunkHash),

    #[error("project {0} is encrypted and cannot be read")]
    EncryptedProject(ChunkHash),

    /// The run completed but some chunks did not reach their copy count.
    #[error(
        "replication incomplete: {data_failed} data, {meta_data_failed} meta-data, \
         {manifest_failed} manifest chunks failed"
    )]
    Incomplete {
        data_failed: u64,
        meta_data_failed: u64,
        manifest_failed: u64,
    },

    #[error("worker pool stopped unexpectedly")]
    WorkerLost,

    #[error("manifest error: {0}")]
    Project(#[from] ProjectError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type ReplicationResult<T> = Result<T, ReplicationError>;
