use hoard_store::StoreError;
use hoard_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
    /// The stream's first line is not a known version tag. Carries at most
    /// the first ten characters of the tag.
    #[error("unsupported manifest version: {preview}")]
    UnsupportedVersion { preview: String },

    #[error("malformed manifest: {0}")]
    Malformed(String),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("corrupt spill file line {line}: {reason}")]
    CorruptSpill { line: usize, reason: String },

    #[error("part set has been disposed")]
    Disposed,

    #[error("no store accepted chunk {0}")]
    PublishFailed(String),

    #[error("invalid hash: {0}")]
    Hash(#[from] TypeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProjectResult<T> = Result<T, ProjectError>;
