use std::fmt;

use serde::{Deserialize, Serialize};

/// The two namespaces a chunk store keeps chunks in.
///
/// A data chunk is keyed by the hash of its own bytes. A metadata chunk is
/// keyed by the hash of the object it describes, so its bytes can change
/// (for example when signatures are appended) without changing its key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkKind {
    Data,
    MetaData,
}

impl ChunkKind {
    /// Returns `true` for metadata chunks.
    pub fn is_meta_data(&self) -> bool {
        matches!(self, Self::MetaData)
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::MetaData => write!(f, "meta-data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names() {
        assert_eq!(ChunkKind::Data.to_string(), "data");
        assert_eq!(ChunkKind::MetaData.to_string(), "meta-data");
    }

    #[test]
    fn meta_data_flag() {
        assert!(ChunkKind::MetaData.is_meta_data());
        assert!(!ChunkKind::Data.is_meta_data());
    }
}
