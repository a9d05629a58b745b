use std::collections::BTreeMap;

use hoard_types::ChunkHash;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// What an uploaded object is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// A single file.
    File,
    /// A project: the object's bytes are an encoded project manifest.
    Project,
}

/// How the object's bytes are encoded before chunking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Plain,
    Encrypted,
}

/// Per-object metadata record.
///
/// Stored as a metadata chunk under the hash of the object it describes.
/// Lists the data chunks that, concatenated in order, reproduce the object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub kind: ObjectKind,
    pub name: String,
    /// Total size of the object in bytes.
    pub size: u64,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Constituent data chunks, in order.
    pub parts: Vec<ChunkHash>,
}

impl ObjectMetadata {
    /// Metadata for a plain file.
    pub fn file(name: impl Into<String>, parts: Vec<ChunkHash>) -> Self {
        Self::new(ObjectKind::File, name, parts)
    }

    /// Metadata for a plain project manifest.
    pub fn project(name: impl Into<String>, parts: Vec<ChunkHash>) -> Self {
        Self::new(ObjectKind::Project, name, parts)
    }

    fn new(kind: ObjectKind, name: impl Into<String>, parts: Vec<ChunkHash>) -> Self {
        let size = parts.iter().map(|p| p.length()).sum();
        Self {
            kind,
            name: name.into(),
            size,
            encoding: Encoding::Plain,
            properties: BTreeMap::new(),
            parts,
        }
    }

    /// Returns `true` if the object is a project manifest.
    pub fn is_project(&self) -> bool {
        self.kind == ObjectKind::Project
    }

    /// Returns `true` if the object's bytes are encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encoding == Encoding::Encrypted
    }

    /// Serialize to the bytes stored in a metadata chunk.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Parse a metadata chunk. Fails if the bytes are not a well-formed record.
    pub fn from_bytes(data: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_sums_parts() {
        let parts = vec![ChunkHash::compute(&[1u8; 10]), ChunkHash::compute(&[2u8; 32])];
        let md = ObjectMetadata::file("a.txt", parts);
        assert_eq!(md.size, 42);
        assert!(!md.is_project());
        assert!(!md.is_encrypted());
    }

    #[test]
    fn bytes_roundtrip() {
        let mut md = ObjectMetadata::project("demo", vec![ChunkHash::compute(b"pf")]);
        md.properties.insert("uploader".into(), "alice".into());
        let decoded = ObjectMetadata::from_bytes(&md.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, md);
        assert!(decoded.is_project());
    }

    #[test]
    fn garbage_is_rejected() {
        let err = ObjectMetadata::from_bytes(b"\x00\x01 not json").unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn encoding_defaults_to_plain() {
        let json = r#"{"kind":"file","name":"x","size":0,"parts":[]}"#;
        let md = ObjectMetadata::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(md.encoding, Encoding::Plain);
        assert!(md.properties.is_empty());
    }
}
