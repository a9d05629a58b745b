use std::cmp::Ordering;

use hoard_types::ChunkHash;

/// One file entry in a project manifest.
///
/// Equality and ordering consider only the relative name: two references
/// with the same name are the same entry, whatever their hashes.
#[derive(Clone, Debug)]
pub struct ChunkReference {
    relative_name: String,
    hash: ChunkHash,
    padding: Vec<u8>,
}

impl ChunkReference {
    pub fn new(relative_name: impl Into<String>, hash: ChunkHash, padding: Vec<u8>) -> Self {
        Self {
            relative_name: relative_name.into(),
            hash,
            padding,
        }
    }

    /// Path of the file relative to the project root.
    pub fn relative_name(&self) -> &str {
        &self.relative_name
    }

    /// Hash of the file's stored bytes.
    pub fn hash(&self) -> &ChunkHash {
        &self.hash
    }

    /// Bytes appended to the file before storage.
    pub fn padding(&self) -> &[u8] {
        &self.padding
    }

    /// Length of the file without its padding.
    pub fn padding_adjusted_length(&self) -> u64 {
        self.hash.length().saturating_sub(self.padding.len() as u64)
    }

    /// Move the entry under a destination directory.
    pub fn prefix_with(&mut self, directory: &str) {
        let directory = directory.trim_end_matches('/');
        if !directory.is_empty() {
            self.relative_name = format!("{directory}/{}", self.relative_name);
        }
    }

    pub fn set_padding(&mut self, padding: Vec<u8>) {
        self.padding = padding;
    }

    /// Returns `true` if name, hash, and padding all match.
    pub fn same_entry(&self, other: &Self) -> bool {
        self.relative_name == other.relative_name
            && self.hash == other.hash
            && self.padding == other.padding
    }
}

impl PartialEq for ChunkReference {
    fn eq(&self, other: &Self) -> bool {
        self.relative_name == other.relative_name
    }
}

impl Eq for ChunkReference {}

impl PartialOrd for ChunkReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChunkReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.relative_name.cmp(&other.relative_name)
    }
}
