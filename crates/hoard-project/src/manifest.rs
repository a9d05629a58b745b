use std::fmt;
use std::path::Path;

use hoard_types::ChunkHash;
use tracing::debug;

use crate::error::{ProjectError, ProjectResult};
use crate::part_set::{DiskBackedPartSet, PartIter};
use crate::reference::ChunkReference;

/// File name of a project's root manifest.
pub const PROJECT_FILE_NAME: &str = "project.pf";

/// Extension of manifest files.
pub const PROJECT_FILE_EXTENSION: &str = "pf";

/// Encoding version of a manifest stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ManifestVersion {
    V1,
    V2,
    V3,
    #[default]
    V4,
}

impl ManifestVersion {
    pub const ALL: [ManifestVersion; 4] = [Self::V1, Self::V2, Self::V3, Self::V4];

    /// The tag written on the first line of the stream.
    pub fn tag(self) -> &'static str {
        match self {
            Self::V1 => "1",
            Self::V2 => "2",
            Self::V3 => "3",
            Self::V4 => "4",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.tag() == tag)
    }

    /// Convert a numeric version (as given on a command line).
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            4 => Some(Self::V4),
            _ => None,
        }
    }

    pub fn records_name(self) -> bool {
        self != Self::V3
    }

    pub fn records_padding(self) -> bool {
        self != Self::V1
    }

    pub fn records_license(self) -> bool {
        self == Self::V4
    }
}

impl fmt::Display for ManifestVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.tag())
    }
}

/// A project: descriptive header plus the set of member files.
///
/// The manifest owns its part set and releases the overflow files on
/// [`close`](Self::close) or drop.
#[derive(Debug)]
pub struct ProjectManifest {
    version: ManifestVersion,
    name: String,
    description: String,
    license_hash: Option<ChunkHash>,
    total_size: u64,
    size_set: bool,
    parts: DiskBackedPartSet,
}

impl ProjectManifest {
    /// Create an empty manifest in the latest format.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> ProjectResult<Self> {
        Ok(Self::with_parts(name, description, DiskBackedPartSet::new()?))
    }

    /// Create an empty manifest using an existing (usually empty) part set.
    pub fn with_parts(
        name: impl Into<String>,
        description: impl Into<String>,
        parts: DiskBackedPartSet,
    ) -> Self {
        Self {
            version: ManifestVersion::default(),
            name: name.into(),
            description: description.into(),
            license_hash: None,
            total_size: 0,
            size_set: false,
            parts,
        }
    }

    pub fn version(&self) -> ManifestVersion {
        self.version
    }

    pub fn set_version(&mut self, version: ManifestVersion) {
        self.version = version;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn license_hash(&self) -> Option<&ChunkHash> {
        self.license_hash.as_ref()
    }

    pub fn set_license_hash(&mut self, license: Option<ChunkHash>) {
        self.license_hash = license;
    }

    /// Total size of the member files, once known.
    ///
    /// `None` until [`calculate_size`](Self::calculate_size) has run or the
    /// manifest was decoded from a stream.
    pub fn total_size(&self) -> Option<u64> {
        self.size_set.then_some(self.total_size)
    }

    pub(crate) fn set_total_size(&mut self, size: u64) {
        self.total_size = size;
        self.size_set = true;
    }

    /// Recompute the total size as the sum of padding-adjusted part lengths.
    pub fn calculate_size(&mut self) -> ProjectResult<u64> {
        let mut total = 0u64;
        for part in self.parts.iter()? {
            total = total.saturating_add(part?.padding_adjusted_length());
        }
        self.set_total_size(total);
        debug!(name = %self.name, total, "calculated project size");
        Ok(total)
    }

    /// Add a member file. A part with the same name as an existing one
    /// replaces it.
    pub fn add_part(&mut self, part: ChunkReference) -> ProjectResult<()> {
        self.parts.insert(part)
    }

    /// Number of `add_part` calls; see [`DiskBackedPartSet::len`].
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Iterate the member files in name order.
    pub fn parts(&mut self) -> ProjectResult<PartIter<'_>> {
        self.parts.iter()
    }

    pub fn parts_mut(&mut self) -> &mut DiskBackedPartSet {
        &mut self.parts
    }

    /// Release the part set's overflow files. Idempotent.
    pub fn close(&mut self) -> ProjectResult<()> {
        self.parts.dispose()
    }

    /// Read and decode a manifest file.
    pub fn load(path: &Path) -> ProjectResult<Self> {
        let file = std::fs::File::open(path)?;
        crate::codec::ManifestCodec::decode(std::io::BufReader::new(file))
    }

    /// Encode the manifest into a file, recomputing its size.
    pub fn save(&mut self, path: &Path) -> ProjectResult<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        crate::codec::ManifestCodec::encode(self, &mut writer)?;
        std::io::Write::flush(&mut writer)?;
        Ok(())
    }

    pub(crate) fn check_encodable(&self) -> ProjectResult<()> {
        check_line("name", &self.name)?;
        check_line("description", &self.description)
    }
}

pub(crate) fn check_line(field: &'static str, value: &str) -> ProjectResult<()> {
    if value.contains('\n') {
        return Err(ProjectError::InvalidField {
            field,
            reason: "must not contain a newline".into(),
        });
    }
    Ok(())
}
