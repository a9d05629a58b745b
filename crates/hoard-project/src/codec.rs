//! The `.pf` manifest format.
//!
//! A stream starts with a version tag line followed by a version-specific
//! header and then one entry per member file until end of stream. `LINE`
//! is UTF-8 text ended by `\n`; `BLOCK` is a 4-byte big-endian length
//! followed by that many bytes.
//!
//! | Version | Header                          | Entry                                 |
//! |---------|---------------------------------|---------------------------------------|
//! | 1       | size, name, description         | name LINE, hash LINE                  |
//! | 2       | size, name, description         | name LINE, hash LINE, padding BLOCK   |
//! | 3       | size                            | name LINE, hash LINE, padding BLOCK   |
//! | 4       | size, name, description, license | name LINE, hash BLOCK, padding BLOCK |

use std::io::{BufRead, Read, Write};

use hoard_types::{ChunkHash, HASH_LEN};
use tracing::debug;

use crate::error::{ProjectError, ProjectResult};
use crate::manifest::{check_line, ManifestVersion, ProjectManifest};
use crate::part_set::DiskBackedPartSet;
use crate::reference::ChunkReference;

/// Upper bound on a single BLOCK, guarding against corrupt length prefixes.
pub const MAX_BLOCK_LEN: usize = 1 << 20;

const TAG_PREVIEW_CHARS: usize = 10;

/// Encoder/decoder for project manifests.
pub struct ManifestCodec;

impl ManifestCodec {
    /// Encode `manifest` in its own version.
    ///
    /// The total size is recomputed from the parts before it is written.
    pub fn encode<W: Write>(manifest: &mut ProjectManifest, mut writer: W) -> ProjectResult<()> {
        manifest.check_encodable()?;
        let size = manifest.calculate_size()?;
        let version = manifest.version();

        write_line(&mut writer, version.tag())?;
        write_line(&mut writer, &size.to_string())?;
        if version.records_name() {
            write_line(&mut writer, manifest.name())?;
            write_line(&mut writer, manifest.description())?;
        }
        if version.records_license() {
            let license = manifest.license_hash().map(ChunkHash::to_hex).unwrap_or_default();
            write_line(&mut writer, &license)?;
        }

        let mut count = 0usize;
        for part in manifest.parts()? {
            let part = part?;
            check_line("part name", part.relative_name())?;
            write_line(&mut writer, part.relative_name())?;
            match version {
                ManifestVersion::V1 => write_line(&mut writer, &part.hash().to_hex())?,
                ManifestVersion::V2 | ManifestVersion::V3 => {
                    write_line(&mut writer, &part.hash().to_hex())?;
                    write_block(&mut writer, part.padding())?;
                }
                ManifestVersion::V4 => {
                    write_block(&mut writer, part.hash().as_bytes())?;
                    write_block(&mut writer, part.padding())?;
                }
            }
            count += 1;
        }
        debug!(%version, parts = count, size, "encoded manifest");
        Ok(())
    }

    /// Encode into a byte vector.
    pub fn encode_to_vec(manifest: &mut ProjectManifest) -> ProjectResult<Vec<u8>> {
        let mut buf = Vec::new();
        Self::encode(manifest, &mut buf)?;
        Ok(buf)
    }

    /// Decode a manifest, spilling its parts to a fresh part set.
    pub fn decode<R: BufRead>(reader: R) -> ProjectResult<ProjectManifest> {
        Self::decode_into(reader, DiskBackedPartSet::new()?)
    }

    /// Decode a manifest from a byte slice.
    pub fn decode_slice(data: &[u8]) -> ProjectResult<ProjectManifest> {
        Self::decode(data)
    }

    /// Decode a manifest, inserting its parts into `parts`.
    pub fn decode_into<R: BufRead>(
        mut reader: R,
        parts: DiskBackedPartSet,
    ) -> ProjectResult<ProjectManifest> {
        let version = read_version(&mut reader)?;
        let size_line = expect_line(&mut reader, "size")?;
        let size: u64 = size_line.trim().parse().map_err(|_| ProjectError::InvalidField {
            field: "size",
            reason: format!("not a number: {size_line:?}"),
        })?;

        let mut manifest = ProjectManifest::with_parts("", "", parts);
        manifest.set_version(version);
        if version.records_name() {
            manifest.set_name(expect_line(&mut reader, "name")?);
            manifest.set_description(expect_line(&mut reader, "description")?);
        }
        if version.records_license() {
            let license = expect_line(&mut reader, "license")?;
            if !license.trim().is_empty() {
                manifest.set_license_hash(Some(ChunkHash::from_hex(&license)?));
            }
        }

        let mut count = 0usize;
        while let Some(name) = read_line(&mut reader)? {
            let hash = match version {
                ManifestVersion::V4 => {
                    let raw = expect_block(&mut reader, "hash")?;
                    if raw.len() != HASH_LEN {
                        return Err(ProjectError::InvalidField {
                            field: "hash",
                            reason: format!("expected {HASH_LEN} bytes, got {}", raw.len()),
                        });
                    }
                    ChunkHash::from_slice(&raw)?
                }
                _ => ChunkHash::from_hex(&expect_line(&mut reader, "hash")?)?,
            };
            let padding = if version.records_padding() {
                expect_block(&mut reader, "padding")?
            } else {
                Vec::new()
            };
            manifest.add_part(ChunkReference::new(name, hash, padding))?;
            count += 1;
        }

        manifest.set_total_size(size);
        debug!(%version, parts = count, size, "decoded manifest");
        Ok(manifest)
    }
}

fn write_line<W: Write>(writer: &mut W, line: &str) -> ProjectResult<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn write_block<W: Write>(writer: &mut W, data: &[u8]) -> ProjectResult<()> {
    let len = u32::try_from(data.len()).map_err(|_| {
        ProjectError::Malformed(format!("block of {} bytes is too large", data.len()))
    })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(data)?;
    Ok(())
}

fn read_version<R: BufRead>(reader: &mut R) -> ProjectResult<ManifestVersion> {
    let mut raw = Vec::new();
    reader.read_until(b'\n', &mut raw)?;
    if raw.last() == Some(&b'\n') {
        raw.pop();
    }
    let tag = String::from_utf8_lossy(&raw);
    ManifestVersion::from_tag(tag.trim_end_matches('\r')).ok_or_else(|| {
        ProjectError::UnsupportedVersion {
            preview: tag.chars().take(TAG_PREVIEW_CHARS).collect(),
        }
    })
}

/// Read one line; `None` at a clean end of stream.
fn read_line<R: BufRead>(reader: &mut R) -> ProjectResult<Option<String>> {
    let mut raw = Vec::new();
    if reader.read_until(b'\n', &mut raw)? == 0 {
        return Ok(None);
    }
    if raw.last() == Some(&b'\n') {
        raw.pop();
    }
    String::from_utf8(raw)
        .map(Some)
        .map_err(|e| ProjectError::Malformed(format!("line is not UTF-8: {e}")))
}

fn expect_line<R: BufRead>(reader: &mut R, what: &str) -> ProjectResult<String> {
    read_line(reader)?
        .ok_or_else(|| ProjectError::Malformed(format!("unexpected end of stream reading {what}")))
}

fn expect_block<R: Read>(reader: &mut R, what: &str) -> ProjectResult<Vec<u8>> {
    let truncated =
        |_| ProjectError::Malformed(format!("unexpected end of stream reading {what}"));
    let mut len = [0u8; 4];
    reader.read_exact(&mut len).map_err(truncated)?;
    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_BLOCK_LEN {
        return Err(ProjectError::Malformed(format!(
            "{what} block of {len} bytes exceeds {MAX_BLOCK_LEN}"
        )));
    }
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).map_err(truncated)?;
    Ok(data)
}
