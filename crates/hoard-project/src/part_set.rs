//! Memory-bounded sorted set of [`ChunkReference`]s.
//!
//! Entries are buffered in memory until the buffer reaches its threshold,
//! then merged into one of two overflow files. The files alternate roles:
//! each flush merge-walks the sorted buffer against the *active* file,
//! writes the union to the *inactive* file, and swaps the two.
//!
//! Overflow line format, one entry per line:
//! ```text
//! hex(name) \t hex(hash) \t hex(padding) \n
//! ```
//! Hex-encoding every field keeps tabs and newlines inside names from
//! breaking the framing.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use hoard_types::ChunkHash;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{ProjectError, ProjectResult};
use crate::reference::ChunkReference;

/// Buffered entries kept in memory before a flush.
pub const DEFAULT_BUFFER_THRESHOLD: usize = 10_000;

struct SpillFiles {
    active: NamedTempFile,
    inactive: NamedTempFile,
}

/// Sorted, name-deduplicated set of chunk references backed by disk.
///
/// Only insertion, iteration, clearing, and disposal are supported. The
/// overflow files are deleted by [`dispose`](Self::dispose) or on drop.
pub struct DiskBackedPartSet {
    buffer: BTreeMap<String, ChunkReference>,
    threshold: usize,
    len: usize,
    files: Option<SpillFiles>,
}

impl DiskBackedPartSet {
    /// Create an empty set with the default threshold, spilling to the
    /// system temporary directory.
    pub fn new() -> ProjectResult<Self> {
        Self::with_threshold(DEFAULT_BUFFER_THRESHOLD)
    }

    /// Create an empty set that flushes every `threshold` buffered entries.
    pub fn with_threshold(threshold: usize) -> ProjectResult<Self> {
        Self::new_in(&std::env::temp_dir(), threshold)
    }

    /// Create an empty set spilling into `dir`.
    pub fn new_in(dir: &Path, threshold: usize) -> ProjectResult<Self> {
        let prefix = spill_prefix();
        let make = || {
            tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(".parts")
                .tempfile_in(dir)
        };
        let files = SpillFiles {
            active: make()?,
            inactive: make()?,
        };
        Ok(Self {
            buffer: BTreeMap::new(),
            threshold: threshold.max(1),
            len: 0,
            files: Some(files),
        })
    }

    /// Add an entry. An entry with the same name as an earlier one replaces
    /// it once the set is flushed or iterated.
    pub fn insert(&mut self, part: ChunkReference) -> ProjectResult<()> {
        if self.files.is_none() {
            return Err(ProjectError::Disposed);
        }
        self.len += 1;
        self.buffer.insert(part.relative_name().to_owned(), part);
        if self.buffer.len() >= self.threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Number of `insert` calls since creation or the last `clear`.
    ///
    /// Same-name inserts are counted individually even though iteration
    /// yields only the latest of them.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate the entries in ascending name order.
    ///
    /// Flushes the buffer first. The iterator streams the active overflow
    /// file and closes it once exhausted.
    pub fn iter(&mut self) -> ProjectResult<PartIter<'_>> {
        self.flush()?;
        let files = self.files.as_ref().ok_or(ProjectError::Disposed)?;
        let reader = BufReader::new(files.active.reopen()?);
        Ok(PartIter {
            lines: Some(reader.lines()),
            line_no: 0,
            _set: PhantomData,
        })
    }

    /// Remove every entry and reset the counter.
    pub fn clear(&mut self) -> ProjectResult<()> {
        let files = self.files.as_ref().ok_or(ProjectError::Disposed)?;
        files.active.as_file().set_len(0)?;
        files.inactive.as_file().set_len(0)?;
        self.buffer.clear();
        self.len = 0;
        Ok(())
    }

    /// Delete both overflow files. Calling this again is a no-op; any other
    /// call afterwards fails with [`ProjectError::Disposed`].
    pub fn dispose(&mut self) -> ProjectResult<()> {
        self.buffer.clear();
        if let Some(files) = self.files.take() {
            files.active.close()?;
            files.inactive.close()?;
            debug!("disposed part set overflow files");
        }
        Ok(())
    }

    /// Returns `true` once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.files.is_none()
    }

    /// Paths of the two overflow files, while they exist.
    pub fn spill_paths(&self) -> Option<(PathBuf, PathBuf)> {
        self.files
            .as_ref()
            .map(|f| (f.active.path().to_path_buf(), f.inactive.path().to_path_buf()))
    }

    fn flush(&mut self) -> ProjectResult<()> {
        let files = self.files.as_mut().ok_or(ProjectError::Disposed)?;
        if self.buffer.is_empty() {
            return Ok(());
        }
        // The buffer is only cleared once the merged file is in place, so a
        // failed flush loses nothing.
        let count = self.buffer.len();

        let mut old = SpillReader::new(BufReader::new(files.active.reopen()?));
        let out = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(files.inactive.path())?;
        let mut writer = BufWriter::new(out);

        let mut pending = old.next_part()?;
        for (name, part) in &self.buffer {
            while let Some(existing) = pending.take() {
                match existing.relative_name().cmp(name.as_str()) {
                    Ordering::Less => {
                        write_part(&mut writer, &existing)?;
                        pending = old.next_part()?;
                    }
                    Ordering::Equal => {
                        // Stale on-disk entry; the buffered one wins.
                        pending = old.next_part()?;
                        break;
                    }
                    Ordering::Greater => {
                        pending = Some(existing);
                        break;
                    }
                }
            }
            write_part(&mut writer, part)?;
        }
        while let Some(existing) = pending {
            write_part(&mut writer, &existing)?;
            pending = old.next_part()?;
        }
        writer.flush()?;

        std::mem::swap(&mut files.active, &mut files.inactive);
        self.buffer.clear();
        debug!(merged = count, "flushed part set buffer");
        Ok(())
    }
}

impl std::fmt::Debug for DiskBackedPartSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskBackedPartSet")
            .field("len", &self.len)
            .field("buffered", &self.buffer.len())
            .field("threshold", &self.threshold)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Forward-only iterator over a [`DiskBackedPartSet`].
pub struct PartIter<'a> {
    lines: Option<Lines<BufReader<File>>>,
    line_no: usize,
    _set: PhantomData<&'a mut DiskBackedPartSet>,
}

impl Iterator for PartIter<'_> {
    type Item = ProjectResult<ChunkReference>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        match lines.next() {
            None => {
                self.lines = None;
                None
            }
            Some(Err(e)) => {
                self.lines = None;
                Some(Err(e.into()))
            }
            Some(Ok(line)) => {
                self.line_no += 1;
                Some(decode_part(&line, self.line_no))
            }
        }
    }
}

struct SpillReader {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl SpillReader {
    fn new(reader: BufReader<File>) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }

    fn next_part(&mut self) -> ProjectResult<Option<ChunkReference>> {
        match self.lines.next() {
            None => Ok(None),
            Some(line) => {
                self.line_no += 1;
                decode_part(&line?, self.line_no).map(Some)
            }
        }
    }
}

fn write_part<W: Write>(writer: &mut W, part: &ChunkReference) -> io::Result<()> {
    writeln!(
        writer,
        "{}\t{}\t{}",
        hex::encode(part.relative_name()),
        part.hash().to_hex(),
        hex::encode(part.padding())
    )
}

fn decode_part(line: &str, line_no: usize) -> ProjectResult<ChunkReference> {
    let corrupt = |reason: String| ProjectError::CorruptSpill {
        line: line_no,
        reason,
    };
    let mut fields = line.split('\t');
    let (Some(name), Some(hash), Some(padding), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(corrupt("expected three fields".into()));
    };
    let name = hex::decode(name).map_err(|e| corrupt(e.to_string()))?;
    let name = String::from_utf8(name).map_err(|e| corrupt(e.to_string()))?;
    let hash = ChunkHash::from_hex(hash).map_err(|e| corrupt(e.to_string()))?;
    let padding = hex::decode(padding).map_err(|e| corrupt(e.to_string()))?;
    Ok(ChunkReference::new(name, hash, padding))
}

/// Spill files of processes we cannot check for liveness are swept once
/// they are this old.
pub const ORPHAN_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

const SPILL_PREFIX: &str = "hoard-parts-";

fn spill_prefix() -> String {
    format!("{SPILL_PREFIX}{}-", std::process::id())
}

/// Pid embedded in a spill file name, if the name is one of ours.
fn spill_owner(file_name: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(SPILL_PREFIX)?;
    let (pid, _) = rest.split_once('-')?;
    pid.parse().ok()
}

/// `None` when the platform gives no cheap way to tell.
fn process_alive(pid: u32) -> Option<bool> {
    let proc_root = Path::new("/proc");
    if !proc_root.join("self").exists() {
        return None;
    }
    Some(proc_root.join(pid.to_string()).exists())
}

fn older_than(path: &Path, age: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|elapsed| elapsed > age)
}

/// Remove overflow files left behind by part-set owners that died without
/// cleaning up.
///
/// Files of the calling process are never touched. Another process's files
/// are removed once that process no longer exists or, where liveness cannot
/// be checked, once they are older than [`ORPHAN_MAX_AGE`].
pub fn sweep_orphaned_spill_files(dir: &Path) -> io::Result<usize> {
    let own = std::process::id();
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let Some(owner) = entry.file_name().to_str().and_then(spill_owner) else {
            continue;
        };
        if owner == own {
            continue;
        }
        let path = entry.path();
        let orphan = match process_alive(owner) {
            Some(alive) => !alive,
            None => older_than(&path, ORPHAN_MAX_AGE),
        };
        if !orphan {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), pid = owner, "removed orphaned spill file");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove spill file"),
        }
    }
    Ok(removed)
}
