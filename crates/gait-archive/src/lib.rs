// crates/gait-archive/src/lib.rs
// ============================================================================
// Module: Gait Archive
// Description: Byte-stable, deterministic container packaging.
// Purpose: Produce archives that are bit-for-bit identical across hosts,
//          filesystems, and process runs for identical logical contents.
// Dependencies: flate2, gait-core
// ============================================================================

//! ## Overview
//! `gait-archive` is a small bespoke container format, not a generic
//! zip or tar consumer — those formats embed host-dependent metadata
//! (local timezone offsets, filesystem-specific mode bits, data
//! descriptors) by default, which breaks byte-for-byte reproducibility.
//! Every entry here is sorted by path, carries a fixed synthetic epoch
//! and fixed permission bits, and is compressed with DEFLATE at a
//! pinned level. Two writers given the same paths and bytes, in any
//! insertion order, produce the same archive bytes.

use std::collections::BTreeSet;
use std::io::Read;
use std::io::Write;

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use thiserror::Error;

/// Magic bytes identifying a Gait archive.
const MAGIC: &[u8; 4] = b"GAIT";
/// Container format version. Bumped on incompatible layout changes.
const FORMAT_VERSION: u8 = 1;
/// Synthetic epoch (seconds since Unix epoch) stamped on every entry,
/// regardless of when the archive was actually built.
pub const ARCHIVE_EPOCH_SECONDS: i64 = 0;
/// Fixed permission bits for a regular file entry.
pub const FILE_MODE: u32 = 0o644;
/// Deflate compression level used for every entry. Fixed so that
/// identical input bytes always compress to identical output bytes.
const COMPRESSION_LEVEL: u32 = 6;

/// Errors raised while writing or reading a Gait archive.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArchiveError {
    /// `write_entry` was called twice with the same path.
    #[error("duplicate archive entry path: {0}")]
    DuplicatePath(String),
    /// A read was requested for a path not present in the archive.
    #[error("archive entry not declared: {0}")]
    UndeclaredEntry(String),
    /// The archive bytes ended before a declared structure finished.
    #[error("archive is truncated")]
    Truncated,
    /// The archive bytes failed a structural or magic-number check.
    #[error("archive is corrupt: {0}")]
    Corrupt(String),
}

/// A single entry queued for writing: a path and its raw, uncompressed
/// bytes.
struct PendingEntry {
    path: String,
    data: Vec<u8>,
}

/// Builds a deterministic archive from a set of named byte payloads.
#[derive(Default)]
pub struct ArchiveWriter {
    entries: Vec<PendingEntry>,
    seen_paths: BTreeSet<String>,
}

impl ArchiveWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an entry for writing.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::DuplicatePath`] if `path` was already
    /// written to this writer.
    pub fn write_entry(&mut self, path: &str, data: &[u8]) -> Result<(), ArchiveError> {
        if !self.seen_paths.insert(path.to_owned()) {
            return Err(ArchiveError::DuplicatePath(path.to_owned()));
        }
        self.entries.push(PendingEntry {
            path: path.to_owned(),
            data: data.to_vec(),
        });
        Ok(())
    }

    /// Returns `true` when no entries have been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finalizes the archive, returning its serialized bytes.
    ///
    /// Entries are written sorted by path regardless of insertion
    /// order, so the result depends only on the set of (path, bytes)
    /// pairs written, not on call order.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Corrupt`] if DEFLATE compression fails,
    /// which only happens on an underlying I/O failure writing to the
    /// in-memory buffer.
    pub fn finish(mut self) -> Result<Vec<u8>, ArchiveError> {
        self.entries.sort_by(|a, b| a.path.cmp(&b.path));

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.push(FORMAT_VERSION);
        write_u32(&mut out, u32_from_usize(self.entries.len())?);

        for entry in &self.entries {
            let compressed = deflate(&entry.data)?;
            let path_bytes = entry.path.as_bytes();
            write_u32(&mut out, u32_from_usize(path_bytes.len())?);
            out.extend_from_slice(path_bytes);
            write_u32(&mut out, FILE_MODE);
            write_i64(&mut out, ARCHIVE_EPOCH_SECONDS);
            write_u64(&mut out, u64_from_usize(entry.data.len()));
            write_u64(&mut out, u64_from_usize(compressed.len()));
            out.extend_from_slice(&compressed);
        }

        Ok(out)
    }
}

/// One decoded archive entry's metadata, without its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    /// Entry path, as declared by the writer.
    pub path: String,
    /// Fixed permission bits (always [`FILE_MODE`] today).
    pub mode: u32,
    /// Fixed synthetic epoch (always [`ARCHIVE_EPOCH_SECONDS`] today).
    pub epoch_seconds: i64,
    /// Uncompressed payload length in bytes.
    pub uncompressed_len: u64,
}

/// Reads and validates a previously written archive.
pub struct ArchiveReader {
    order: Vec<String>,
    payloads: std::collections::BTreeMap<String, Vec<u8>>,
    metas: std::collections::BTreeMap<String, EntryMeta>,
}

impl ArchiveReader {
    /// Parses `bytes` as a Gait archive, eagerly inflating every
    /// entry.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Corrupt`] on a bad magic number or
    /// unsupported version, and [`ArchiveError::Truncated`] if the
    /// byte stream ends before a declared entry finishes.
    pub fn open(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let mut cursor = Cursor::new(bytes);

        let magic = cursor.take(4)?;
        if magic != MAGIC.as_slice() {
            return Err(ArchiveError::Corrupt("bad magic number".to_owned()));
        }
        let version = cursor.take(1)?[0];
        if version != FORMAT_VERSION {
            return Err(ArchiveError::Corrupt(format!("unsupported archive version {version}")));
        }

        let entry_count = cursor.take_u32()?;
        let mut order = Vec::with_capacity(entry_count as usize);
        let mut payloads = std::collections::BTreeMap::new();
        let mut metas = std::collections::BTreeMap::new();

        for _ in 0..entry_count {
            let path_len = cursor.take_u32()?;
            let path_bytes = cursor.take(path_len as usize)?;
            let path = std::str::from_utf8(path_bytes)
                .map_err(|_| ArchiveError::Corrupt("entry path is not utf-8".to_owned()))?
                .to_owned();
            let mode = cursor.take_u32()?;
            let epoch_seconds = cursor.take_i64()?;
            let uncompressed_len = cursor.take_u64()?;
            let compressed_len = cursor.take_u64()?;
            let compressed = cursor.take(usize_from_u64(compressed_len)?)?;
            let data = inflate(compressed, uncompressed_len)?;

            if payloads.insert(path.clone(), data).is_some() {
                return Err(ArchiveError::Corrupt(format!("duplicate entry path in archive: {path}")));
            }
            metas.insert(
                path.clone(),
                EntryMeta {
                    path: path.clone(),
                    mode,
                    epoch_seconds,
                    uncompressed_len,
                },
            );
            order.push(path);
        }

        Ok(Self { order, payloads, metas })
    }

    /// Returns declared entry paths in archive (sorted) order.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.order
    }

    /// Returns an entry's metadata.
    #[must_use]
    pub fn meta(&self, path: &str) -> Option<&EntryMeta> {
        self.metas.get(path)
    }

    /// Reads a declared entry's decompressed bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::UndeclaredEntry`] if `path` was not
    /// present in the archive's entry list.
    pub fn read(&self, path: &str) -> Result<&[u8], ArchiveError> {
        self.payloads
            .get(path)
            .map(Vec::as_slice)
            .ok_or_else(|| ArchiveError::UndeclaredEntry(path.to_owned()))
    }
}

// ============================================================================
// SECTION: Byte Cursor Helpers
// ============================================================================

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ArchiveError> {
        let end = self.pos.checked_add(len).ok_or(ArchiveError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(ArchiveError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn take_u32(&mut self) -> Result<u32, ArchiveError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().map_err(|_| ArchiveError::Truncated)?))
    }

    fn take_u64(&mut self) -> Result<u64, ArchiveError> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().map_err(|_| ArchiveError::Truncated)?))
    }

    fn take_i64(&mut self) -> Result<i64, ArchiveError> {
        let bytes = self.take(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().map_err(|_| ArchiveError::Truncated)?))
    }
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn u32_from_usize(value: usize) -> Result<u32, ArchiveError> {
    u32::try_from(value).map_err(|_| ArchiveError::Corrupt("archive exceeds addressable entry count".to_owned()))
}

fn u64_from_usize(value: usize) -> u64 {
    value as u64
}

fn usize_from_u64(value: u64) -> Result<usize, ArchiveError> {
    usize::try_from(value).map_err(|_| ArchiveError::Corrupt("entry length exceeds addressable size".to_owned()))
}

// ============================================================================
// SECTION: Compression
// ============================================================================

fn deflate(data: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(COMPRESSION_LEVEL));
    encoder
        .write_all(data)
        .map_err(|err| ArchiveError::Corrupt(err.to_string()))?;
    encoder.finish().map_err(|err| ArchiveError::Corrupt(err.to_string()))
}

fn inflate(data: &[u8], expected_len: u64) -> Result<Vec<u8>, ArchiveError> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::with_capacity(usize_from_u64(expected_len)?);
    decoder
        .read_to_end(&mut out)
        .map_err(|err| ArchiveError::Corrupt(err.to_string()))?;
    if u64_from_usize(out.len()) != expected_len {
        return Err(ArchiveError::Corrupt("decompressed length mismatch".to_owned()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_multiple_entries() {
        let mut writer = ArchiveWriter::new();
        writer.write_entry("b.txt", b"second").unwrap();
        writer.write_entry("a.txt", b"first").unwrap();
        let bytes = writer.finish().unwrap();

        let reader = ArchiveReader::open(&bytes).unwrap();
        assert_eq!(reader.entries(), ["a.txt", "b.txt"]);
        assert_eq!(reader.read("a.txt").unwrap(), b"first");
        assert_eq!(reader.read("b.txt").unwrap(), b"second");
    }

    #[test]
    fn rejects_duplicate_write() {
        let mut writer = ArchiveWriter::new();
        writer.write_entry("a.txt", b"1").unwrap();
        let err = writer.write_entry("a.txt", b"2").unwrap_err();
        assert_eq!(err, ArchiveError::DuplicatePath("a.txt".to_owned()));
    }

    #[test]
    fn undeclared_read_is_rejected() {
        let mut writer = ArchiveWriter::new();
        writer.write_entry("a.txt", b"1").unwrap();
        let bytes = writer.finish().unwrap();
        let reader = ArchiveReader::open(&bytes).unwrap();
        assert!(reader.read("b.txt").is_err());
    }

    #[test]
    fn output_is_deterministic_regardless_of_insertion_order() {
        let mut first = ArchiveWriter::new();
        first.write_entry("z.json", b"{}").unwrap();
        first.write_entry("a.json", b"[]").unwrap();

        let mut second = ArchiveWriter::new();
        second.write_entry("a.json", b"[]").unwrap();
        second.write_entry("z.json", b"{}").unwrap();

        assert_eq!(first.finish().unwrap(), second.finish().unwrap());
    }

    #[test]
    fn corrupt_magic_is_rejected() {
        let mut writer = ArchiveWriter::new();
        writer.write_entry("a.txt", b"1").unwrap();
        let mut bytes = writer.finish().unwrap();
        bytes[0] = b'X';
        assert!(matches!(ArchiveReader::open(&bytes), Err(ArchiveError::Corrupt(_))));
    }

    #[test]
    fn truncated_archive_is_rejected() {
        let mut writer = ArchiveWriter::new();
        writer.write_entry("a.txt", b"1").unwrap();
        let bytes = writer.finish().unwrap();
        let truncated = &bytes[..bytes.len() - 2];
        assert!(matches!(ArchiveReader::open(truncated), Err(ArchiveError::Truncated)));
    }

    #[test]
    fn entries_carry_fixed_mode_and_epoch() {
        let mut writer = ArchiveWriter::new();
        writer.write_entry("a.txt", b"1").unwrap();
        let bytes = writer.finish().unwrap();
        let reader = ArchiveReader::open(&bytes).unwrap();
        let meta = reader.meta("a.txt").unwrap();
        assert_eq!(meta.mode, FILE_MODE);
        assert_eq!(meta.epoch_seconds, ARCHIVE_EPOCH_SECONDS);
    }
}
