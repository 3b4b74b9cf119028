#![forbid(unsafe_code)]
//! Core value types and the record codec for capsulefs.
//!
//! Everything persisted in a capsule image is built from three primitives:
//! big-endian fixed-width integers (`i32`/`i64`), single bytes, and
//! length-prefixed strings (an `i32` byte count followed by UTF-8 bytes,
//! never NUL-terminated). This crate owns those primitives plus the unit
//! newtypes that keep page indices, inode indices, and byte offsets from
//! being mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Encoded size of an inode record (segment + size + type + counter + last).
pub const INODE_RECORD_LEN: usize = 4 + 8 + 1 + 4 + 4;
/// Encoded size of an inode slot (used flag + record).
pub const INODE_SLOT_LEN: usize = 1 + INODE_RECORD_LEN;
/// Encoded size of a segment header (num_blocks + next + occupied).
pub const SEGMENT_HEADER_LEN: usize = 4 * 3;
/// Smallest page size a capsule image may be formatted with.
pub const MIN_PAGE_SIZE: u32 = 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
    #[error("invalid utf-8 in {field}")]
    InvalidUtf8 { field: &'static str },
}

// ── Unit newtypes ───────────────────────────────────────────────────────────

/// First page of a segment, or [`SegmentId::NONE`] for "no segment".
///
/// Stored on disk as a big-endian `i32`; −1 is the terminal marker in a
/// chain and the placeholder in unused inode slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub i32);

impl SegmentId {
    pub const NONE: Self = Self(-1);

    /// Wrap a page index; fails when the index does not fit the on-disk `i32`.
    pub fn from_page(page: u32) -> Result<Self, ParseError> {
        i32::try_from(page)
            .map(Self)
            .map_err(|_| ParseError::IntegerConversion { field: "segment" })
    }

    /// The page index, or `None` for the terminal/placeholder value.
    #[must_use]
    pub fn page(self) -> Option<u32> {
        u32::try_from(self.0).ok()
    }

    #[must_use]
    pub fn is_none(self) -> bool {
        self.0 < 0
    }
}

/// Index of an inode slot in the superblock.
///
/// Inode 0 is always the root directory. −1 is the synthetic parent pointer
/// stored in the root directory's `..` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InodeId(pub i32);

impl InodeId {
    pub const ROOT: Self = Self(0);
    /// Placeholder parent of the root directory.
    pub const NO_PARENT: Self = Self(-1);

    pub fn from_index(index: u32) -> Result<Self, ParseError> {
        i32::try_from(index)
            .map(Self)
            .map_err(|_| ParseError::IntegerConversion { field: "inode" })
    }

    /// The slot index, or `None` for the root placeholder.
    #[must_use]
    pub fn index(self) -> Option<u32> {
        u32::try_from(self.0).ok()
    }
}

/// Validated page size (at least [`MIN_PAGE_SIZE`] bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageSize(u32);

impl PageSize {
    pub fn new(value: u32) -> Result<Self, ParseError> {
        if value < MIN_PAGE_SIZE {
            return Err(ParseError::InvalidField {
                field: "page_size",
                reason: "must be at least 1024 bytes",
            });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Payload bytes one segment of `pages` pages can hold.
    #[must_use]
    pub fn payload_capacity(self, pages: u32) -> u64 {
        u64::from(pages) * u64::from(self.0) - SEGMENT_HEADER_LEN as u64
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Slice reads ─────────────────────────────────────────────────────────────

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_be_i32(data: &[u8], offset: usize) -> Result<i32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_be_i64(data: &[u8], offset: usize) -> Result<i64, ParseError> {
    let bytes = ensure_slice(data, offset, 8)?;
    Ok(i64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]))
}

#[inline]
pub fn read_u8(data: &[u8], offset: usize) -> Result<u8, ParseError> {
    let bytes = ensure_slice(data, offset, 1)?;
    Ok(bytes[0])
}

// ── Buffer writes ───────────────────────────────────────────────────────────

#[inline]
pub fn put_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

#[inline]
pub fn put_i64(buf: &mut Vec<u8>, value: i64) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Append a length-prefixed string (`i32` byte count, then the bytes).
pub fn put_str(buf: &mut Vec<u8>, value: &str) -> Result<(), ParseError> {
    let len = i32::try_from(value.len())
        .map_err(|_| ParseError::IntegerConversion { field: "string_len" })?;
    put_i32(buf, len);
    buf.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Encode a string on its own (the file content header is exactly this).
pub fn encode_str(value: &str) -> Result<Vec<u8>, ParseError> {
    let mut buf = Vec::with_capacity(4 + value.len());
    put_str(&mut buf, value)?;
    Ok(buf)
}

// ── Cursor over an in-memory record ─────────────────────────────────────────

/// Forward cursor over a decoded record's bytes.
///
/// Used to pick apart directory payloads and inode records once their chain
/// has been read into memory; the lazy on-disk counterpart lives in
/// `cfs-alloc`.
#[derive(Debug)]
pub struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn next_u8(&mut self) -> Result<u8, ParseError> {
        let value = read_u8(self.data, self.pos)?;
        self.pos += 1;
        Ok(value)
    }

    pub fn next_i32(&mut self) -> Result<i32, ParseError> {
        let value = read_be_i32(self.data, self.pos)?;
        self.pos += 4;
        Ok(value)
    }

    pub fn next_i64(&mut self) -> Result<i64, ParseError> {
        let value = read_be_i64(self.data, self.pos)?;
        self.pos += 8;
        Ok(value)
    }

    pub fn next_bytes(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let bytes = ensure_slice(self.data, self.pos, len)?;
        self.pos += len;
        Ok(bytes)
    }

    /// Read a length-prefixed string.
    pub fn next_string(&mut self) -> Result<String, ParseError> {
        let len = self.next_i32()?;
        let len = usize::try_from(len).map_err(|_| ParseError::InvalidField {
            field: "string_len",
            reason: "negative length",
        })?;
        let bytes = self.next_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ParseError::InvalidUtf8 { field: "string" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_integers() {
        let mut buf = Vec::new();
        put_i32(&mut buf, -1);
        put_i32(&mut buf, 0x0102_0304);
        put_i64(&mut buf, i64::MAX);

        assert_eq!(read_be_i32(&buf, 0).unwrap(), -1);
        assert_eq!(read_be_i32(&buf, 4).unwrap(), 0x0102_0304);
        assert_eq!(read_be_i64(&buf, 8).unwrap(), i64::MAX);
        // Big-endian on the wire.
        assert_eq!(&buf[..4], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&buf[4..8], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn strings_are_length_prefixed_without_nul() {
        let buf = encode_str("root").unwrap();
        assert_eq!(buf.len(), 4 + 4);
        assert_eq!(&buf[..4], &[0, 0, 0, 4]);
        assert_eq!(&buf[4..], b"root");

        let mut reader = SliceReader::new(&buf);
        assert_eq!(reader.next_string().unwrap(), "root");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn empty_string_round_trip() {
        let buf = encode_str("").unwrap();
        assert_eq!(buf, vec![0, 0, 0, 0]);
        assert_eq!(SliceReader::new(&buf).next_string().unwrap(), "");
    }

    #[test]
    fn slice_reader_rejects_truncated_input() {
        let buf = [0_u8, 0, 0];
        let mut reader = SliceReader::new(&buf);
        assert!(matches!(
            reader.next_i32(),
            Err(ParseError::InsufficientData { needed: 4, .. })
        ));
    }

    #[test]
    fn negative_string_length_is_rejected() {
        let mut buf = Vec::new();
        put_i32(&mut buf, -5);
        assert!(matches!(
            SliceReader::new(&buf).next_string(),
            Err(ParseError::InvalidField { .. })
        ));
    }

    #[test]
    fn segment_id_sentinels() {
        assert!(SegmentId::NONE.is_none());
        assert_eq!(SegmentId::NONE.page(), None);
        let seg = SegmentId::from_page(42).unwrap();
        assert_eq!(seg.page(), Some(42));
        assert!(!seg.is_none());
    }

    #[test]
    fn page_size_validation() {
        assert!(PageSize::new(1023).is_err());
        assert_eq!(PageSize::new(1024).unwrap().get(), 1024);
        // One 4096-byte page holds a header plus 4084 payload bytes.
        assert_eq!(PageSize::new(4096).unwrap().payload_capacity(1), 4084);
        assert_eq!(PageSize::new(4096).unwrap().payload_capacity(20), 81908);
    }

    #[test]
    fn record_sizes_match_the_disk_layout() {
        assert_eq!(INODE_RECORD_LEN, 21);
        assert_eq!(INODE_SLOT_LEN, 22);
        assert_eq!(SEGMENT_HEADER_LEN, 12);
    }
}
