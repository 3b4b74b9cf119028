#![forbid(unsafe_code)]
//! Persisted record formats of a capsule image.
//!
//! Four structures live on disk, all big-endian and fixed-layout:
//!
//! ```text
//! inode slot (22 bytes)          segment header (12 bytes)
//! ┌──────────┐                   ┌────────────┐
//! │ used: u8 │                   │ num_blocks │
//! │ segment  │                   │ next       │  (-1 = terminal)
//! │ size     │                   │ occupied   │
//! │ type     │                   └────────────┘
//! │ counter  │
//! │ last_seg │                   directory payload
//! └──────────┘                   name · entry_count · parent · entries
//! ```
//!
//! Leaf files store a one-field header (the file's own name, length-prefixed)
//! before their raw content; every reader of a file chain skips it first.

use cfs_types::{
    put_i32, put_i64, put_str, InodeId, ParseError, SegmentId, SliceReader, INODE_RECORD_LEN,
    SEGMENT_HEADER_LEN,
};
use serde::{Deserialize, Serialize};

// ── File type ───────────────────────────────────────────────────────────────

/// The two kinds of inode. Closed set; every consumer matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Directory,
    File,
}

impl FileType {
    pub fn from_byte(value: u8) -> Result<Self, ParseError> {
        match value {
            0 => Ok(Self::Directory),
            1 => Ok(Self::File),
            _ => Err(ParseError::InvalidField {
                field: "file_type",
                reason: "only two file types exist",
            }),
        }
    }

    #[must_use]
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Directory => 0,
            Self::File => 1,
        }
    }
}

// ── Inode ───────────────────────────────────────────────────────────────────

/// Fixed-size inode record (21 bytes on disk, after the used flag).
///
/// `last_segment` caches the tail of the content chain so appends need not
/// walk it; it always lies on the chain starting at `segment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub segment: SegmentId,
    pub size: u64,
    pub file_type: FileType,
    pub counter: i32,
    pub last_segment: SegmentId,
}

impl Inode {
    pub const ENCODED_LEN: usize = INODE_RECORD_LEN;

    /// Fresh inode whose chain starts (and so far ends) at `segment`.
    #[must_use]
    pub fn new(segment: SegmentId, size: u64, file_type: FileType, counter: i32) -> Self {
        Self {
            segment,
            size,
            file_type,
            counter,
            last_segment: segment,
        }
    }

    /// Placeholder record written into unused slots at format time.
    ///
    /// The field values carry no meaning beyond being recognizably inert:
    /// no segment, counter −1, size = the page size.
    #[must_use]
    pub fn unused(page_size: u32) -> Self {
        Self {
            segment: SegmentId::NONE,
            size: u64::from(page_size),
            file_type: FileType::File,
            counter: -1,
            last_segment: SegmentId::NONE,
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        put_i32(&mut buf, self.segment.0);
        put_i64(&mut buf, self.size as i64);
        buf.push(self.file_type.as_byte());
        put_i32(&mut buf, self.counter);
        put_i32(&mut buf, self.last_segment.0);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut reader = SliceReader::new(bytes);
        let segment = SegmentId(reader.next_i32()?);
        let size = reader.next_i64()?;
        let file_type = FileType::from_byte(reader.next_u8()?)?;
        let counter = reader.next_i32()?;
        let last_segment = SegmentId(reader.next_i32()?);
        Ok(Self {
            segment,
            size: size as u64,
            file_type,
            counter,
            last_segment,
        })
    }
}

// ── Segment header ──────────────────────────────────────────────────────────

/// Header at the first page of every allocated segment (12 bytes).
///
/// Invariant: `occupied <= num_blocks * page_size - 12`; the allocator is
/// the only writer and maintains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Contiguous pages in this segment.
    pub num_blocks: u32,
    /// First page of the next segment in the chain, −1 when terminal.
    pub next: SegmentId,
    /// Payload bytes used in this segment.
    pub occupied: u32,
}

impl SegmentMeta {
    pub const ENCODED_LEN: usize = SEGMENT_HEADER_LEN;

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        put_i32(&mut buf, self.num_blocks as i32);
        put_i32(&mut buf, self.next.0);
        put_i32(&mut buf, self.occupied as i32);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut reader = SliceReader::new(bytes);
        let num_blocks = reader.next_i32()?;
        let next = SegmentId(reader.next_i32()?);
        let occupied = reader.next_i32()?;
        let num_blocks = u32::try_from(num_blocks)
            .map_err(|_| ParseError::IntegerConversion { field: "num_blocks" })?;
        let occupied = u32::try_from(occupied)
            .map_err(|_| ParseError::IntegerConversion { field: "occupied" })?;
        Ok(Self {
            num_blocks,
            next,
            occupied,
        })
    }

    /// Whether the chain continues past this segment.
    #[must_use]
    pub fn is_continued(&self) -> bool {
        !self.next.is_none()
    }

    /// Payload bytes this segment can hold in total.
    #[must_use]
    pub fn payload_capacity(&self, page_size: u32) -> u64 {
        u64::from(self.num_blocks) * u64::from(page_size) - Self::ENCODED_LEN as u64
    }
}

// ── Directory entries ───────────────────────────────────────────────────────

/// A directory entry: entry name → inode.
///
/// Identity within a directory is by name only; two entries in one directory
/// never share a name, while two names may share an inode (hard links).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DEntry {
    pub name: String,
    pub inode: InodeId,
}

impl DEntry {
    #[must_use]
    pub fn new(name: impl Into<String>, inode: InodeId) -> Self {
        Self {
            name: name.into(),
            inode,
        }
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), ParseError> {
        put_str(buf, &self.name)?;
        put_i32(buf, self.inode.0);
        Ok(())
    }

    pub fn decode_from(reader: &mut SliceReader<'_>) -> Result<Self, ParseError> {
        let name = reader.next_string()?;
        let inode = InodeId(reader.next_i32()?);
        Ok(Self { name, inode })
    }
}

/// In-memory view of a directory inode's content.
///
/// Rebuilt from storage on every read and flushed back wholesale on every
/// mutation; no partial updates exist. The `..` parent pointer is stored
/// separately from the entry list, so listings never include it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub name: String,
    pub parent: DEntry,
    entries: Vec<DEntry>,
}

impl Directory {
    #[must_use]
    pub fn new(name: impl Into<String>, parent: DEntry, entries: Vec<DEntry>) -> Self {
        Self {
            name: name.into(),
            parent,
            entries,
        }
    }

    /// The root directory: empty name, parent placeholder −1.
    #[must_use]
    pub fn root() -> Self {
        Self::new("", DEntry::new("", InodeId::NO_PARENT), Vec::new())
    }

    /// Fresh empty directory under `parent_inode`.
    #[must_use]
    pub fn empty(name: impl Into<String>, parent_inode: InodeId) -> Self {
        Self::new(name, DEntry::new("..", parent_inode), Vec::new())
    }

    #[must_use]
    pub fn entries(&self) -> &[DEntry] {
        &self.entries
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&DEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Add an entry; `false` when the name is already present.
    pub fn add_entry(&mut self, entry: DEntry) -> bool {
        if self.find(&entry.name).is_some() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Remove the entry with `name`, returning it if present.
    pub fn remove_entry(&mut self, name: &str) -> Option<DEntry> {
        let index = self.entries.iter().position(|entry| entry.name == name)?;
        Some(self.entries.remove(index))
    }

    pub fn encode(&self) -> Result<Vec<u8>, ParseError> {
        let mut buf = Vec::new();
        put_str(&mut buf, &self.name)?;
        let count = i32::try_from(self.entries.len())
            .map_err(|_| ParseError::IntegerConversion { field: "entry_count" })?;
        put_i32(&mut buf, count);
        put_i32(&mut buf, self.parent.inode.0);
        for entry in &self.entries {
            entry.encode_into(&mut buf)?;
        }
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut reader = SliceReader::new(bytes);
        let name = reader.next_string()?;
        let count = reader.next_i32()?;
        let parent_inode = InodeId(reader.next_i32()?);
        let count = usize::try_from(count).map_err(|_| ParseError::InvalidField {
            field: "entry_count",
            reason: "negative entry count",
        })?;
        let mut entries = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            entries.push(DEntry::decode_from(&mut reader)?);
        }
        Ok(Self {
            name,
            parent: DEntry::new("..", parent_inode),
            entries,
        })
    }
}

/// Content header written at the start of every leaf file's chain.
///
/// Holds the file's stored name; readers skip it before the raw content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub name: String,
}

impl FileHeader {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ParseError> {
        cfs_types::encode_str(&self.name)
    }
}

/// One row of a directory listing, as handed to external callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub name: String,
    pub file_type: FileType,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_record_is_21_bytes() {
        let inode = Inode::new(SegmentId(7), 4096, FileType::Directory, 1);
        assert_eq!(inode.encode().len(), Inode::ENCODED_LEN);
        assert_eq!(Inode::ENCODED_LEN, 21);
    }

    #[test]
    fn inode_round_trip() {
        let inode = Inode {
            segment: SegmentId(13),
            size: 113,
            file_type: FileType::File,
            counter: 3,
            last_segment: SegmentId(333),
        };
        assert_eq!(Inode::decode(&inode.encode()).unwrap(), inode);
    }

    #[test]
    fn unused_inode_matches_the_format_placeholder() {
        let placeholder = Inode::unused(4096).encode();
        // segment −1, size = page size, type file, counter −1, last −1.
        assert_eq!(&placeholder[..4], &[0xFF; 4]);
        assert_eq!(&placeholder[4..12], &4096_i64.to_be_bytes());
        assert_eq!(placeholder[12], 1);
        assert_eq!(&placeholder[13..17], &[0xFF; 4]);
        assert_eq!(&placeholder[17..21], &[0xFF; 4]);
    }

    #[test]
    fn segment_meta_round_trip() {
        let meta = SegmentMeta {
            num_blocks: 20,
            next: SegmentId::NONE,
            occupied: 8,
        };
        let bytes = meta.encode();
        assert_eq!(bytes.len(), 12);
        assert_eq!(SegmentMeta::decode(&bytes).unwrap(), meta);
        assert!(!meta.is_continued());
        assert_eq!(meta.payload_capacity(4096), 20 * 4096 - 12);
    }

    #[test]
    fn file_type_closed_set() {
        assert_eq!(FileType::from_byte(0).unwrap(), FileType::Directory);
        assert_eq!(FileType::from_byte(1).unwrap(), FileType::File);
        assert!(FileType::from_byte(2).is_err());
        assert_eq!(FileType::Directory.as_byte(), 0);
        assert_eq!(FileType::File.as_byte(), 1);
    }

    #[test]
    fn directory_round_trip() {
        let mut dir = Directory::empty("music", InodeId(4));
        assert!(dir.add_entry(DEntry::new("a.flac", InodeId(7))));
        assert!(dir.add_entry(DEntry::new("b.flac", InodeId(9))));

        let decoded = Directory::decode(&dir.encode().unwrap()).unwrap();
        assert_eq!(decoded.name, "music");
        assert_eq!(decoded.parent.inode, InodeId(4));
        assert_eq!(decoded.entries().len(), 2);
        assert_eq!(decoded.find("b.flac").unwrap().inode, InodeId(9));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut dir = Directory::root();
        assert!(dir.add_entry(DEntry::new("x", InodeId(1))));
        // Same name, different inode: still a duplicate.
        assert!(!dir.add_entry(DEntry::new("x", InodeId(2))));
        assert_eq!(dir.entries().len(), 1);
    }

    #[test]
    fn remove_entry_by_name() {
        let mut dir = Directory::root();
        dir.add_entry(DEntry::new("x", InodeId(1)));
        assert_eq!(dir.remove_entry("x").unwrap().inode, InodeId(1));
        assert!(dir.remove_entry("x").is_none());
    }

    #[test]
    fn root_directory_shape() {
        let root = Directory::root();
        assert_eq!(root.name, "");
        assert_eq!(root.parent.inode, InodeId::NO_PARENT);
        let bytes = root.encode().unwrap();
        // name "" (4) + count (4) + parent (4).
        assert_eq!(bytes.len(), 12);
    }

    #[test]
    fn file_header_is_just_the_name() {
        let header = FileHeader::new("f").encode().unwrap();
        assert_eq!(header, vec![0, 0, 0, 1, b'f']);
    }
}
