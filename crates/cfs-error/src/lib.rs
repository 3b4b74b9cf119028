#![forbid(unsafe_code)]
//! Error types for capsulefs.
//!
//! One user-facing enum covers the whole engine. The kinds fall into five
//! groups, and every operation reports exactly one of them on failure:
//!
//! | Group | Variants | Recoverable? |
//! |-------|----------|--------------|
//! | Configuration | `Config` | no, construction aborts |
//! | Allocation | `InsufficientCapacity`, `OutOfPages` | yes, nothing was allocated |
//! | Superblock | `InvalidInodeIndex`, `AllInodesTaken`, `DoubleFree` | `DoubleFree` signals a caller bug |
//! | Path | `PathNotFound`, `FileNotFound`, `InvalidName`, `DuplicateName`, `NotADirectory`, `NotAFile`, `CyclicLink` | yes |
//! | I/O / format | `Io`, `Parse`, `EndOfStream`, `Unsupported` | surfaced as-is |
//!
//! `cfs-error` stays independent of `cfs-types` so the two leaf crates never
//! cycle; the `ParseError` from `cfs-types` is carried here as the stringly
//! `Parse` variant, converted at the crate boundaries that decode records.
//!
//! Nothing is retried internally and no failure poisons the engine: a failed
//! operation leaves the store usable for subsequent calls. There is also no
//! transactional guarantee: an `Io` failure mid-write can leave a directory
//! or inode record partially updated.

use thiserror::Error;

/// Unified error type for all capsulefs operations.
#[derive(Debug, Error)]
pub enum CfsError {
    /// Backing-storage I/O failure (wraps `std::io::Error`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid construction parameters or an unusable backing file.
    #[error("configuration error: {0}")]
    Config(String),

    /// The page region does not have `requested` free pages in total.
    ///
    /// The free-space index is untouched when this is returned.
    #[error("insufficient capacity: requested {requested} pages, {free} free")]
    InsufficientCapacity { requested: u32, free: u64 },

    /// The free-space index ran dry mid-chain.
    ///
    /// Cannot happen while the capacity pre-check holds; indicates index
    /// corruption if it ever surfaces.
    #[error("out of pages")]
    OutOfPages,

    /// Inode slot index outside `[0, count)`.
    #[error("invalid inode index {index} (table holds {count})")]
    InvalidInodeIndex { index: u32, count: u32 },

    /// Every inode slot is occupied.
    #[error("all inodes are taken")]
    AllInodesTaken,

    /// Release of an inode slot that is already free. A caller bug.
    #[error("inode {index} was already released")]
    DoubleFree { index: u32 },

    /// An intermediate path step does not exist or is not a directory entry.
    #[error("no such path: {0}")]
    PathNotFound(String),

    /// The final path step does not name an entry.
    #[error("no such file: {0}")]
    FileNotFound(String),

    /// Empty, `.`, or `..` used as an entry name.
    #[error("illegal file name: {0:?}")]
    InvalidName(String),

    /// The directory already holds an entry with this name.
    #[error("file already exists: {0}")]
    DuplicateName(String),

    /// A directory operation was applied to a leaf file.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A file operation was applied to a directory.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// Hard-linking a directory into its own subtree.
    #[error("cyclic link: {from} into {target}")]
    CyclicLink { from: String, target: String },

    /// A stream read past the end of the segment chain.
    #[error("end of stream")]
    EndOfStream,

    /// The operation is not available on this engine variant.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// An on-disk record failed to decode.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Result alias using `CfsError`.
pub type Result<T> = std::result::Result<T, CfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formatting() {
        let err = CfsError::InsufficientCapacity {
            requested: 300,
            free: 12,
        };
        assert_eq!(
            err.to_string(),
            "insufficient capacity: requested 300 pages, 12 free"
        );

        assert_eq!(
            CfsError::DoubleFree { index: 7 }.to_string(),
            "inode 7 was already released"
        );
        assert_eq!(
            CfsError::InvalidName(String::from("..")).to_string(),
            "illegal file name: \"..\""
        );
        assert_eq!(CfsError::EndOfStream.to_string(), "end of stream");
    }

    #[test]
    fn io_errors_convert_via_from() {
        let io = std::io::Error::other("disk on fire");
        let err = CfsError::from(io);
        assert!(matches!(err, CfsError::Io(_)));
        assert!(err.to_string().contains("disk on fire"));
    }
}
