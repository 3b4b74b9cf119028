#![forbid(unsafe_code)]
//! The capsule filesystem engine.
//!
//! A *capsule* is one host file holding a whole file tree: a superblock with
//! a fixed inode table, then a page region managed by the segment allocator.
//! [`FileStore`] composes the two into path-level operations (create, write,
//! link, move, copy, remove, list, size queries); inode 0 is always the root
//! directory.
//!
//! Every operation re-resolves its paths from the root; there is no cached
//! working directory and no long-lived view of any directory. Directory
//! records are rewritten wholesale on every mutation: the old chain is
//! released and a fresh one sized to the record is allocated, so capacity
//! accounting is observable per mutation.
//!
//! `FileStore` itself only guards its in-memory indexes. Callers running
//! structurally conflicting mutations concurrently (say two creates under
//! one parent) get last-write-wins results. [`SyncFileStore`]
//! wraps every operation in a whole-engine reader/writer lock for callers
//! who want the engine to do the coordination.

pub mod path;

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;

use cfs_alloc::{SegmentAllocator, SegmentIo, SegmentStream};
use cfs_block::{ByteDevice, DevicePool, FileByteDevice, PoolGuard};
use cfs_error::{CfsError, Result};
use cfs_ondisk::{DEntry, Directory, FileHeader, FileType, Inode};
use cfs_super::InodeTable;
use cfs_types::{InodeId, PageSize, ParseError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

pub use cfs_error::{CfsError as StoreError, Result as StoreResult};
pub use cfs_ondisk::{EntryInfo, FileType as EntryKind};

const COPY_CHUNK: usize = 1024;

fn parse(err: ParseError) -> CfsError {
    CfsError::Parse(err.to_string())
}

// ── Configuration ───────────────────────────────────────────────────────────

/// Validated parameters for creating a capsule.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub size: u64,
    pub page_size: PageSize,
    pub inode_count: u32,
    pub concurrency_level: usize,
}

impl StoreConfig {
    pub fn new(size: u64, page_size: u32, inode_count: u32, concurrency_level: usize) -> Result<Self> {
        let page_size = PageSize::new(page_size)
            .map_err(|err| CfsError::Config(err.to_string()))?;
        if inode_count <= 1 {
            return Err(CfsError::Config(format!(
                "inode count must exceed 1, got {inode_count}"
            )));
        }
        if size <= u64::from(page_size.get()) * u64::from(inode_count) {
            return Err(CfsError::Config(format!(
                "capsule size {size} too small for {inode_count} inodes of page size {page_size}"
            )));
        }
        if concurrency_level == 0 {
            return Err(CfsError::Config(String::from(
                "concurrency level must be at least 1",
            )));
        }
        Ok(Self {
            size,
            page_size,
            inode_count,
            concurrency_level,
        })
    }
}

// ── Engine ──────────────────────────────────────────────────────────────────

/// In-memory indexes over the on-disk state. One lock guards both so an
/// allocation and its inode update cannot interleave with a release.
struct StoreIndex {
    table: InodeTable,
    alloc: SegmentAllocator,
}

/// The capsule filesystem facade.
///
/// Top-level operations draw a storage handle from a bounded pool sized by
/// the configured concurrency level; the free-space and free-slot indexes
/// sit behind one mutex.
pub struct FileStore {
    pool: DevicePool,
    index: Mutex<StoreIndex>,
    io: SegmentIo,
    page_size: u32,
}

impl FileStore {
    /// Create and format a fresh capsule at `backing`.
    pub fn create(backing: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let backing = backing.as_ref();
        let device = FileByteDevice::create(backing, config.size)?;
        let table = InodeTable::format(&device, config.inode_count, config.page_size)?;
        let store = Self::assemble(backing, table, config.size, config.concurrency_level)?;

        // Inode 0 is the root directory from the first moment on.
        let guard = store.pool.acquire();
        store.new_directory(&guard, &Directory::root())?;
        drop(guard);

        info!(
            path = %backing.display(),
            size = config.size,
            page_size = config.page_size.get(),
            inodes = config.inode_count,
            "created capsule"
        );
        Ok(store)
    }

    /// Open an already formatted capsule.
    ///
    /// The free-space index is rebuilt as fully free: segment headers record
    /// chain shapes but not which pages are taken, so a reopened capsule
    /// must not be mixed with content written in an earlier session's
    /// allocations. See the design notes in the repository root.
    pub fn open(backing: impl AsRef<Path>, concurrency_level: usize) -> Result<Self> {
        let backing = backing.as_ref();
        if concurrency_level == 0 {
            return Err(CfsError::Config(String::from(
                "concurrency level must be at least 1",
            )));
        }
        let device = FileByteDevice::open(backing)?;
        let table = InodeTable::load(&device)?;
        let size = device.len_bytes();
        let store = Self::assemble(backing, table, size, concurrency_level)?;
        info!(path = %backing.display(), size, "opened capsule");
        Ok(store)
    }

    fn assemble(
        backing: &Path,
        table: InodeTable,
        size: u64,
        concurrency_level: usize,
    ) -> Result<Self> {
        let base = table.page_region_offset();
        let page_size = table.page_size();
        if size <= base {
            return Err(CfsError::Config(format!(
                "capsule size {size} leaves no room for a page region"
            )));
        }
        let pages = ((size - base) / u64::from(page_size.get())) as u32;
        let alloc = SegmentAllocator::new(base, page_size, pages)?;
        let io = alloc.io();
        let pool = DevicePool::open(backing, concurrency_level)?;
        Ok(Self {
            pool,
            index: Mutex::new(StoreIndex { table, alloc }),
            io,
            page_size: page_size.get(),
        })
    }

    // ── Capacity queries ────────────────────────────────────────────────

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub fn capacity_pages(&self) -> u32 {
        self.index.lock().alloc.capacity_pages()
    }

    #[must_use]
    pub fn free_pages(&self) -> u64 {
        self.index.lock().alloc.free_pages()
    }

    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        self.free_pages() * u64::from(self.page_size)
    }

    #[must_use]
    pub fn inode_count(&self) -> u32 {
        self.index.lock().table.inode_count()
    }

    #[must_use]
    pub fn free_inodes(&self) -> usize {
        self.index.lock().table.free_count()
    }

    // ── Tree operations ─────────────────────────────────────────────────

    /// Create an empty directory `name` under `parent_path`.
    pub fn create_directory(&self, parent_path: &str, name: &str) -> Result<()> {
        let guard = self.pool.acquire();
        let name = path::clean_name(name);
        check_name(&name)?;
        let parent = self.resolve(&guard, parent_path)?;
        let inode = self.new_directory(&guard, &Directory::empty(name.as_str(), parent))?;
        self.add_entry(&guard, parent, DEntry::new(name, inode))?;
        debug!(parent = parent_path, inode = inode.0, "created directory");
        Ok(())
    }

    /// Create a file `name` under `parent_path`, pre-sizing its chain for
    /// `size_hint` bytes of content.
    pub fn create_file(&self, parent_path: &str, name: &str, size_hint: u64) -> Result<()> {
        let guard = self.pool.acquire();
        self.create_file_with(&guard, parent_path, name, size_hint)?;
        Ok(())
    }

    /// Append `data` to the file at `path`.
    pub fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let guard = self.pool.acquire();
        let inode = self.resolve(&guard, path)?;
        let record = self.read_record(&guard, inode)?;
        if record.file_type != FileType::File {
            return Err(CfsError::NotAFile(path.to_string()));
        }
        self.write_by_inode(&guard, inode, data)
    }

    /// Open a lazy read stream over the file at `path`.
    ///
    /// The first field in the stream is the file's stored name; content
    /// follows. The stream owns a pool handle until dropped and sees
    /// concurrent writes to the same chain, so it is only safe while no
    /// writer touches that file.
    pub fn read_stream(&self, path: &str) -> Result<SegmentStream<PoolGuard>> {
        let guard = self.pool.acquire();
        let inode = self.resolve(&guard, path)?;
        let record = self.read_record(&guard, inode)?;
        if record.file_type != FileType::File {
            return Err(CfsError::NotAFile(path.to_string()));
        }
        SegmentStream::open(self.io, guard, record.segment)
    }

    /// Append everything `reader` yields to the file at `path`. Returns the
    /// byte count copied in.
    pub fn write_from<R: Read>(&self, path: &str, reader: &mut R) -> Result<u64> {
        let guard = self.pool.acquire();
        let inode = self.resolve(&guard, path)?;
        let record = self.read_record(&guard, inode)?;
        if record.file_type == FileType::Directory {
            return Err(CfsError::NotAFile(path.to_string()));
        }
        let mut buf = [0_u8; COPY_CHUNK];
        let mut total = 0_u64;
        loop {
            let read = reader.read(&mut buf)?;
            if read == 0 {
                break;
            }
            self.write_by_inode(&guard, inode, &buf[..read])?;
            total += read as u64;
        }
        Ok(total)
    }

    /// Copy the content of the file at `path` (header skipped) into `writer`.
    /// Returns the byte count copied out.
    pub fn copy_to<W: Write>(&self, path: &str, writer: &mut W) -> Result<u64> {
        let guard = self.pool.acquire();
        let inode = self.resolve(&guard, path)?;
        let record = self.read_record(&guard, inode)?;
        if record.file_type == FileType::Directory {
            return Err(CfsError::NotAFile(path.to_string()));
        }
        let mut stream = SegmentStream::open(self.io, &guard, record.segment)?;
        stream.next_string()?;

        let mut buf = [0_u8; COPY_CHUNK];
        let mut total = 0_u64;
        while stream.has_next() {
            let read = stream.read_into(&mut buf)?;
            writer.write_all(&buf[..read])?;
            total += read as u64;
        }
        Ok(total)
    }

    /// Add a hard link named `link_name` in `target_dir` to whatever
    /// `source_path` resolves to, bumping its reference counter.
    ///
    /// Linking a directory into its own subtree is refused; a file may be
    /// linked anywhere, even under a path the ancestry check matches.
    pub fn create_hard_link(&self, source_path: &str, target_dir: &str, link_name: &str) -> Result<()> {
        let guard = self.pool.acquire();
        self.link_with(&guard, source_path, target_dir, link_name)
    }

    /// Move `parent_path/name` into `target_dir`, keeping the name.
    ///
    /// Implemented as link-then-unlink, not a rename. A failure in the link
    /// step leaves the original untouched; a failure between the two steps
    /// leaves both entries present.
    pub fn move_entry(&self, parent_path: &str, target_dir: &str, name: &str) -> Result<()> {
        let guard = self.pool.acquire();
        self.link_with(&guard, &path::join(parent_path, name), target_dir, name)?;
        let parent = self.resolve(&guard, parent_path)?;
        self.remove_entry(&guard, parent, name)
    }

    /// Copy the file at `source_path` into `target_dir` as `new_name`,
    /// duplicating its content under a fresh inode.
    pub fn copy_file(&self, source_path: &str, target_dir: &str, new_name: &str) -> Result<()> {
        let guard = self.pool.acquire();
        let name = path::clean_name(new_name);
        check_name(&name)?;
        let source = self.resolve(&guard, source_path)?;
        let record = self.read_record(&guard, source)?;
        if record.file_type != FileType::File {
            return Err(CfsError::NotAFile(source_path.to_string()));
        }

        self.create_file_with(&guard, target_dir, &name, record.size)?;
        let target = self.resolve(&guard, &path::join(target_dir, &name))?;

        let mut stream = SegmentStream::open(self.io, &guard, record.segment)?;
        stream.next_string()?;
        let mut buf = [0_u8; COPY_CHUNK];
        while stream.has_next() {
            let read = stream.read_into(&mut buf)?;
            self.write_by_inode(&guard, target, &buf[..read])?;
        }
        Ok(())
    }

    /// Remove the entry at `path`, freeing its inode and pages once the
    /// last link to it is gone. Directories are emptied first.
    pub fn remove(&self, path: &str) -> Result<()> {
        let guard = self.pool.acquire();
        let name = path::file_name(path);
        let parent = self.resolve(&guard, &path::parent(path))?;
        self.remove_entry(&guard, parent, &name)
    }

    /// Entry names in the directory at `path`, in stored order.
    pub fn list_names(&self, path: &str) -> Result<Vec<String>> {
        let guard = self.pool.acquire();
        let inode = self.resolve(&guard, path)?;
        let dir = self.read_directory(&guard, inode)?;
        Ok(dir.entries().iter().map(|e| e.name.clone()).collect())
    }

    /// Entries of the directory at `path` with types, and sizes when
    /// `with_size` is set (sizes walk each entry's subtree).
    pub fn list(&self, path: &str, with_size: bool) -> Result<Vec<EntryInfo>> {
        let guard = self.pool.acquire();
        let inode = self.resolve(&guard, path)?;
        let dir = self.read_directory(&guard, inode)?;
        let mut out = Vec::with_capacity(dir.entries().len());
        for entry in dir.entries() {
            let record = self.read_record(&guard, entry.inode)?;
            let size = if with_size {
                self.size_of_inode(&guard, entry.inode)?
            } else {
                0
            };
            out.push(EntryInfo {
                name: entry.name.clone(),
                file_type: record.file_type,
                size,
            });
        }
        Ok(out)
    }

    /// Logical size of `path`: a file's stored size, or the sum over all
    /// distinct files reachable from a directory. Hard-linked files count
    /// once no matter how many links reach them.
    pub fn tree_size(&self, path: &str) -> Result<u64> {
        let guard = self.pool.acquire();
        let inode = self.resolve(&guard, path)?;
        self.size_of_inode(&guard, inode)
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn read_record<D: ByteDevice>(&self, device: &D, inode: InodeId) -> Result<Inode> {
        self.index.lock().table.read(device, inode)
    }

    fn resolve<D: ByteDevice>(&self, device: &D, raw: &str) -> Result<InodeId> {
        let steps = path::to_steps(raw);
        let mut current = InodeId::ROOT;
        let mut dir = self.read_directory(device, current)?;

        for step in &steps[..steps.len() - 1] {
            let Some(entry) = dir.find(step) else {
                return Err(CfsError::PathNotFound(raw.to_string()));
            };
            current = entry.inode;
            dir = self.read_directory(device, current)?;
        }

        let last = &steps[steps.len() - 1];
        if last.is_empty() {
            return Ok(current);
        }
        dir.find(last)
            .map(|entry| entry.inode)
            .ok_or_else(|| CfsError::FileNotFound(raw.to_string()))
    }

    fn read_directory<D: ByteDevice>(&self, device: &D, inode: InodeId) -> Result<Directory> {
        let record = self.read_record(device, inode)?;
        if record.file_type != FileType::Directory {
            return Err(CfsError::NotADirectory(format!("inode {inode}")));
        }
        let bytes = self.io.read_chain(device, record.segment)?;
        Directory::decode(&bytes).map_err(parse)
    }

    /// Append `data` to the chain of `inode`, advancing its append point and
    /// logical size by the bytes actually written.
    fn write_by_inode<D: ByteDevice>(&self, device: &D, inode: InodeId, data: &[u8]) -> Result<()> {
        let mut index = self.index.lock();
        let mut record = index.table.read(device, inode)?;
        let last = index.alloc.write_chain(device, record.last_segment, data)?;
        record.last_segment = last;
        record.size += data.len() as u64;
        index.table.update(device, inode, &record)
    }

    /// Swap `inode`'s chain for a fresh one sized to its current content and
    /// reset its logical size; the caller rewrites the payload right after.
    fn reallocate<D: ByteDevice>(&self, device: &D, inode: InodeId) -> Result<()> {
        let mut index = self.index.lock();
        let mut record = index.table.read(device, inode)?;
        index.alloc.release(device, record.segment)?;
        let segment = index.alloc.allocate_for_bytes(device, record.size)?;
        record.segment = segment;
        record.last_segment = segment;
        record.size = 0;
        index.table.update(device, inode, &record)
    }

    fn new_directory<D: ByteDevice>(&self, device: &D, dir: &Directory) -> Result<InodeId> {
        let payload = dir.encode().map_err(parse)?;
        let inode = {
            let mut index = self.index.lock();
            let segment = index.alloc.allocate(device, 1)?;
            index
                .table
                .acquire(device, &Inode::new(segment, 0, FileType::Directory, 1))?
        };
        self.write_by_inode(device, inode, &payload)?;
        Ok(inode)
    }

    fn new_file<D: ByteDevice>(&self, device: &D, size_hint: u64, name: &str) -> Result<InodeId> {
        let header = FileHeader::new(name).encode().map_err(parse)?;
        let inode = {
            let mut index = self.index.lock();
            let segment = index.alloc.allocate_for_bytes(device, size_hint)?;
            index
                .table
                .acquire(device, &Inode::new(segment, 0, FileType::File, 1))?
        };
        self.write_by_inode(device, inode, &header)?;
        Ok(inode)
    }

    fn create_file_with<D: ByteDevice>(
        &self,
        device: &D,
        parent_path: &str,
        name: &str,
        size_hint: u64,
    ) -> Result<()> {
        let name = path::clean_name(name);
        check_name(&name)?;
        let inode = self.new_file(device, size_hint, &name)?;
        let parent = self.resolve(device, parent_path)?;
        self.add_entry(device, parent, DEntry::new(name, inode))?;
        debug!(parent = parent_path, inode = inode.0, "created file");
        Ok(())
    }

    fn link_with<D: ByteDevice>(
        &self,
        device: &D,
        source_path: &str,
        target_dir: &str,
        link_name: &str,
    ) -> Result<()> {
        let name = path::clean_name(link_name);
        check_name(&name)?;

        if path::is_ancestor(source_path, target_dir) {
            let source = self.resolve(device, source_path)?;
            let record = self.read_record(device, source)?;
            if record.file_type == FileType::Directory {
                return Err(CfsError::CyclicLink {
                    from: source_path.to_string(),
                    target: target_dir.to_string(),
                });
            }
        }

        let source = self.resolve(device, source_path)?;
        let target = self.resolve(device, target_dir)?;
        self.add_entry(device, target, DEntry::new(name, source))?;

        let mut record = self.read_record(device, source)?;
        record.counter += 1;
        self.index.lock().table.update(device, source, &record)
    }

    /// Insert `entry` into `parent`'s directory and rewrite it wholesale.
    fn add_entry<D: ByteDevice>(&self, device: &D, parent: InodeId, entry: DEntry) -> Result<()> {
        let mut dir = self.read_directory(device, parent)?;
        let name = entry.name.clone();
        if !dir.add_entry(entry) {
            return Err(CfsError::DuplicateName(name));
        }
        self.reallocate(device, parent)?;
        let payload = dir.encode().map_err(parse)?;
        self.write_by_inode(device, parent, &payload)
    }

    /// Unlink `name` from `parent`, freeing inodes and chains as reference
    /// counters reach zero. Emptying a dying directory frees its children
    /// before the directory's own chain and slot.
    fn remove_entry<D: ByteDevice>(&self, device: &D, parent: InodeId, name: &str) -> Result<()> {
        enum Task {
            Unlink { parent: InodeId, name: String },
            Free(InodeId),
        }

        let mut stack = vec![Task::Unlink {
            parent,
            name: name.to_string(),
        }];

        while let Some(task) = stack.pop() {
            match task {
                Task::Unlink { parent, name } => {
                    let mut dir = self.read_directory(device, parent)?;
                    let Some(entry) = dir.remove_entry(&name) else {
                        return Err(CfsError::FileNotFound(name));
                    };
                    self.reallocate(device, parent)?;
                    let payload = dir.encode().map_err(parse)?;
                    self.write_by_inode(device, parent, &payload)?;

                    let mut record = self.read_record(device, entry.inode)?;
                    record.counter -= 1;
                    if record.counter > 0 {
                        self.index.lock().table.update(device, entry.inode, &record)?;
                        continue;
                    }

                    match record.file_type {
                        FileType::Directory => {
                            // Children first; the Free task re-reads the
                            // record because emptying reallocates its chain.
                            stack.push(Task::Free(entry.inode));
                            let child = self.read_directory(device, entry.inode)?;
                            for grandchild in child.entries().iter().rev() {
                                stack.push(Task::Unlink {
                                    parent: entry.inode,
                                    name: grandchild.name.clone(),
                                });
                            }
                        }
                        FileType::File => {
                            let mut index = self.index.lock();
                            index.alloc.release(device, record.segment)?;
                            index.table.release(device, entry.inode)?;
                        }
                    }
                }
                Task::Free(inode) => {
                    let mut index = self.index.lock();
                    let record = index.table.read(device, inode)?;
                    index.alloc.release(device, record.segment)?;
                    index.table.release(device, inode)?;
                }
            }
        }
        Ok(())
    }

    fn size_of_inode<D: ByteDevice>(&self, device: &D, inode: InodeId) -> Result<u64> {
        let mut visited: HashSet<i32> = HashSet::new();
        let mut total = 0_u64;
        let mut stack = vec![inode];
        while let Some(current) = stack.pop() {
            if visited.contains(&current.0) {
                continue;
            }
            let record = self.read_record(device, current)?;
            match record.file_type {
                FileType::File => {
                    visited.insert(current.0);
                    total += record.size;
                }
                FileType::Directory => {
                    let dir = self.read_directory(device, current)?;
                    for entry in dir.entries() {
                        stack.push(entry.inode);
                    }
                }
            }
        }
        Ok(total)
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(CfsError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ── Synchronized wrapper ────────────────────────────────────────────────────

/// [`FileStore`] behind a whole-engine reader/writer lock.
///
/// Mutations take the write side, pure reads the read side. Lazy streams are
/// refused because the lock cannot stay held across a stream's consumption;
/// use [`SyncFileStore::copy_to`] instead.
pub struct SyncFileStore {
    inner: RwLock<FileStore>,
}

impl SyncFileStore {
    pub fn create(backing: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        Ok(Self {
            inner: RwLock::new(FileStore::create(backing, config)?),
        })
    }

    pub fn open(backing: impl AsRef<Path>, concurrency_level: usize) -> Result<Self> {
        Ok(Self {
            inner: RwLock::new(FileStore::open(backing, concurrency_level)?),
        })
    }

    pub fn create_directory(&self, parent_path: &str, name: &str) -> Result<()> {
        self.inner.write().create_directory(parent_path, name)
    }

    pub fn create_file(&self, parent_path: &str, name: &str, size_hint: u64) -> Result<()> {
        self.inner.write().create_file(parent_path, name, size_hint)
    }

    pub fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.inner.write().write(path, data)
    }

    pub fn write_from<R: Read>(&self, path: &str, reader: &mut R) -> Result<u64> {
        self.inner.write().write_from(path, reader)
    }

    pub fn copy_to<W: Write>(&self, path: &str, writer: &mut W) -> Result<u64> {
        self.inner.read().copy_to(path, writer)
    }

    pub fn read_stream(&self, _path: &str) -> Result<SegmentStream<PoolGuard>> {
        Err(CfsError::Unsupported(
            "lazy streams on the synchronized store; use copy_to",
        ))
    }

    pub fn create_hard_link(&self, source_path: &str, target_dir: &str, link_name: &str) -> Result<()> {
        self.inner
            .write()
            .create_hard_link(source_path, target_dir, link_name)
    }

    pub fn move_entry(&self, parent_path: &str, target_dir: &str, name: &str) -> Result<()> {
        self.inner.write().move_entry(parent_path, target_dir, name)
    }

    pub fn copy_file(&self, source_path: &str, target_dir: &str, new_name: &str) -> Result<()> {
        self.inner.write().copy_file(source_path, target_dir, new_name)
    }

    pub fn remove(&self, path: &str) -> Result<()> {
        self.inner.write().remove(path)
    }

    pub fn list_names(&self, path: &str) -> Result<Vec<String>> {
        self.inner.read().list_names(path)
    }

    pub fn list(&self, path: &str, with_size: bool) -> Result<Vec<EntryInfo>> {
        self.inner.read().list(path, with_size)
    }

    pub fn tree_size(&self, path: &str) -> Result<u64> {
        self.inner.read().tree_size(path)
    }

    #[must_use]
    pub fn free_pages(&self) -> u64 {
        self.inner.read().free_pages()
    }

    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        self.inner.read().free_bytes()
    }

    #[must_use]
    pub fn capacity_pages(&self) -> u32 {
        self.inner.read().capacity_pages()
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.inner.read().page_size()
    }
}
