#![forbid(unsafe_code)]
//! Segment allocation over the page region of a capsule image.
//!
//! The page region is a flat address space of `capacity` pages starting at a
//! fixed byte offset (right after the inode table). An allocation is a
//! *segment chain*: one or more contiguous page runs, each carrying a
//! [`SegmentMeta`] header in its first 12 bytes and linked through the
//! header's `next` field.
//!
//! Free space lives in two orderings over the same set of disjoint,
//! non-adjacent runs: by `(size, start)` for best-fit ceiling queries and by
//! start page for coalescing on release. `free_pages` always equals the sum
//! of the free run sizes; a failed allocation never touches either index.

use std::collections::{BTreeMap, BTreeSet};
use std::cmp::Ordering;

use cfs_block::ByteDevice;
use cfs_error::{CfsError, Result};
use cfs_ondisk::SegmentMeta;
use cfs_types::{PageSize, SegmentId, SEGMENT_HEADER_LEN};
use tracing::{debug, trace};

// ── Free runs ───────────────────────────────────────────────────────────────

/// A contiguous run of free pages, `[start, end]` inclusive.
///
/// Purely an in-memory free-list key; once allocated, a run's only identity
/// is the header written at its first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    start: u32,
    end: u32,
}

impl Segment {
    #[must_use]
    pub fn of(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    #[must_use]
    pub fn start(self) -> u32 {
        self.start
    }

    #[must_use]
    pub fn end(self) -> u32 {
        self.end
    }

    #[must_use]
    pub fn size(self) -> u32 {
        self.end - self.start + 1
    }
}

// Size first, then start. Same-size runs at different offsets must remain
// distinct set members or the free index silently drops pages.
impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.size()
            .cmp(&other.size())
            .then(self.start.cmp(&other.start))
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ── Raw segment I/O ─────────────────────────────────────────────────────────

/// One page's worth (at most) of chain payload, plus the continuation point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRead {
    pub bytes: Vec<u8>,
    /// Segment to continue from, or [`SegmentId::NONE`] at the chain's end.
    pub next: SegmentId,
    /// Payload position to continue at within `next`.
    pub next_pos: u32,
}

/// Offset arithmetic and header/payload access for the page region.
///
/// Copyable on purpose: streams carry their own copy so they can outlive the
/// allocator that spawned them.
#[derive(Debug, Clone, Copy)]
pub struct SegmentIo {
    base_offset: u64,
    page_size: u32,
}

impl SegmentIo {
    #[must_use]
    pub fn new(base_offset: u64, page_size: PageSize) -> Self {
        Self {
            base_offset,
            page_size: page_size.get(),
        }
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    fn page_of(segment: SegmentId) -> Result<u32> {
        segment
            .page()
            .ok_or_else(|| CfsError::Parse(format!("not an allocated segment: {segment}")))
    }

    /// Byte offset of the segment header.
    pub fn meta_offset(&self, segment: SegmentId) -> Result<u64> {
        let page = Self::page_of(segment)?;
        Ok(self.base_offset + u64::from(page) * u64::from(self.page_size))
    }

    /// Byte offset of the first payload byte.
    pub fn data_offset(&self, segment: SegmentId) -> Result<u64> {
        Ok(self.meta_offset(segment)? + SEGMENT_HEADER_LEN as u64)
    }

    pub fn read_meta<D: ByteDevice>(&self, device: &D, segment: SegmentId) -> Result<SegmentMeta> {
        let mut buf = [0_u8; SegmentMeta::ENCODED_LEN];
        device.read_exact_at(self.meta_offset(segment)?, &mut buf)?;
        SegmentMeta::decode(&buf).map_err(|err| CfsError::Parse(err.to_string()))
    }

    pub fn write_meta<D: ByteDevice>(
        &self,
        device: &D,
        segment: SegmentId,
        meta: &SegmentMeta,
    ) -> Result<()> {
        device.write_all_at(self.meta_offset(segment)?, &meta.encode())
    }

    /// Read at most one page of payload starting at `pos` within `segment`.
    ///
    /// The continuation stays inside `segment` while more than a page of
    /// occupied payload remains past `pos`; otherwise it moves to the chain's
    /// next segment at position 0.
    pub fn read_page<D: ByteDevice>(
        &self,
        device: &D,
        segment: SegmentId,
        pos: u32,
    ) -> Result<PageRead> {
        let meta = self.read_meta(device, segment)?;
        let to_read = meta.occupied.saturating_sub(pos);
        let len = to_read.min(self.page_size) as usize;

        let mut bytes = vec![0_u8; len];
        device.read_exact_at(self.data_offset(segment)? + u64::from(pos), &mut bytes)?;

        if to_read > self.page_size {
            Ok(PageRead {
                bytes,
                next: segment,
                next_pos: pos + self.page_size,
            })
        } else {
            Ok(PageRead {
                bytes,
                next: meta.next,
                next_pos: 0,
            })
        }
    }

    /// Read the whole occupied payload of one segment in a single call.
    pub fn read_whole<D: ByteDevice>(
        &self,
        device: &D,
        segment: SegmentId,
    ) -> Result<(Vec<u8>, SegmentId)> {
        let meta = self.read_meta(device, segment)?;
        let mut bytes = vec![0_u8; meta.occupied as usize];
        device.read_exact_at(self.data_offset(segment)?, &mut bytes)?;
        Ok((bytes, meta.next))
    }

    /// Concatenated payload of every segment in the chain.
    pub fn read_chain<D: ByteDevice>(&self, device: &D, segment: SegmentId) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut current = segment;
        while !current.is_none() {
            let (bytes, next) = self.read_whole(device, current)?;
            out.extend_from_slice(&bytes);
            current = next;
        }
        Ok(out)
    }
}

// ── Allocator ───────────────────────────────────────────────────────────────

/// Free-space index plus chain write/release over a capsule's page region.
///
/// Holds no device handle; every operation takes the device it should touch,
/// so one index can serve a pool of handles.
#[derive(Debug)]
pub struct SegmentAllocator {
    io: SegmentIo,
    capacity: u32,
    remaining: u64,
    by_size: BTreeSet<Segment>,
    by_pos: BTreeMap<u32, Segment>,
}

impl SegmentAllocator {
    /// Index over `[0, capacity_pages)` with every page free.
    pub fn new(base_offset: u64, page_size: PageSize, capacity_pages: u32) -> Result<Self> {
        if capacity_pages == 0 {
            return Err(CfsError::Config(String::from(
                "page region must hold at least one page",
            )));
        }
        let mut allocator = Self {
            io: SegmentIo::new(base_offset, page_size),
            capacity: capacity_pages,
            remaining: 0,
            by_size: BTreeSet::new(),
            by_pos: BTreeMap::new(),
        };
        allocator.put(Segment::of(0, capacity_pages - 1));
        Ok(allocator)
    }

    #[must_use]
    pub fn io(&self) -> SegmentIo {
        self.io
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.io.page_size
    }

    /// Free pages right now.
    #[must_use]
    pub fn free_pages(&self) -> u64 {
        self.remaining
    }

    #[must_use]
    pub fn capacity_pages(&self) -> u32 {
        self.capacity
    }

    /// Minimal page count whose payload capacity covers `bytes`.
    #[must_use]
    pub fn pages_for_bytes(&self, bytes: u64) -> u32 {
        let page = u64::from(self.io.page_size);
        let mut pages = bytes.div_ceil(page).max(1);
        if pages * page - (SEGMENT_HEADER_LEN as u64) < bytes {
            pages += 1;
        }
        pages as u32
    }

    /// Allocate a chain of exactly `pages` pages and return its first segment.
    ///
    /// Best fit first: the smallest single free run that covers the request
    /// is split, its tail returned to the index. When no single run is big
    /// enough, whole runs are consumed largest-first and linked into a chain.
    /// A capacity shortfall is detected before anything is written or taken.
    pub fn allocate<D: ByteDevice>(&mut self, device: &D, pages: u32) -> Result<SegmentId> {
        if pages == 0 {
            return Err(CfsError::Config(String::from("cannot allocate zero pages")));
        }
        if self.remaining < u64::from(pages) {
            return Err(CfsError::InsufficientCapacity {
                requested: pages,
                free: self.remaining,
            });
        }

        if let Some(run) = self
            .by_size
            .range(Segment::of(0, pages - 1)..)
            .next()
            .copied()
        {
            self.take(run);
            let head = SegmentId::from_page(run.start())
                .map_err(|err| CfsError::Parse(err.to_string()))?;
            self.io.write_meta(
                device,
                head,
                &SegmentMeta {
                    num_blocks: pages,
                    next: SegmentId::NONE,
                    occupied: 0,
                },
            )?;
            if run.size() > pages {
                self.put(Segment::of(run.start() + pages, run.end()));
            }
            trace!(segment = head.0, pages, "allocated single run");
            return Ok(head);
        }

        // Chaining path: consume whole runs, largest first.
        let mut taken: Vec<Segment> = Vec::new();
        let mut left = pages;
        loop {
            let Some(run) = self.by_size.iter().next_back().copied() else {
                // Capacity said yes but the index ran dry.
                for run in taken {
                    self.put(run);
                }
                return Err(CfsError::OutOfPages);
            };
            self.take(run);
            left = left.saturating_sub(run.size());
            taken.push(run);
            if left == 0 {
                break;
            }
        }

        for pair in taken.windows(2) {
            let next = SegmentId::from_page(pair[1].start())
                .map_err(|err| CfsError::Parse(err.to_string()))?;
            self.io.write_meta(
                device,
                SegmentId::from_page(pair[0].start())
                    .map_err(|err| CfsError::Parse(err.to_string()))?,
                &SegmentMeta {
                    num_blocks: pair[0].size(),
                    next,
                    occupied: 0,
                },
            )?;
        }
        let last = taken[taken.len() - 1];
        self.io.write_meta(
            device,
            SegmentId::from_page(last.start()).map_err(|err| CfsError::Parse(err.to_string()))?,
            &SegmentMeta {
                num_blocks: last.size(),
                next: SegmentId::NONE,
                occupied: 0,
            },
        )?;

        let head = SegmentId::from_page(taken[0].start())
            .map_err(|err| CfsError::Parse(err.to_string()))?;
        debug!(segment = head.0, pages, runs = taken.len(), "allocated chain");
        Ok(head)
    }

    /// Allocate a chain whose payload capacity covers `bytes`.
    pub fn allocate_for_bytes<D: ByteDevice>(&mut self, device: &D, bytes: u64) -> Result<SegmentId> {
        let pages = self.pages_for_bytes(bytes);
        self.allocate(device, pages)
    }

    /// Append `data` to the chain starting at `start`.
    ///
    /// Each segment's free payload is filled before advancing; when the
    /// terminal segment runs out, a fresh chain sized to the remaining bytes
    /// is allocated and linked in. Returns the segment holding the final
    /// byte written, which callers cache as a fast append point.
    pub fn write_chain<D: ByteDevice>(
        &mut self,
        device: &D,
        start: SegmentId,
        data: &[u8],
    ) -> Result<SegmentId> {
        if data.is_empty() {
            return Ok(start);
        }

        let mut current = start;
        let mut cursor = 0_usize;
        loop {
            let mut meta = self.io.read_meta(device, current)?;
            let capacity = meta.payload_capacity(self.io.page_size) as usize;
            let occupied = meta.occupied as usize;

            if occupied < capacity {
                let take = (capacity - occupied).min(data.len() - cursor);
                device.write_all_at(
                    self.io.data_offset(current)? + occupied as u64,
                    &data[cursor..cursor + take],
                )?;
                meta.occupied += take as u32;
                self.io.write_meta(device, current, &meta)?;
                cursor += take;
                if cursor == data.len() {
                    return Ok(current);
                }
            }

            if meta.is_continued() {
                current = meta.next;
            } else {
                let needed = self.pages_for_bytes((data.len() - cursor) as u64);
                let next = self.allocate(device, needed)?;
                meta.next = next;
                meta.occupied = capacity as u32;
                self.io.write_meta(device, current, &meta)?;
                trace!(from = current.0, to = next.0, pages = needed, "expanded chain");
                current = next;
            }
        }
    }

    /// Return every page of the chain starting at `start` to the free index,
    /// merging with adjacent free runs.
    pub fn release<D: ByteDevice>(&mut self, device: &D, start: SegmentId) -> Result<()> {
        let mut freed: Vec<Segment> = Vec::new();
        let mut current = start;
        loop {
            let meta = self.io.read_meta(device, current)?;
            let page = SegmentIo::page_of(current)?;
            freed.push(Segment::of(page, page + meta.num_blocks - 1));
            if !meta.is_continued() {
                break;
            }
            current = meta.next;
        }

        let pages: u64 = freed.iter().map(|run| u64::from(run.size())).sum();
        for run in freed {
            self.insert_coalescing(run);
        }
        debug!(segment = start.0, pages, "released chain");
        Ok(())
    }

    fn insert_coalescing(&mut self, run: Segment) {
        let mut start = run.start();
        let mut end = run.end();

        let left = self.by_pos.range(..run.start()).next_back().map(|(_, s)| *s);
        if let Some(left) = left {
            if left.end() + 1 == run.start() {
                self.take(left);
                start = left.start();
            }
        }

        let right = self.by_pos.range(run.end() + 1..).next().map(|(_, s)| *s);
        if let Some(right) = right {
            if right.start() == run.end() + 1 {
                self.take(right);
                end = right.end();
            }
        }

        self.put(Segment::of(start, end));
    }

    fn take(&mut self, run: Segment) {
        self.remaining -= u64::from(run.size());
        self.by_size.remove(&run);
        self.by_pos.remove(&run.start());
    }

    fn put(&mut self, run: Segment) {
        self.remaining += u64::from(run.size());
        self.by_size.insert(run);
        self.by_pos.insert(run.start(), run);
    }

    /// Forward-only cursor over the chain starting at `segment`.
    pub fn open_stream<D: ByteDevice>(&self, device: D, segment: SegmentId) -> Result<SegmentStream<D>> {
        SegmentStream::open(self.io, device, segment)
    }
}

// ── Stream ──────────────────────────────────────────────────────────────────

/// Single-pass forward cursor over a segment chain's payload.
///
/// Holds one page in memory at a time. Finite and not restartable; re-reading
/// requires a fresh stream from the chain's first segment.
pub struct SegmentStream<D: ByteDevice> {
    io: SegmentIo,
    device: D,
    page: Vec<u8>,
    pos: usize,
    next: SegmentId,
    next_pos: u32,
}

impl<D: ByteDevice> SegmentStream<D> {
    pub fn open(io: SegmentIo, device: D, segment: SegmentId) -> Result<Self> {
        let first = io.read_page(&device, segment, 0)?;
        Ok(Self {
            io,
            device,
            page: first.bytes,
            pos: 0,
            next: first.next,
            next_pos: first.next_pos,
        })
    }

    /// Whether any unread payload remains.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.pos < self.page.len() || !self.next.is_none()
    }

    /// Step past exhausted pages until payload is under the cursor.
    ///
    /// Returns false when the chain is spent. A chained allocation whose
    /// write ended exactly on a run boundary leaves a linked terminal
    /// segment with nothing occupied, so empty successors are skipped, not
    /// treated as errors.
    fn skip_exhausted(&mut self) -> Result<bool> {
        while self.pos == self.page.len() {
            if self.next.is_none() {
                return Ok(false);
            }
            let read = self.io.read_page(&self.device, self.next, self.next_pos)?;
            self.page = read.bytes;
            self.pos = 0;
            self.next = read.next;
            self.next_pos = read.next_pos;
        }
        Ok(true)
    }

    pub fn next_byte(&mut self) -> Result<u8> {
        if !self.skip_exhausted()? {
            return Err(CfsError::EndOfStream);
        }
        let byte = self.page[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Four bytes, big-endian.
    pub fn next_i32(&mut self) -> Result<i32> {
        let bytes = [
            self.next_byte()?,
            self.next_byte()?,
            self.next_byte()?,
            self.next_byte()?,
        ];
        Ok(i32::from_be_bytes(bytes))
    }

    /// Fill as much of `buf` as the current page allows.
    ///
    /// May return fewer bytes than `buf` holds; callers loop. Returns 0 when
    /// nothing at all is left.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.skip_exhausted()? {
            return Ok(0);
        }
        let take = (self.page.len() - self.pos).min(buf.len());
        buf[..take].copy_from_slice(&self.page[self.pos..self.pos + take]);
        self.pos += take;
        Ok(take)
    }

    /// A length-prefixed string (`i32` byte count, then the bytes).
    pub fn next_string(&mut self) -> Result<String> {
        let len = self.next_i32()?;
        let len = usize::try_from(len)
            .map_err(|_| CfsError::Parse(String::from("negative string length in stream")))?;
        let mut bytes = vec![0_u8; len];
        let mut filled = 0;
        while filled < len {
            let read = self.read_into(&mut bytes[filled..])?;
            if read == 0 {
                return Err(CfsError::EndOfStream);
            }
            filled += read;
        }
        String::from_utf8(bytes).map_err(|_| CfsError::Parse(String::from("invalid utf-8 in stream")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfs_block::MemoryByteDevice;

    const PAGE: u32 = 4096;
    const PAGES: u32 = 200;
    const BASE: u64 = 100;
    const HEADER: usize = SEGMENT_HEADER_LEN;

    fn setup() -> (MemoryByteDevice, SegmentAllocator) {
        let device = MemoryByteDevice::new((BASE + u64::from(PAGE) * u64::from(PAGES)) as usize);
        let allocator =
            SegmentAllocator::new(BASE, PageSize::new(PAGE).unwrap(), PAGES).unwrap();
        (device, allocator)
    }

    fn meta(device: &MemoryByteDevice, io: SegmentIo, page: u32) -> SegmentMeta {
        io.read_meta(device, SegmentId::from_page(page).unwrap())
            .unwrap()
    }

    #[test]
    fn allocate_writes_header_and_tracks_capacity() {
        let (device, mut alloc) = setup();
        let segment = alloc.allocate(&device, 20).unwrap();
        assert_eq!(segment, SegmentId(0));
        assert_eq!(alloc.free_pages(), u64::from(PAGES - 20));

        let meta = meta(&device, alloc.io(), 0);
        assert_eq!(meta.num_blocks, 20);
        assert_eq!(meta.next, SegmentId::NONE);
        assert_eq!(meta.occupied, 0);
    }

    #[test]
    fn write_then_expand_links_past_intervening_allocation() {
        let (device, mut alloc) = setup();
        let segment = alloc.allocate(&device, 20).unwrap();

        let tail = alloc
            .write_chain(&device, segment, &[1, 2, 3, 4, 5, 6, 7, 8])
            .unwrap();
        assert_eq!(tail, segment);
        assert_eq!(meta(&device, alloc.io(), 0).occupied, 8);

        // Page 20 goes to someone else; the expansion must land on 21.
        alloc.allocate(&device, 1).unwrap();

        let mut ones = vec![1_u8; PAGE as usize * 20 - HEADER];
        *ones.last_mut().unwrap() = 5;
        let tail = alloc.write_chain(&device, segment, &ones).unwrap();
        assert_eq!(tail, SegmentId(21));

        let head = meta(&device, alloc.io(), 0);
        assert_eq!(head.num_blocks, 20);
        assert_eq!(head.occupied as usize, PAGE as usize * 20 - HEADER);
        assert_eq!(head.next, SegmentId(21));

        let bystander = meta(&device, alloc.io(), 20);
        assert_eq!(bystander.num_blocks, 1);
        assert_eq!(bystander.occupied, 0);
        assert_eq!(bystander.next, SegmentId::NONE);

        let expansion = meta(&device, alloc.io(), 21);
        assert_eq!(expansion.num_blocks, 1);
        assert_eq!(expansion.occupied, 8);
        assert_eq!(expansion.next, SegmentId::NONE);

        let mut last = [0_u8; 8];
        device
            .read_exact_at(
                alloc.io().data_offset(SegmentId(21)).unwrap(),
                &mut last,
            )
            .unwrap();
        assert_eq!(last, [1, 1, 1, 1, 1, 1, 1, 5]);
    }

    #[test]
    fn chain_round_trip_across_two_appends() {
        let (device, mut alloc) = setup();
        let segment = alloc.allocate(&device, 20).unwrap();
        alloc.allocate(&device, 2).unwrap();

        let mut ones = vec![1_u8; PAGE as usize * 22 - HEADER];
        *ones.last_mut().unwrap() = 5;
        alloc.write_chain(&device, segment, &ones).unwrap();

        alloc.allocate(&device, 2).unwrap();

        let mut twos = vec![2_u8; PAGE as usize * 3 - HEADER];
        *twos.last_mut().unwrap() = 6;
        alloc.write_chain(&device, segment, &twos).unwrap();

        let all = alloc.io().read_chain(&device, segment).unwrap();
        let mut expected = ones;
        expected.extend_from_slice(&twos);
        assert_eq!(all, expected);
    }

    #[test]
    fn over_capacity_request_fails_without_touching_the_index() {
        let (device, mut alloc) = setup();
        let before = alloc.free_pages();
        let err = alloc.allocate(&device, PAGES + 1).unwrap_err();
        assert!(matches!(err, CfsError::InsufficientCapacity { .. }));
        assert_eq!(alloc.free_pages(), before);
    }

    #[test]
    fn full_capacity_allocate_release_restores_everything() {
        let (device, mut alloc) = setup();
        let before = alloc.free_pages();
        let segment = alloc.allocate(&device, PAGES).unwrap();
        assert_eq!(alloc.free_pages(), 0);
        alloc.release(&device, segment).unwrap();
        assert_eq!(alloc.free_pages(), before);
    }

    #[test]
    fn interleaved_appends_release_back_to_full() {
        let (device, mut alloc) = setup();
        let big = vec![0_u8; PAGE as usize * 20 - HEADER];
        let one = vec![0_u8; PAGE as usize - HEADER];
        let two = vec![0_u8; PAGE as usize * 2 - HEADER];
        let three = vec![0_u8; PAGE as usize * 3 - HEADER];

        let owners = [
            alloc.allocate(&device, 20).unwrap(),
            alloc.allocate(&device, 20).unwrap(),
            alloc.allocate(&device, 20).unwrap(),
        ];
        for owner in owners {
            alloc.write_chain(&device, owner, &big).unwrap();
        }
        for _ in 0..10 {
            alloc.write_chain(&device, owners[0], &one).unwrap();
            alloc.write_chain(&device, owners[1], &two).unwrap();
            alloc.write_chain(&device, owners[2], &three).unwrap();
        }
        for owner in owners {
            alloc.release(&device, owner).unwrap();
        }
        assert_eq!(alloc.free_pages(), u64::from(PAGES));
    }

    #[test]
    fn released_neighbors_coalesce() {
        let (device, mut alloc) = setup();
        let a = alloc.allocate(&device, 5).unwrap();
        let b = alloc.allocate(&device, 5).unwrap();
        let c = alloc.allocate(&device, 5).unwrap();

        // Free the middle run first so both merges happen on its neighbors.
        alloc.release(&device, b).unwrap();
        alloc.release(&device, a).unwrap();
        alloc.release(&device, c).unwrap();

        assert_eq!(alloc.free_pages(), u64::from(PAGES));
        // A single full-capacity allocation only succeeds without chaining
        // when the whole region merged back into one run.
        let whole = alloc.allocate(&device, PAGES).unwrap();
        let meta = alloc.io().read_meta(&device, whole).unwrap();
        assert_eq!(meta.num_blocks, PAGES);
        assert_eq!(meta.next, SegmentId::NONE);
    }

    #[test]
    fn chaining_takes_largest_runs_and_links_by_start() {
        let (device, mut alloc) = setup();
        // Carve the region into separated free runs: free [0,19] and [40,199]
        // stay apart because [20,39] remains allocated.
        let first = alloc.allocate(&device, 20).unwrap();
        let keep = alloc.allocate(&device, 20).unwrap();
        alloc.release(&device, first).unwrap();
        assert_eq!(alloc.free_pages(), u64::from(PAGES - 20));

        // 170 fits nowhere singly (largest run is 160), so the chain takes
        // [40,199] then [0,19].
        let head = alloc.allocate(&device, 170).unwrap();
        assert_eq!(head, SegmentId(40));

        let head_meta = meta(&device, alloc.io(), 40);
        assert_eq!(head_meta.num_blocks, 160);
        assert_eq!(head_meta.next, SegmentId(0));

        let tail_meta = meta(&device, alloc.io(), 0);
        assert_eq!(tail_meta.num_blocks, 20);
        assert_eq!(tail_meta.next, SegmentId::NONE);

        assert_eq!(alloc.free_pages(), 0);
        alloc.release(&device, head).unwrap();
        alloc.release(&device, keep).unwrap();
        assert_eq!(alloc.free_pages(), u64::from(PAGES));
    }

    #[test]
    fn pages_for_bytes_covers_the_header() {
        let (_, alloc) = setup();
        assert_eq!(alloc.pages_for_bytes(0), 1);
        assert_eq!(alloc.pages_for_bytes(1), 1);
        assert_eq!(alloc.pages_for_bytes(u64::from(PAGE) - 12), 1);
        // One more byte no longer fits beside the header.
        assert_eq!(alloc.pages_for_bytes(u64::from(PAGE) - 11), 2);
        assert_eq!(alloc.pages_for_bytes(5000), 2);
    }

    #[test]
    fn stream_reads_bytes_ints_and_strings_across_pages() {
        let (device, mut alloc) = setup();
        let segment = alloc.allocate_for_bytes(&device, 5000).unwrap();

        let mut payload = Vec::new();
        cfs_types::put_str(&mut payload, "f").unwrap();
        cfs_types::put_i32(&mut payload, 7);
        payload.extend_from_slice(&vec![9_u8; 6000]);
        payload.extend_from_slice(&[1, 2, 3, 4, 5]);
        alloc.write_chain(&device, segment, &payload).unwrap();

        let mut stream = alloc.open_stream(&device, segment).unwrap();
        assert!(stream.has_next());
        assert_eq!(stream.next_string().unwrap(), "f");
        assert_eq!(stream.next_i32().unwrap(), 7);

        let mut bulk = vec![0_u8; 6000];
        let mut filled = 0;
        while filled < bulk.len() {
            filled += stream.read_into(&mut bulk[filled..]).unwrap();
        }
        assert!(bulk.iter().all(|&b| b == 9));

        for expected in [1, 2, 3, 4, 5] {
            assert_eq!(stream.next_byte().unwrap(), expected);
        }
        assert!(!stream.has_next());
        assert!(matches!(stream.next_byte(), Err(CfsError::EndOfStream)));
    }

    #[test]
    fn stream_survives_a_chained_write_ending_on_a_run_boundary() {
        let (device, mut alloc) = setup();
        // Separated free runs [0,19] and [40,199], as in the chaining test.
        let first = alloc.allocate(&device, 20).unwrap();
        let _keep = alloc.allocate(&device, 20).unwrap();
        alloc.release(&device, first).unwrap();

        // The chain is [40,199] then [0,19]; filling the head run exactly
        // leaves the linked tail segment with nothing occupied.
        let head = alloc.allocate(&device, 170).unwrap();
        let head_capacity = 160 * PAGE as usize - HEADER;
        let payload: Vec<u8> = (0..head_capacity).map(|i| (i % 251) as u8).collect();
        alloc.write_chain(&device, head, &payload).unwrap();
        assert_eq!(meta(&device, alloc.io(), 0).occupied, 0);

        let mut stream = alloc.open_stream(&device, head).unwrap();
        let mut out = Vec::new();
        let mut buf = [0_u8; 1024];
        while stream.has_next() {
            let read = stream.read_into(&mut buf).unwrap();
            out.extend_from_slice(&buf[..read]);
        }
        assert_eq!(out, payload);
        assert!(!stream.has_next());
        assert!(matches!(stream.next_byte(), Err(CfsError::EndOfStream)));
    }

    #[test]
    fn zero_length_write_is_a_no_op() {
        let (device, mut alloc) = setup();
        let segment = alloc.allocate(&device, 1).unwrap();
        let before = alloc.free_pages();
        let tail = alloc.write_chain(&device, segment, &[]).unwrap();
        assert_eq!(tail, segment);
        assert_eq!(alloc.free_pages(), before);
        assert_eq!(meta(&device, alloc.io(), segment.page().unwrap()).occupied, 0);
    }

    #[test]
    fn read_page_paginates_within_a_segment() {
        let (device, mut alloc) = setup();
        let segment = alloc.allocate(&device, 2).unwrap();
        let payload = vec![3_u8; PAGE as usize + 100];
        alloc.write_chain(&device, segment, &payload).unwrap();

        let first = alloc.io().read_page(&device, segment, 0).unwrap();
        assert_eq!(first.bytes.len(), PAGE as usize);
        assert_eq!(first.next, segment);
        assert_eq!(first.next_pos, PAGE);

        let second = alloc
            .io()
            .read_page(&device, first.next, first.next_pos)
            .unwrap();
        assert_eq!(second.bytes.len(), 100);
        assert_eq!(second.next, SegmentId::NONE);
        assert_eq!(second.next_pos, 0);
    }
}
