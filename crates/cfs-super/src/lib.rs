#![forbid(unsafe_code)]
//! The superblock: inode count, the fixed inode slot table, and the page
//! size trailer.
//!
//! ```text
//! ┌───────────────────┐ offset 0
//! │ inode_count: i32  │
//! ├───────────────────┤ offset 4
//! │ slot 0 (22 bytes) │  used: u8, then the 21-byte inode record
//! │ slot 1            │
//! │ …                 │
//! ├───────────────────┤ offset 4 + count*22
//! │ page_size: i32    │
//! └───────────────────┘ page region starts here
//! ```
//!
//! Slot acquisition always hands out the smallest free index; releases feed
//! the index back, so slot numbers stay compact under churn.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use cfs_block::ByteDevice;
use cfs_error::{CfsError, Result};
use cfs_ondisk::Inode;
use cfs_types::{InodeId, PageSize, INODE_SLOT_LEN};
use tracing::debug;

/// The free-slot index over the on-disk inode table.
///
/// Holds no device handle; callers pass the device each call so one table
/// can serve a pool of handles.
#[derive(Debug)]
pub struct InodeTable {
    inode_count: u32,
    page_size: PageSize,
    free: BinaryHeap<Reverse<u32>>,
}

impl InodeTable {
    /// Write a fresh superblock: all slots unused, each carrying the inert
    /// placeholder record.
    pub fn format<D: ByteDevice>(device: &D, inode_count: u32, page_size: PageSize) -> Result<Self> {
        if inode_count <= 1 {
            return Err(CfsError::Config(format!(
                "inode count must exceed 1, got {inode_count}"
            )));
        }

        let count_i32 = i32::try_from(inode_count)
            .map_err(|_| CfsError::Config(format!("inode count too large: {inode_count}")))?;

        let placeholder = Inode::unused(page_size.get()).encode();
        let mut image = Vec::with_capacity(4 + inode_count as usize * INODE_SLOT_LEN + 4);
        image.extend_from_slice(&count_i32.to_be_bytes());
        for _ in 0..inode_count {
            image.push(0);
            image.extend_from_slice(&placeholder);
        }
        image.extend_from_slice(&(page_size.get() as i32).to_be_bytes());
        device.write_all_at(0, &image)?;

        debug!(inode_count, page_size = page_size.get(), "formatted superblock");
        Ok(Self {
            inode_count,
            page_size,
            free: (0..inode_count).map(Reverse).collect(),
        })
    }

    /// Rebuild the free-slot index from an existing superblock.
    pub fn load<D: ByteDevice>(device: &D) -> Result<Self> {
        let mut header = [0_u8; 4];
        device.read_exact_at(0, &mut header)?;
        let count = i32::from_be_bytes(header);
        if count <= 1 {
            return Err(CfsError::Config(format!(
                "inode count must exceed 1, got {count}"
            )));
        }
        let inode_count = count as u32;

        let mut slots = vec![0_u8; inode_count as usize * INODE_SLOT_LEN];
        device.read_exact_at(4, &mut slots)?;
        let mut free = BinaryHeap::new();
        for index in 0..inode_count {
            if slots[index as usize * INODE_SLOT_LEN] == 0 {
                free.push(Reverse(index));
            }
        }

        let trailer_offset = 4 + u64::from(inode_count) * INODE_SLOT_LEN as u64;
        let mut trailer = [0_u8; 4];
        device.read_exact_at(trailer_offset, &mut trailer)?;
        let raw_page_size = i32::from_be_bytes(trailer);
        let page_size = u32::try_from(raw_page_size)
            .ok()
            .and_then(|value| PageSize::new(value).ok())
            .ok_or_else(|| CfsError::Config(format!("corrupt page size: {raw_page_size}")))?;

        debug!(inode_count, free = free.len(), "loaded superblock");
        Ok(Self {
            inode_count,
            page_size,
            free,
        })
    }

    #[must_use]
    pub fn inode_count(&self) -> u32 {
        self.inode_count
    }

    #[must_use]
    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Byte offset where the page region begins.
    #[must_use]
    pub fn page_region_offset(&self) -> u64 {
        4 + u64::from(self.inode_count) * INODE_SLOT_LEN as u64 + 4
    }

    fn slot_offset(index: u32) -> u64 {
        4 + u64::from(index) * INODE_SLOT_LEN as u64
    }

    fn check_index(&self, inode: InodeId) -> Result<u32> {
        match inode.index() {
            Some(index) if index < self.inode_count => Ok(index),
            _ => Err(CfsError::InvalidInodeIndex {
                index: inode.index().unwrap_or(u32::MAX),
                count: self.inode_count,
            }),
        }
    }

    /// Claim the smallest free slot and write `record` into it.
    pub fn acquire<D: ByteDevice>(&mut self, device: &D, record: &Inode) -> Result<InodeId> {
        let Some(Reverse(index)) = self.free.pop() else {
            return Err(CfsError::AllInodesTaken);
        };
        let mut slot = Vec::with_capacity(INODE_SLOT_LEN);
        slot.push(1);
        slot.extend_from_slice(&record.encode());
        device.write_all_at(Self::slot_offset(index), &slot)?;
        InodeId::from_index(index).map_err(|err| CfsError::Parse(err.to_string()))
    }

    /// Read the record in `inode`'s slot.
    ///
    /// Unused slots still hold their placeholder or stale record; callers
    /// only pass indices they know to be live.
    pub fn read<D: ByteDevice>(&self, device: &D, inode: InodeId) -> Result<Inode> {
        let index = self.check_index(inode)?;
        let mut record = [0_u8; Inode::ENCODED_LEN];
        device.read_exact_at(Self::slot_offset(index) + 1, &mut record)?;
        Inode::decode(&record).map_err(|err| CfsError::Parse(err.to_string()))
    }

    /// Overwrite the record in place, leaving the used flag untouched.
    pub fn update<D: ByteDevice>(&self, device: &D, inode: InodeId, record: &Inode) -> Result<()> {
        let index = self.check_index(inode)?;
        device.write_all_at(Self::slot_offset(index) + 1, &record.encode())
    }

    /// Clear the used flag and return the slot to the free index.
    pub fn release<D: ByteDevice>(&mut self, device: &D, inode: InodeId) -> Result<()> {
        let index = self.check_index(inode)?;
        let offset = Self::slot_offset(index);
        let mut used = [0_u8; 1];
        device.read_exact_at(offset, &mut used)?;
        if used[0] == 0 {
            return Err(CfsError::DoubleFree { index });
        }
        device.write_all_at(offset, &[0])?;
        self.free.push(Reverse(index));
        Ok(())
    }

    /// Whether the slot is marked used on disk.
    pub fn is_used<D: ByteDevice>(&self, device: &D, inode: InodeId) -> Result<bool> {
        let index = self.check_index(inode)?;
        let mut used = [0_u8; 1];
        device.read_exact_at(Self::slot_offset(index), &mut used)?;
        Ok(used[0] != 0)
    }
}
