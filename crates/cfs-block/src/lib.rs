#![forbid(unsafe_code)]
//! Byte-addressed access to the single backing file.
//!
//! Provides the `ByteDevice` trait (pread/pwrite semantics, no shared seek
//! position), the file-backed implementation, an in-memory double for unit
//! tests, and the bounded blocking pool that hands one device handle to each
//! top-level engine operation.

use cfs_error::{CfsError, Result};
use parking_lot::{Condvar, Mutex};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// Byte-addressed device for fixed-offset I/O.
///
/// All reads and writes are bounds-checked against the device length; a
/// capsule image never grows after creation.
pub trait ByteDevice: Send + Sync {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write all bytes in `buf` at `offset`.
    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Flush pending writes to stable storage.
    fn sync(&self) -> Result<()>;
}

impl<D: ByteDevice + ?Sized> ByteDevice for &D {
    fn len_bytes(&self) -> u64 {
        (**self).len_bytes()
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact_at(offset, buf)
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        (**self).write_all_at(offset, buf)
    }

    fn sync(&self) -> Result<()> {
        (**self).sync()
    }
}

impl<D: ByteDevice + ?Sized> ByteDevice for Arc<D> {
    fn len_bytes(&self) -> u64 {
        (**self).len_bytes()
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact_at(offset, buf)
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        (**self).write_all_at(offset, buf)
    }

    fn sync(&self) -> Result<()> {
        (**self).sync()
    }
}

fn check_range(offset: u64, len: usize, device_len: u64, what: &str) -> Result<()> {
    let len = u64::try_from(len)
        .map_err(|_| CfsError::Config(format!("{what} length overflows u64")))?;
    let end = offset
        .checked_add(len)
        .ok_or_else(|| CfsError::Config(format!("{what} range overflows u64")))?;
    if end > device_len {
        return Err(CfsError::Config(format!(
            "{what} out of bounds: offset={offset} len={len} device_len={device_len}"
        )));
    }
    Ok(())
}

/// File-backed byte device using `pread`/`pwrite` style I/O.
///
/// `std::os::unix::fs::FileExt` is thread-safe and carries no seek cursor,
/// so clones of one handle may be used from several threads.
#[derive(Debug, Clone)]
pub struct FileByteDevice {
    file: Arc<File>,
    len: u64,
}

impl FileByteDevice {
    /// Open an existing capsule image read-write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
        })
    }

    /// Create (or truncate) the backing file and size it to `len` bytes.
    pub fn create(path: impl AsRef<Path>, len: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len(len)?;
        Ok(Self {
            file: Arc::new(file),
            len,
        })
    }
}

impl ByteDevice for FileByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.len, "read")?;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        check_range(offset, buf.len(), self.len, "write")?;
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// In-memory byte device for unit tests.
#[derive(Debug, Clone)]
pub struct MemoryByteDevice {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemoryByteDevice {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(vec![0_u8; len])),
        }
    }
}

impl ByteDevice for MemoryByteDevice {
    fn len_bytes(&self) -> u64 {
        u64::try_from(self.bytes.lock().len()).unwrap_or(0)
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let bytes = self.bytes.lock();
        check_range(offset, buf.len(), bytes.len() as u64, "read")?;
        let start = usize::try_from(offset)
            .map_err(|_| CfsError::Config("offset overflows usize".to_owned()))?;
        buf.copy_from_slice(&bytes[start..start + buf.len()]);
        Ok(())
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.lock();
        check_range(offset, buf.len(), bytes.len() as u64, "write")?;
        let start = usize::try_from(offset)
            .map_err(|_| CfsError::Config("offset overflows usize".to_owned()))?;
        bytes[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

// ── Device pool ─────────────────────────────────────────────────────────────

struct PoolInner {
    slots: Mutex<Vec<FileByteDevice>>,
    available: Condvar,
}

/// Bounded blocking pool of backing-file handles.
///
/// Each top-level engine operation draws one handle and returns it when the
/// guard drops. Acquisition blocks the calling thread until a handle is
/// free; there is no timeout and no cancellation.
#[derive(Clone)]
pub struct DevicePool {
    inner: Arc<PoolInner>,
}

impl DevicePool {
    /// Open `concurrency_level` independent handles to the same image.
    pub fn open(path: impl AsRef<Path>, concurrency_level: usize) -> Result<Self> {
        if concurrency_level == 0 {
            return Err(CfsError::Config(
                "concurrency level must be at least 1".to_owned(),
            ));
        }
        let mut slots = Vec::with_capacity(concurrency_level);
        for _ in 0..concurrency_level {
            slots.push(FileByteDevice::open(path.as_ref())?);
        }
        Ok(Self {
            inner: Arc::new(PoolInner {
                slots: Mutex::new(slots),
                available: Condvar::new(),
            }),
        })
    }

    /// Take a handle, blocking until one is available.
    #[must_use]
    pub fn acquire(&self) -> PoolGuard {
        let mut slots = self.inner.slots.lock();
        while slots.is_empty() {
            trace!("device pool exhausted, waiting for a handle");
            self.inner.available.wait(&mut slots);
        }
        let device = slots.pop().expect("non-empty after wait");
        PoolGuard {
            pool: Arc::clone(&self.inner),
            device: Some(device),
        }
    }
}

/// RAII handle from a [`DevicePool`]; returns the device on drop.
pub struct PoolGuard {
    pool: Arc<PoolInner>,
    device: Option<FileByteDevice>,
}

impl PoolGuard {
    fn device(&self) -> &FileByteDevice {
        self.device
            .as_ref()
            .expect("pool guard device present until drop")
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if let Some(device) = self.device.take() {
            self.pool.slots.lock().push(device);
            self.pool.available.notify_one();
        }
    }
}

impl ByteDevice for PoolGuard {
    fn len_bytes(&self) -> u64 {
        self.device().len_bytes()
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.device().read_exact_at(offset, buf)
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        self.device().write_all_at(offset, buf)
    }

    fn sync(&self) -> Result<()> {
        self.device().sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn file_device_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capsule.img");
        let dev = FileByteDevice::create(&path, 8192).unwrap();
        assert_eq!(dev.len_bytes(), 8192);

        dev.write_all_at(100, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0_u8; 4];
        dev.read_exact_at(100, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);

        // Fresh handle sees the same bytes.
        let reopened = FileByteDevice::open(&path).unwrap();
        let mut buf = [0_u8; 4];
        reopened.read_exact_at(100, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn out_of_bounds_access_is_rejected() {
        let dev = MemoryByteDevice::new(128);
        let mut buf = [0_u8; 16];
        assert!(dev.read_exact_at(120, &mut buf).is_err());
        assert!(dev.write_all_at(u64::MAX, &[0]).is_err());
        assert!(dev.read_exact_at(128, &mut []).is_ok());
    }

    #[test]
    fn pool_blocks_until_a_handle_returns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capsule.img");
        FileByteDevice::create(&path, 1024).unwrap();

        let pool = DevicePool::open(&path, 1).unwrap();
        let held = pool.acquire();

        let peak = Arc::new(AtomicUsize::new(0));
        let peak_clone = Arc::clone(&peak);
        let pool_clone = pool.clone();
        let waiter = std::thread::spawn(move || {
            let guard = pool_clone.acquire();
            peak_clone.store(guard.len_bytes() as usize, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(peak.load(Ordering::SeqCst), 0, "waiter must block");

        drop(held);
        waiter.join().unwrap();
        assert_eq!(peak.load(Ordering::SeqCst), 1024);
    }

    #[test]
    fn pool_rejects_zero_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capsule.img");
        FileByteDevice::create(&path, 1024).unwrap();
        assert!(matches!(
            DevicePool::open(&path, 0),
            Err(CfsError::Config(_))
        ));
    }
}
