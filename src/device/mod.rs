//! # Device adapter
//!
//! Byte-addressed storage underneath the engine. The engine only ever
//! issues whole-bucket reads and writes at bucket-aligned offsets, so a
//! [`Device`] needs nothing beyond positional I/O and a flush.
//!
//! Two implementations are provided:
//!
//! - [`FileDevice`]: a pre-sized regular file (or block device node)
//!   accessed with positional `pread`/`pwrite`, so concurrent readers and
//!   writers never share a seek cursor.
//! - [`MemoryDevice`]: a heap buffer split into independently locked
//!   stripes, for tests and for caches that do not need to survive the
//!   process.
//!
//! # Atomicity
//!
//! Neither implementation promises that a write is atomic with respect to a
//! crash. The engine tolerates torn buckets by checksumming them (see
//! [`crate::bucket`]).

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    fs::{File, OpenOptions},
    io,
    os::unix::fs::FileExt,
    path::Path,
    sync::RwLock,
};

use thiserror::Error;
use tracing::info;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested range does not lie inside the device.
    #[error("out of bounds: offset={offset} len={len} device_size={size}")]
    OutOfBounds {
        /// Start of the requested range.
        offset: u64,
        /// Length of the requested range.
        len: u64,
        /// Total device size.
        size: u64,
    },

    /// Internal invariant violation or poisoned lock.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Device trait
// ------------------------------------------------------------------------------------------------

/// Positional read/write access to a fixed-size byte region.
pub trait Device: Send + Sync {
    /// Total addressable size in bytes.
    fn size(&self) -> u64;

    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), DeviceError>;

    /// Write all of `buf` starting at `offset`.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<(), DeviceError>;

    /// Push buffered writes to stable storage.
    fn flush(&self) -> Result<(), DeviceError>;
}

/// Returns the exclusive end of `[offset, offset + len)` if it lies inside
/// a device of `size` bytes.
fn checked_range(offset: u64, len: usize, size: u64) -> Result<u64, DeviceError> {
    let len = len as u64;
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(end),
        _ => Err(DeviceError::OutOfBounds { offset, len, size }),
    }
}

// ------------------------------------------------------------------------------------------------
// FileDevice
// ------------------------------------------------------------------------------------------------

/// File-backed device using positional I/O.
#[derive(Debug)]
pub struct FileDevice {
    file: File,
    size: u64,
}

impl FileDevice {
    /// Opens `path`, creating it if needed, and sizes it to exactly `size`
    /// bytes. Existing contents within `size` are preserved.
    pub fn create(path: impl AsRef<Path>, size: u64) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() != size {
            file.set_len(size)?;
        }
        info!(path = %path.display(), size, "file device opened");
        Ok(Self { file, size })
    }

    /// Opens an existing file, using its current length as the device size.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        info!(path = %path.display(), size, "file device opened");
        Ok(Self { file, size })
    }
}

impl Device for FileDevice {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), DeviceError> {
        checked_range(offset, buf.len(), self.size)?;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<(), DeviceError> {
        checked_range(offset, buf.len(), self.size)?;
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), DeviceError> {
        self.file.sync_data()?;
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// MemoryDevice
// ------------------------------------------------------------------------------------------------

/// Default stripe width of a [`MemoryDevice`]: one default-sized bucket.
pub const DEFAULT_STRIPE_SIZE: usize = 4096;

/// Heap-backed device. Contents are zero-initialised and lost on drop.
///
/// The buffer is split into independently locked stripes. Accesses to
/// disjoint stripes never contend, so with the stripe width equal to the
/// bucket size every bucket has its own lock and the shard table alone
/// decides which operations serialize. An access spanning several stripes
/// locks them in ascending order.
#[derive(Debug)]
pub struct MemoryDevice {
    stripes: Box<[RwLock<Box<[u8]>>]>,
    stripe_size: usize,
    size: u64,
}

impl MemoryDevice {
    /// A device of `size` bytes striped at [`DEFAULT_STRIPE_SIZE`].
    pub fn new(size: usize) -> Self {
        Self::with_stripe_size(size, DEFAULT_STRIPE_SIZE)
    }

    /// A device of `size` bytes striped every `stripe_size` bytes. The
    /// last stripe may be shorter. A zero width is treated as one byte.
    pub fn with_stripe_size(size: usize, stripe_size: usize) -> Self {
        let stripe_size = stripe_size.max(1);
        let stripes = (0..size.div_ceil(stripe_size))
            .map(|i| {
                let len = stripe_size.min(size - i * stripe_size);
                RwLock::new(vec![0u8; len].into_boxed_slice())
            })
            .collect();
        Self {
            stripes,
            stripe_size,
            size: size as u64,
        }
    }

    pub fn stripe_size(&self) -> usize {
        self.stripe_size
    }

    /// Stripes overlapping `[start, end)`.
    fn stripes_for(&self, start: usize, end: usize) -> &[RwLock<Box<[u8]>>] {
        &self.stripes[start / self.stripe_size..end.div_ceil(self.stripe_size)]
    }
}

impl Device for MemoryDevice {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), DeviceError> {
        let end = checked_range(offset, buf.len(), self.size)? as usize;
        let start = offset as usize;
        let guards = self
            .stripes_for(start, end)
            .iter()
            .map(|stripe| {
                stripe
                    .read()
                    .map_err(|_| DeviceError::Internal("RwLock poisoned".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut base = start - start % self.stripe_size;
        for stripe in &guards {
            let lo = start.max(base);
            let hi = end.min(base + stripe.len());
            buf[lo - start..hi - start].copy_from_slice(&stripe[lo - base..hi - base]);
            base += self.stripe_size;
        }
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<(), DeviceError> {
        let end = checked_range(offset, buf.len(), self.size)? as usize;
        let start = offset as usize;
        let mut guards = self
            .stripes_for(start, end)
            .iter()
            .map(|stripe| {
                stripe
                    .write()
                    .map_err(|_| DeviceError::Internal("RwLock poisoned".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut base = start - start % self.stripe_size;
        for stripe in &mut guards {
            let lo = start.max(base);
            let hi = end.min(base + stripe.len());
            stripe[lo - base..hi - base].copy_from_slice(&buf[lo - start..hi - start]);
            base += self.stripe_size;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}
