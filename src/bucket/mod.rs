//! # Bucket codec
//!
//! A bucket is the fixed-size unit of storage, locking and eviction. This
//! module turns the raw bytes of one bucket into an ordered list of entries
//! and back. It has no knowledge of devices, locks or bloom filters.
//!
//! # On-device layout
//!
//! ```text
//! [CHECKSUM u32][GENERATION u64][ENTRY_COUNT u32][USED_BYTES u32]
//! [KEY_LEN u16][VALUE_LEN u32][EXPIRY u32][KEY_HASH u64][KEY][VALUE]
//! [KEY_LEN u16][VALUE_LEN u32][EXPIRY u32][KEY_HASH u64][KEY][VALUE]
//! ...
//! [zero padding up to bucket_size]
//! ```
//!
//! - **Header**: 20 bytes. `USED_BYTES` counts entry bytes only.
//! - **Checksum**: CRC32 over everything after the checksum field up to
//!   the end of the last entry.
//! - **Generation**: engine generation at the time of the write. A
//!   bucket whose generation differs from the caller's is *stale* and
//!   decodes as empty without checksum validation; this is how the engine
//!   resets without rewriting the device.
//! - **Entries**: stored in insertion order, oldest first. Eviction
//!   always removes from the front.

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;

use crate::encoding::{Decode, Encode, EncodingError};
use crc32fast::Hasher as Crc32;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Size of the bucket header in bytes.
pub const BUCKET_HEADER_SIZE: usize = 20;

/// Size of the per-entry header in bytes.
pub const ENTRY_HEADER_SIZE: usize = 18;

const CHECKSUM_SIZE: usize = 4;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by bucket encoding, decoding and mutation.
#[derive(Debug, Error)]
pub enum BucketError {
    /// Stored checksum does not match the bucket contents.
    #[error("bucket checksum mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    ChecksumMismatch { stored: u32, computed: u32 },

    /// Structurally invalid bucket contents.
    #[error("corrupt bucket: {0}")]
    Corrupt(String),

    /// The entry cannot fit even in an empty bucket.
    #[error("entry of {size} bytes exceeds bucket capacity of {capacity} bytes")]
    EntryTooLarge { size: usize, capacity: usize },

    /// Buffer handed to the codec has the wrong length.
    #[error("buffer length {actual} does not match bucket size {expected}")]
    BufferSize { expected: usize, actual: usize },

    /// Encoding / decoding error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

// ------------------------------------------------------------------------------------------------
// Entries
// ------------------------------------------------------------------------------------------------

/// Fixed-width header in front of each entry's key and value bytes.
struct EntryHeader {
    key_len: u16,
    value_len: u32,
    expiry_time: u32,
    key_hash: u64,
}

impl Encode for EntryHeader {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.key_len.encode_to(buf)?;
        self.value_len.encode_to(buf)?;
        self.expiry_time.encode_to(buf)?;
        self.key_hash.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for EntryHeader {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (key_len, n) = u16::decode_from(&buf[offset..])?;
        offset += n;
        let (value_len, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (expiry_time, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (key_hash, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                key_len,
                value_len,
                expiry_time,
                key_hash,
            },
            offset,
        ))
    }
}

/// One key/value pair stored in a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntry {
    /// 64-bit hash of `key`, kept so bloom segments can be rebuilt
    /// without re-hashing.
    pub key_hash: u64,

    /// Absolute expiry in seconds since the UNIX epoch; `0` never expires.
    pub expiry_time: u32,

    pub key: Vec<u8>,

    pub value: Vec<u8>,
}

impl BucketEntry {
    /// Bytes an entry with the given key and value lengths occupies.
    pub const fn encoded_size_for(key_len: usize, value_len: usize) -> usize {
        ENTRY_HEADER_SIZE + key_len + value_len
    }

    pub fn encoded_size(&self) -> usize {
        Self::encoded_size_for(self.key.len(), self.value.len())
    }

    /// Borrowed view handed to expiry checks and destructors.
    pub fn view(&self) -> EntryView<'_> {
        EntryView {
            key: &self.key,
            value: &self.value,
            expiry_time: self.expiry_time,
        }
    }

    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), BucketError> {
        let key_len = u16::try_from(self.key.len()).map_err(|_| {
            EncodingError::LengthOverflow(format!("key length {} exceeds u16::MAX", self.key.len()))
        })?;
        let value_len = u32::try_from(self.value.len()).map_err(|_| {
            EncodingError::LengthOverflow(format!(
                "value length {} exceeds u32::MAX",
                self.value.len()
            ))
        })?;
        EntryHeader {
            key_len,
            value_len,
            expiry_time: self.expiry_time,
            key_hash: self.key_hash,
        }
        .encode_to(buf)?;
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
        Ok(())
    }
}

/// Borrowed view of an entry.
#[derive(Debug, Clone, Copy)]
pub struct EntryView<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
    pub expiry_time: u32,
}

// ------------------------------------------------------------------------------------------------
// Bucket
// ------------------------------------------------------------------------------------------------

/// Decoded contents of one bucket, oldest entry first.
#[derive(Debug, Clone)]
pub struct Bucket {
    generation: u64,
    capacity: usize,
    used: usize,
    entries: VecDeque<BucketEntry>,
}

impl Bucket {
    /// An empty bucket for a device slot of `bucket_size` bytes.
    ///
    /// `bucket_size` must exceed [`BUCKET_HEADER_SIZE`]; the engine
    /// validates this at construction.
    pub fn new(generation: u64, bucket_size: usize) -> Self {
        Self {
            generation,
            capacity: bucket_size.saturating_sub(BUCKET_HEADER_SIZE),
            used: 0,
            entries: VecDeque::new(),
        }
    }

    /// Decodes a bucket from its raw device bytes.
    ///
    /// A bucket stamped with a generation other than `generation` is
    /// returned empty. Otherwise the checksum and entry structure are
    /// validated.
    ///
    /// # Errors
    ///
    /// - [`BucketError::ChecksumMismatch`] if the CRC does not match.
    /// - [`BucketError::Corrupt`] if counts or lengths are inconsistent.
    pub fn decode(buf: &[u8], generation: u64) -> Result<Self, BucketError> {
        let mut bucket = Self::new(generation, buf.len());
        if buf.len() <= BUCKET_HEADER_SIZE {
            return Err(BucketError::Corrupt(format!(
                "bucket of {} bytes has no room past the header",
                buf.len()
            )));
        }

        let (stored_crc, _) = u32::decode_from(buf)?;
        let (stored_generation, _) = u64::decode_from(&buf[CHECKSUM_SIZE..])?;
        if stored_generation != generation {
            return Ok(bucket);
        }
        let (count, _) = u32::decode_from(&buf[12..])?;
        let (used, _) = u32::decode_from(&buf[16..])?;
        let used = used as usize;

        if used > bucket.capacity {
            return Err(BucketError::Corrupt(format!(
                "used bytes {used} exceed capacity {}",
                bucket.capacity
            )));
        }

        let end = BUCKET_HEADER_SIZE + used;
        let computed = checksum(&buf[CHECKSUM_SIZE..end]);
        if computed != stored_crc {
            return Err(BucketError::ChecksumMismatch {
                stored: stored_crc,
                computed,
            });
        }

        let data = &buf[BUCKET_HEADER_SIZE..end];
        let mut offset = 0;
        for i in 0..count {
            let (header, n) = EntryHeader::decode_from(&data[offset..])
                .map_err(|e| BucketError::Corrupt(format!("entry {i} header: {e}")))?;
            offset += n;
            let body_len = header.key_len as usize + header.value_len as usize;
            let body = data.get(offset..offset + body_len).ok_or_else(|| {
                BucketError::Corrupt(format!(
                    "entry {i} body of {body_len} bytes overruns used region"
                ))
            })?;
            let (key, value) = body.split_at(header.key_len as usize);
            bucket.entries.push_back(BucketEntry {
                key_hash: header.key_hash,
                expiry_time: header.expiry_time,
                key: key.to_vec(),
                value: value.to_vec(),
            });
            offset += body_len;
        }

        if offset != used {
            return Err(BucketError::Corrupt(format!(
                "{count} entries cover {offset} bytes, header claims {used}"
            )));
        }

        bucket.used = used;
        Ok(bucket)
    }

    /// Entry count and entry bytes the header of `buf` claims, if it is
    /// stamped with `generation`. Nothing past the header is validated.
    ///
    /// Used to retire the occupancy of a bucket that failed [`Bucket::decode`].
    /// Bytes are capped at the slot capacity and the count at what those
    /// bytes could hold. Stale or truncated slots claim nothing.
    pub fn claimed_occupancy(buf: &[u8], generation: u64) -> (u64, u64) {
        if buf.len() <= BUCKET_HEADER_SIZE {
            return (0, 0);
        }
        let header = || -> Result<(u64, u32, u32), EncodingError> {
            let (stored_generation, _) = u64::decode_from(&buf[CHECKSUM_SIZE..])?;
            let (count, _) = u32::decode_from(&buf[12..])?;
            let (used, _) = u32::decode_from(&buf[16..])?;
            Ok((stored_generation, count, used))
        };
        match header() {
            Ok((stored_generation, count, used)) if stored_generation == generation => {
                let used = (used as usize).min(buf.len() - BUCKET_HEADER_SIZE);
                let count = (count as usize).min(used / ENTRY_HEADER_SIZE);
                (count as u64, used as u64)
            }
            _ => (0, 0),
        }
    }

    /// Encodes the bucket into `buf`, which must be exactly one bucket
    /// long. Bytes after the last entry are zeroed.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<(), BucketError> {
        let expected = self.capacity + BUCKET_HEADER_SIZE;
        if buf.len() != expected {
            return Err(BucketError::BufferSize {
                expected,
                actual: buf.len(),
            });
        }

        let mut out = Vec::with_capacity(BUCKET_HEADER_SIZE + self.used);
        out.extend_from_slice(&[0u8; CHECKSUM_SIZE]);
        self.generation.encode_to(&mut out)?;
        (self.entries.len() as u32).encode_to(&mut out)?;
        (self.used as u32).encode_to(&mut out)?;
        for entry in &self.entries {
            entry.encode_to(&mut out)?;
        }
        debug_assert_eq!(out.len(), BUCKET_HEADER_SIZE + self.used);

        let crc = checksum(&out[CHECKSUM_SIZE..]);
        out[..CHECKSUM_SIZE].copy_from_slice(&crc.to_le_bytes());

        buf[..out.len()].copy_from_slice(&out);
        buf[out.len()..].fill(0);
        Ok(())
    }

    /// Appends `entry` at the back, first evicting from the front until it
    /// fits. Returns the evicted entries, oldest first.
    ///
    /// # Errors
    ///
    /// [`BucketError::EntryTooLarge`] if the entry exceeds the capacity of
    /// an empty bucket. The bucket is left untouched in that case.
    pub fn insert(&mut self, entry: BucketEntry) -> Result<Vec<BucketEntry>, BucketError> {
        let size = entry.encoded_size();
        if size > self.capacity {
            return Err(BucketError::EntryTooLarge {
                size,
                capacity: self.capacity,
            });
        }

        let mut evicted = Vec::new();
        while self.remaining_bytes() < size {
            match self.entries.pop_front() {
                Some(oldest) => {
                    self.used -= oldest.encoded_size();
                    evicted.push(oldest);
                }
                None => break,
            }
        }

        self.used += size;
        self.entries.push_back(entry);
        Ok(evicted)
    }

    /// Removes the entry whose key equals `key` byte for byte.
    pub fn remove(&mut self, key: &[u8]) -> Option<BucketEntry> {
        let pos = self.entries.iter().position(|e| e.key == key)?;
        let removed = self.entries.remove(pos)?;
        self.used -= removed.encoded_size();
        Some(removed)
    }

    /// Finds the entry whose key equals `key` byte for byte.
    pub fn find(&self, key: &[u8]) -> Option<&BucketEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Entries in insertion order, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &BucketEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Entry bytes currently stored.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// Bytes available to entries in an empty bucket.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining_bytes(&self) -> usize {
        self.capacity - self.used
    }
}

fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(bytes);
    hasher.finalize()
}
