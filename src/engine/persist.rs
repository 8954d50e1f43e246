//! Persisted engine metadata.
//!
//! Bucket contents already live on the device, so persistence only covers
//! what is held in memory: the geometry fingerprint, the generation that
//! marks buckets as live, the occupancy counters and the bloom segments.
//!
//! # Stream layout
//!
//! ```text
//! [MAGIC "BHSH"][RECORD_LEN u32][RECORD][CRC32 u32]
//! ```
//!
//! The CRC covers `RECORD` only. `RECORD` begins with the format version
//! so an incompatible layout is rejected before anything else is decoded:
//!
//! ```text
//! [FORMAT_VERSION u32][BUCKET_SIZE u32][CACHE_START_OFFSET u64]
//! [CACHE_SIZE u64][NUM_BUCKETS u64][GENERATION u64]
//! [ITEM_COUNT u64][USED_SIZE_BYTES u64][BLOOM Option<[u32 count][segment]...>]
//! ```

use std::io::{self, Read, Write};

use crc32fast::Hasher as Crc32;

use crate::encoding::{self, Decode, Encode, EncodingError};

use super::BigHashError;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Leading bytes of every persisted stream.
pub const PERSIST_MAGIC: [u8; 4] = *b"BHSH";

/// Layout version of the persisted record. Bumped on any change to the
/// record or to the bucket format.
pub const FORMAT_VERSION: u32 = 10;

/// Upper bound on a record, checked before allocating for it.
const MAX_RECORD_LEN: u32 = 1 << 30;

// ------------------------------------------------------------------------------------------------
// Record
// ------------------------------------------------------------------------------------------------

/// Serialized bloom segments, one per bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BloomSnapshot(pub(crate) Vec<Vec<u8>>);

impl Encode for BloomSnapshot {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::encode_vec(&self.0, buf)
    }
}

impl Decode for BloomSnapshot {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (segments, n) = encoding::decode_vec::<Vec<u8>>(buf)?;
        Ok((Self(segments), n))
    }
}

/// Everything needed to bring a freshly constructed engine back to the
/// state it had when persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PersistedState {
    pub(crate) format_version: u32,
    pub(crate) bucket_size: u32,
    pub(crate) cache_start_offset: u64,
    pub(crate) cache_size: u64,
    pub(crate) num_buckets: u64,
    pub(crate) generation: u64,
    pub(crate) item_count: u64,
    pub(crate) used_size_bytes: u64,
    pub(crate) bloom: Option<BloomSnapshot>,
}

impl Encode for PersistedState {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.format_version.encode_to(buf)?;
        self.bucket_size.encode_to(buf)?;
        self.cache_start_offset.encode_to(buf)?;
        self.cache_size.encode_to(buf)?;
        self.num_buckets.encode_to(buf)?;
        self.generation.encode_to(buf)?;
        self.item_count.encode_to(buf)?;
        self.used_size_bytes.encode_to(buf)?;
        self.bloom.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for PersistedState {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (format_version, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (bucket_size, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (cache_start_offset, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (cache_size, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (num_buckets, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (generation, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (item_count, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (used_size_bytes, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (bloom, n) = Option::<BloomSnapshot>::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                format_version,
                bucket_size,
                cache_start_offset,
                cache_size,
                num_buckets,
                generation,
                item_count,
                used_size_bytes,
                bloom,
            },
            offset,
        ))
    }
}

impl PersistedState {
    /// Decodes a record read by [`read_frame`], checking the format
    /// version before the rest of the layout is trusted.
    pub(crate) fn from_record(record: &[u8]) -> Result<Self, BigHashError> {
        let (version, _) = u32::decode_from(record)?;
        if version != FORMAT_VERSION {
            return Err(BigHashError::RecoveryFormatMismatch(format!(
                "format version {version}, expected {FORMAT_VERSION}"
            )));
        }
        let (state, consumed) = Self::decode_from(record)?;
        if consumed != record.len() {
            return Err(BigHashError::Corrupt(format!(
                "{} trailing bytes after persisted record",
                record.len() - consumed
            )));
        }
        Ok(state)
    }
}

// ------------------------------------------------------------------------------------------------
// Framing
// ------------------------------------------------------------------------------------------------

/// Writes `record` framed with magic, length and checksum.
pub(crate) fn write_frame(writer: &mut impl Write, record: &[u8]) -> Result<(), BigHashError> {
    let len = u32::try_from(record.len())
        .ok()
        .filter(|len| *len <= MAX_RECORD_LEN)
        .ok_or_else(|| {
            BigHashError::Internal(format!(
                "persisted record of {} bytes exceeds {MAX_RECORD_LEN}",
                record.len()
            ))
        })?;

    let mut hasher = Crc32::new();
    hasher.update(record);
    let checksum = hasher.finalize();

    writer.write_all(&PERSIST_MAGIC)?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(record)?;
    writer.write_all(&checksum.to_le_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Reads one framed record and verifies its magic and checksum.
pub(crate) fn read_frame(reader: &mut impl Read) -> Result<Vec<u8>, BigHashError> {
    let mut magic = [0u8; 4];
    read_exact(reader, &mut magic)?;
    if magic != PERSIST_MAGIC {
        return Err(BigHashError::RecoveryFormatMismatch(format!(
            "bad magic {magic:02x?}"
        )));
    }

    let mut len = [0u8; 4];
    read_exact(reader, &mut len)?;
    let len = u32::from_le_bytes(len);
    if len > MAX_RECORD_LEN {
        return Err(BigHashError::Corrupt(format!(
            "persisted record length {len} exceeds {MAX_RECORD_LEN}"
        )));
    }

    let mut record = vec![0u8; len as usize];
    read_exact(reader, &mut record)?;

    let mut stored = [0u8; 4];
    read_exact(reader, &mut stored)?;
    let stored = u32::from_le_bytes(stored);

    let mut hasher = Crc32::new();
    hasher.update(&record);
    let computed = hasher.finalize();
    if stored != computed {
        return Err(BigHashError::Corrupt(format!(
            "persisted record checksum mismatch (stored {stored:#010x}, computed {computed:#010x})"
        )));
    }

    Ok(record)
}

fn read_exact(reader: &mut impl Read, buf: &mut [u8]) -> Result<(), BigHashError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            BigHashError::Corrupt("persisted stream is truncated".into())
        }
        _ => BigHashError::Io(e),
    })
}
