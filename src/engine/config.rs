//! Engine configuration and its validation.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::bloom::BloomFilter;
use crate::bucket::{BUCKET_HEADER_SIZE, ENTRY_HEADER_SIZE, EntryView};
use crate::device::Device;
use crate::shard::DEFAULT_NUM_SHARDS;

use super::BigHashError;

/// Default bucket size: one 4 KiB device page.
pub const DEFAULT_BUCKET_SIZE: u32 = 4096;

/// Why an entry is handed to the destructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestructorEvent {
    /// Evicted from a full bucket to make room for a newer entry.
    Recycled,
    /// Removed explicitly or superseded by an insert of the same key.
    Removed,
}

/// Decides whether a stored entry has expired.
pub type ExpiredCheck = Arc<dyn Fn(EntryView<'_>) -> bool + Send + Sync>;

/// Called with `(key, value, event)` for every entry that leaves the
/// engine. Runs while the bucket lock is held: it must not block for long
/// and must not call back into the engine.
pub type DestructorCallback = Arc<dyn Fn(&[u8], &[u8], DestructorEvent) + Send + Sync>;

/// Seconds since the UNIX epoch, saturated into `u32`.
pub(crate) fn now_secs() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    u32::try_from(secs).unwrap_or(u32::MAX)
}

/// Expired when an expiry is set and it is not in the future.
pub fn default_expired_check(entry: EntryView<'_>) -> bool {
    entry.expiry_time != 0 && entry.expiry_time <= now_secs()
}

/// Configuration for a [`BigHash`](super::BigHash) instance.
///
/// Immutable once handed to [`BigHash::new`](super::BigHash::new), which
/// calls [`validate`](Self::validate) before allocating anything.
pub struct BigHashConfig {
    /// Size of every bucket in bytes.
    pub bucket_size: u32,

    /// Byte offset of the first bucket on the device.
    pub cache_start_offset: u64,

    /// Bytes of device reserved for buckets, starting at
    /// `cache_start_offset`. Any remainder past the last whole bucket is
    /// never addressed.
    pub cache_size: u64,

    /// Backing device. Shared; it outlives the engine.
    pub device: Arc<dyn Device>,

    /// Number of bucket locks. Must be a power of two; see
    /// [`ShardTable::recommended_shards`](crate::shard::ShardTable::recommended_shards).
    pub num_shards: usize,

    /// Expiry predicate applied on lookup and random sampling.
    pub expired_check: ExpiredCheck,

    /// Called for every evicted or removed entry.
    pub destructor: DestructorCallback,

    /// Optional per-bucket bloom filter. Must have exactly one segment
    /// per bucket.
    pub bloom_filter: Option<BloomFilter>,
}

impl BigHashConfig {
    /// Defaults covering the whole device with 4 KiB buckets, no bloom
    /// filter and a no-op destructor.
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self {
            bucket_size: DEFAULT_BUCKET_SIZE,
            cache_start_offset: 0,
            cache_size: device.size(),
            device,
            num_shards: DEFAULT_NUM_SHARDS,
            expired_check: Arc::new(default_expired_check),
            destructor: Arc::new(|_: &[u8], _: &[u8], _: DestructorEvent| {}),
            bloom_filter: None,
        }
    }

    /// Whole buckets that fit in the cache region.
    pub fn num_buckets(&self) -> u64 {
        if self.bucket_size == 0 {
            return 0;
        }
        self.cache_size / u64::from(self.bucket_size)
    }

    /// Checks every invariant the engine relies on.
    ///
    /// # Errors
    ///
    /// [`BigHashError::InvalidConfig`] describing the first violation.
    pub fn validate(&self) -> Result<(), BigHashError> {
        if self.bucket_size == 0 {
            return Err(BigHashError::InvalidConfig("bucket_size must be > 0".into()));
        }
        let min_bucket = BUCKET_HEADER_SIZE + ENTRY_HEADER_SIZE;
        if (self.bucket_size as usize) <= min_bucket {
            return Err(BigHashError::InvalidConfig(format!(
                "bucket_size {} must exceed header overhead of {min_bucket} bytes",
                self.bucket_size
            )));
        }
        if !self.num_shards.is_power_of_two() {
            return Err(BigHashError::InvalidConfig(format!(
                "num_shards {} is not a power of two",
                self.num_shards
            )));
        }
        if self.cache_size < u64::from(self.bucket_size) {
            return Err(BigHashError::InvalidConfig(format!(
                "cache_size {} is smaller than one bucket ({} bytes)",
                self.cache_size, self.bucket_size
            )));
        }

        let device_size = self.device.size();
        let region_end = self.cache_start_offset.checked_add(self.cache_size);
        if !matches!(region_end, Some(end) if end <= device_size) {
            return Err(BigHashError::InvalidConfig(format!(
                "cache region [{}, +{}) lies outside device of {device_size} bytes",
                self.cache_start_offset, self.cache_size
            )));
        }

        let num_buckets = self.num_buckets();
        if num_buckets > u64::from(u32::MAX) {
            return Err(BigHashError::InvalidConfig(format!(
                "{num_buckets} buckets exceed the addressable maximum of {}",
                u32::MAX
            )));
        }

        if let Some(bloom) = &self.bloom_filter
            && bloom.num_segments() as u64 != num_buckets
        {
            return Err(BigHashError::InvalidConfig(format!(
                "bloom filter has {} segments, expected one per bucket ({num_buckets})",
                bloom.num_segments()
            )));
        }

        Ok(())
    }
}

impl std::fmt::Debug for BigHashConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigHashConfig")
            .field("bucket_size", &self.bucket_size)
            .field("cache_start_offset", &self.cache_start_offset)
            .field("cache_size", &self.cache_size)
            .field("device_size", &self.device.size())
            .field("num_shards", &self.num_shards)
            .field("bloom_filter", &self.bloom_filter)
            .finish_non_exhaustive()
    }
}
