//! # BigHash engine
//!
//! A set-associative cache for small objects. The cache region of a
//! device is cut into equal buckets; a key lives in bucket
//! `hash % num_buckets` and nowhere else. There is no in-memory index:
//! every operation reads its bucket from the device, works on the decoded
//! copy and, for mutations, writes the whole bucket back.
//!
//! ## Per-operation protocol
//!
//! 1. Compute the bucket from the key hash.
//! 2. If a bloom filter is configured and rejects the hash, a lookup or
//!    remove returns "absent" without touching the device.
//! 3. Take the bucket's shard lock: shared for lookups, exclusive for
//!    inserts and removes. It is held until the operation ends.
//! 4. Read and decode the bucket. Stale buckets (older generation) decode
//!    as empty. Corrupt buckets are logged, counted and treated as empty.
//! 5. For mutations: apply the change (evicting oldest entries first if
//!    needed), write the bucket back, rebuild the bloom segment from the
//!    surviving entries, adjust counters and run the destructor.
//!
//! ## Whole-engine operations
//!
//! [`BigHash::reset`], [`BigHash::persist`] and [`BigHash::recover`] take no
//! bucket locks. The caller must make sure no per-key operation is in
//! flight while they run.
//!
//! ## Failure semantics
//!
//! A failed device write leaves that bucket in an undefined state: old
//! bytes, new bytes or a torn mix. The bucket checksum catches the torn
//! case on the next read. Counters are only adjusted after a successful
//! write, and the bloom segment is widened rather than rebuilt so it still
//! covers both the old and the new contents.

mod config;
mod persist;
mod stats;

pub use config::{
    BigHashConfig, DEFAULT_BUCKET_SIZE, DestructorCallback, DestructorEvent, ExpiredCheck,
    default_expired_check,
};
pub use persist::{FORMAT_VERSION, PERSIST_MAGIC};
pub use stats::BigHashStats;

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::bloom::{BloomError, BloomFilter};
use crate::bucket::{BUCKET_HEADER_SIZE, Bucket, BucketEntry, BucketError, ENTRY_HEADER_SIZE};
use crate::device::{Device, DeviceError};
use crate::encoding::{self, EncodingError};
use crate::shard::ShardTable;
use crate::types::{BucketId, HashedKey};

use config::now_secs;
use persist::{BloomSnapshot, PersistedState};
use stats::Counters;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Buckets sampled by [`BigHash::random_alloc`] before giving up.
pub const RANDOM_ALLOC_ATTEMPTS: usize = 16;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`BigHash`] operations.
///
/// A missing key is not an error: lookups return `Ok(None)` and removes
/// return `Ok(false)`.
#[derive(Debug, Error)]
pub enum BigHashError {
    /// Key and value together exceed [`BigHash::max_item_size`].
    #[error("item of {size} bytes exceeds maximum item size {max}")]
    ItemTooLarge { size: u64, max: u64 },

    /// Caller passed a value the engine cannot represent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration rejected by [`BigHashConfig::validate`].
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Device read, write or flush failed.
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Persisted state has an unknown version or was written for a
    /// different geometry.
    #[error("recovery format mismatch: {0}")]
    RecoveryFormatMismatch(String),

    /// On-device or persisted bytes failed validation.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// Encoding / decoding error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Bloom filter state could not be restored.
    #[error("Bloom filter error: {0}")]
    Bloom(#[from] BloomError),

    /// Stream I/O error during persist or recover.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant violation (poisoned lock, unexpected state, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<BucketError> for BigHashError {
    fn from(e: BucketError) -> Self {
        match e {
            BucketError::EntryTooLarge { size, capacity } => BigHashError::ItemTooLarge {
                size: size as u64,
                max: capacity.saturating_sub(ENTRY_HEADER_SIZE) as u64,
            },
            BucketError::Encoding(e) => BigHashError::Encoding(e),
            other => BigHashError::Corrupt(other.to_string()),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Public types
// ------------------------------------------------------------------------------------------------

/// An entry returned by [`BigHash::random_alloc`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Absolute expiry in seconds since the UNIX epoch; `0` never expires.
    pub expiry_time: u32,
}

/// Occupancy claimed by a corrupt bucket that was read as empty.
#[derive(Debug, Clone, Copy)]
struct Discarded {
    items: u64,
    bytes: u64,
}

// ------------------------------------------------------------------------------------------------
// BigHash
// ------------------------------------------------------------------------------------------------

/// The small-object cache engine.
///
/// `BigHash` is `Send + Sync`; share it across threads with an `Arc`.
pub struct BigHash {
    bucket_size: u32,
    cache_start_offset: u64,
    cache_size: u64,
    num_buckets: u32,

    device: Arc<dyn Device>,
    shards: ShardTable,
    bloom: Option<BloomFilter>,
    expired_check: ExpiredCheck,
    destructor: DestructorCallback,

    /// Stamp written into every bucket header. Buckets carrying any other
    /// value read as empty.
    generation: AtomicU64,

    counters: Counters,
}

impl std::fmt::Debug for BigHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigHash")
            .field("bucket_size", &self.bucket_size)
            .field("cache_start_offset", &self.cache_start_offset)
            .field("cache_size", &self.cache_size)
            .field("num_buckets", &self.num_buckets)
            .field("num_shards", &self.shards.len())
            .field("bloom", &self.bloom)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl BigHash {
    // --------------------------------------------------------------------------------------------
    // Lifecycle
    // --------------------------------------------------------------------------------------------

    /// Builds an engine over the configured device region.
    ///
    /// The engine starts empty under a fresh generation: whatever the
    /// region held before is ignored unless [`recover`](Self::recover) is
    /// called with state persisted from a matching configuration.
    pub fn new(config: BigHashConfig) -> Result<Self, BigHashError> {
        config.validate()?;

        let num_buckets = u32::try_from(config.num_buckets())
            .map_err(|_| BigHashError::InvalidConfig("too many buckets".into()))?;
        let shards = ShardTable::new(config.num_shards).ok_or_else(|| {
            BigHashError::InvalidConfig(format!(
                "num_shards {} is not a power of two",
                config.num_shards
            ))
        })?;

        info!(
            bucket_size = config.bucket_size,
            cache_start_offset = config.cache_start_offset,
            cache_size = config.cache_size,
            num_buckets,
            num_shards = config.num_shards,
            bloom = config.bloom_filter.is_some(),
            "bighash created"
        );

        Ok(Self {
            bucket_size: config.bucket_size,
            cache_start_offset: config.cache_start_offset,
            cache_size: config.cache_size,
            num_buckets,
            device: config.device,
            shards,
            bloom: config.bloom_filter,
            expired_check: config.expired_check,
            destructor: config.destructor,
            generation: AtomicU64::new(now_nanos()),
            counters: Counters::default(),
        })
    }

    // --------------------------------------------------------------------------------------------
    // Geometry
    // --------------------------------------------------------------------------------------------

    fn bucket_id(&self, key: &HashedKey) -> BucketId {
        // num_buckets fits in u32, so the remainder does too.
        BucketId::new((key.key_hash() % u64::from(self.num_buckets)) as u32)
    }

    fn bucket_offset(&self, bucket: BucketId) -> u64 {
        self.cache_start_offset + u64::from(self.bucket_size) * u64::from(bucket.index())
    }

    /// Bytes managed by the engine: whole buckets only.
    pub fn size(&self) -> u64 {
        u64::from(self.bucket_size) * u64::from(self.num_buckets)
    }

    pub fn num_buckets(&self) -> u64 {
        u64::from(self.num_buckets)
    }

    pub fn bucket_size(&self) -> u32 {
        self.bucket_size
    }

    /// Largest `key.len() + value.len()` that fits in an empty bucket.
    pub fn max_item_size(&self) -> u64 {
        (self.bucket_size as usize - BUCKET_HEADER_SIZE - ENTRY_HEADER_SIZE) as u64
    }

    /// Device bytes written by an insert of this item. Every mutation
    /// rewrites one whole bucket, whatever the item size.
    pub fn estimate_write_size(&self, _key: &HashedKey, _value: &[u8]) -> u64 {
        u64::from(self.bucket_size)
    }

    // --------------------------------------------------------------------------------------------
    // Lock and device helpers
    // --------------------------------------------------------------------------------------------

    fn read_guard(&self, bucket: BucketId) -> Result<std::sync::RwLockReadGuard<'_, ()>, BigHashError> {
        self.shards
            .lock_for(bucket)
            .read()
            .map_err(|_| BigHashError::Internal("RwLock poisoned".into()))
    }

    fn write_guard(
        &self,
        bucket: BucketId,
    ) -> Result<std::sync::RwLockWriteGuard<'_, ()>, BigHashError> {
        self.shards
            .lock_for(bucket)
            .write()
            .map_err(|_| BigHashError::Internal("RwLock poisoned".into()))
    }

    /// Bloom probe. `true` when no filter is configured.
    fn bloom_may_contain(&self, bucket: BucketId, key_hash: u64) -> bool {
        match &self.bloom {
            Some(bloom) => {
                Counters::incr(&self.counters.bloom_probes);
                let maybe = bloom.may_contain(bucket, key_hash);
                if !maybe {
                    Counters::incr(&self.counters.bloom_rejects);
                }
                maybe
            }
            None => true,
        }
    }

    /// Reads and decodes a bucket. Caller holds its shard lock.
    ///
    /// A corrupt bucket comes back empty together with the occupancy its
    /// header claimed. Mutations retire that occupancy from the counters
    /// once the repaired bucket is written.
    fn read_bucket(
        &self,
        bucket: BucketId,
    ) -> Result<(Bucket, Option<Discarded>), BigHashError> {
        let generation = self.generation.load(Ordering::Acquire);
        let mut buf = vec![0u8; self.bucket_size as usize];
        if let Err(e) = self.device.read_at(self.bucket_offset(bucket), &mut buf) {
            Counters::incr(&self.counters.io_errors);
            error!(%bucket, error = %e, "bucket read failed");
            return Err(e.into());
        }

        match Bucket::decode(&buf, generation) {
            Ok(decoded) => Ok((decoded, None)),
            Err(e) => {
                Counters::incr(&self.counters.checksum_errors);
                warn!(%bucket, error = %e, "corrupt bucket treated as empty");
                let (items, bytes) = Bucket::claimed_occupancy(&buf, generation);
                Ok((
                    Bucket::new(generation, self.bucket_size as usize),
                    Some(Discarded { items, bytes }),
                ))
            }
        }
    }

    fn retire(&self, bucket: BucketId, discarded: Option<Discarded>) {
        if let Some(Discarded { items, bytes }) = discarded {
            debug!(%bucket, items, bytes, "corrupt bucket rewritten");
            self.counters.retire(items, bytes);
        }
    }

    /// Encodes and writes a bucket. Caller holds its shard lock
    /// exclusively.
    fn write_bucket(&self, bucket: BucketId, contents: &Bucket) -> Result<(), BigHashError> {
        let mut buf = vec![0u8; self.bucket_size as usize];
        contents.encode_into(&mut buf)?;
        if let Err(e) = self.device.write_at(self.bucket_offset(bucket), &buf) {
            Counters::incr(&self.counters.io_errors);
            error!(%bucket, error = %e, "bucket write failed");
            return Err(e.into());
        }
        Counters::add(
            &self.counters.physical_written_bytes,
            u64::from(self.bucket_size),
        );
        Ok(())
    }

    fn rebuild_bloom(&self, bucket: BucketId, contents: &Bucket) {
        if let Some(bloom) = &self.bloom {
            bloom.rebuild(bucket, contents.entries().map(|e| e.key_hash));
        }
    }

    fn is_expired(&self, entry: &BucketEntry) -> bool {
        (self.expired_check)(entry.view())
    }

    // --------------------------------------------------------------------------------------------
    // Point operations
    // --------------------------------------------------------------------------------------------

    /// `false` only if the bloom filter proves the key absent. Never
    /// touches the device; always `true` without a bloom filter.
    pub fn could_exist(&self, key: &HashedKey) -> bool {
        self.bloom_may_contain(self.bucket_id(key), key.key_hash())
    }

    /// Looks up a key.
    ///
    /// Returns `Ok(Some(value))` on a hit and `Ok(None)` if the key is
    /// absent or expired. Expired entries are left in place.
    pub fn lookup(&self, key: &HashedKey) -> Result<Option<Vec<u8>>, BigHashError> {
        Counters::incr(&self.counters.lookups);
        let bucket = self.bucket_id(key);
        trace!(%bucket, key_len = key.key().len(), "bighash lookup");

        if !self.bloom_may_contain(bucket, key.key_hash()) {
            return Ok(None);
        }

        let _guard = self.read_guard(bucket)?;
        let (contents, _) = self.read_bucket(bucket)?;
        match contents.find(key.key()) {
            Some(entry) if !self.is_expired(entry) => {
                Counters::incr(&self.counters.lookup_hits);
                Ok(Some(entry.value.clone()))
            }
            _ => Ok(None),
        }
    }

    /// Inserts or replaces a key with no expiry.
    pub fn insert(&self, key: &HashedKey, value: &[u8]) -> Result<(), BigHashError> {
        self.insert_entry(key, value, 0)
    }

    /// Inserts or replaces a key that expires `ttl` from now.
    pub fn insert_with_ttl(
        &self,
        key: &HashedKey,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), BigHashError> {
        let ttl = u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX);
        self.insert_entry(key, value, now_secs().saturating_add(ttl))
    }

    fn insert_entry(
        &self,
        key: &HashedKey,
        value: &[u8],
        expiry_time: u32,
    ) -> Result<(), BigHashError> {
        Counters::incr(&self.counters.inserts);

        if key.key().len() > usize::from(u16::MAX) {
            return Err(BigHashError::InvalidArgument(format!(
                "key length {} exceeds {}",
                key.key().len(),
                u16::MAX
            )));
        }
        let item_size = (key.key().len() + value.len()) as u64;
        if item_size > self.max_item_size() {
            return Err(BigHashError::ItemTooLarge {
                size: item_size,
                max: self.max_item_size(),
            });
        }

        let bucket = self.bucket_id(key);
        trace!(
            %bucket,
            key_len = key.key().len(),
            value_len = value.len(),
            "bighash insert"
        );

        let _guard = self.write_guard(bucket)?;
        let (mut contents, discarded) = self.read_bucket(bucket)?;

        let replaced = contents.remove(key.key());
        let entry = BucketEntry {
            key_hash: key.key_hash(),
            expiry_time,
            key: key.key().to_vec(),
            value: value.to_vec(),
        };
        let entry_size = entry.encoded_size();
        let evicted = contents.insert(entry)?;

        if let Err(e) = self.write_bucket(bucket, &contents) {
            if let Some(bloom) = &self.bloom {
                bloom.add(bucket, key.key_hash());
            }
            return Err(e);
        }
        self.rebuild_bloom(bucket, &contents);
        self.retire(bucket, discarded);

        if let Some(old) = replaced {
            self.counters.entry_dropped(old.encoded_size());
            (self.destructor)(&old.key, &old.value, DestructorEvent::Removed);
        }
        for victim in &evicted {
            self.counters.entry_dropped(victim.encoded_size());
            Counters::incr(&self.counters.evictions);
            (self.destructor)(&victim.key, &victim.value, DestructorEvent::Recycled);
        }
        self.counters.entry_added(entry_size);
        Counters::incr(&self.counters.insert_successes);

        if !evicted.is_empty() {
            trace!(%bucket, evicted = evicted.len(), "bighash evicted");
        }
        Ok(())
    }

    /// Removes a key.
    ///
    /// An expired entry is dropped from its bucket like any other, but the
    /// call reports `false` because the key was already invisible.
    /// Returns `Ok(false)` if the key was not present.
    pub fn remove(&self, key: &HashedKey) -> Result<bool, BigHashError> {
        Counters::incr(&self.counters.removes);
        let bucket = self.bucket_id(key);
        trace!(%bucket, key_len = key.key().len(), "bighash remove");

        if !self.bloom_may_contain(bucket, key.key_hash()) {
            return Ok(false);
        }

        let _guard = self.write_guard(bucket)?;
        let (mut contents, discarded) = self.read_bucket(bucket)?;
        let Some(removed) = contents.remove(key.key()) else {
            if discarded.is_some() {
                self.write_bucket(bucket, &contents)?;
                self.rebuild_bloom(bucket, &contents);
                self.retire(bucket, discarded);
            }
            return Ok(false);
        };

        self.write_bucket(bucket, &contents)?;
        self.rebuild_bloom(bucket, &contents);

        self.counters.entry_dropped(removed.encoded_size());
        (self.destructor)(&removed.key, &removed.value, DestructorEvent::Removed);

        if self.is_expired(&removed) {
            return Ok(false);
        }
        Counters::incr(&self.counters.remove_successes);
        Ok(true)
    }

    /// Samples a live entry from a random bucket.
    ///
    /// Tries up to [`RANDOM_ALLOC_ATTEMPTS`] buckets and returns `Ok(None)`
    /// if all of them are empty or hold only expired entries. Buckets are
    /// picked uniformly, so entries in sparse buckets are favoured.
    pub fn random_alloc(&self) -> Result<Option<RandomEntry>, BigHashError> {
        let mut rng = rand::rng();
        for _ in 0..RANDOM_ALLOC_ATTEMPTS {
            let bucket = BucketId::new(rng.random_range(0..self.num_buckets));
            let _guard = self.read_guard(bucket)?;
            let (contents, _) = self.read_bucket(bucket)?;

            let live: Vec<&BucketEntry> =
                contents.entries().filter(|e| !self.is_expired(e)).collect();
            if live.is_empty() {
                continue;
            }
            let picked = live[rng.random_range(0..live.len())];
            return Ok(Some(RandomEntry {
                key: picked.key.clone(),
                value: picked.value.clone(),
                expiry_time: picked.expiry_time,
            }));
        }
        Ok(None)
    }

    // --------------------------------------------------------------------------------------------
    // Whole-engine operations
    // --------------------------------------------------------------------------------------------

    /// Flushes device write buffers. Bucket contents are already on the
    /// device; nothing is rewritten.
    pub fn flush(&self) -> Result<(), BigHashError> {
        if let Err(e) = self.device.flush() {
            Counters::incr(&self.counters.io_errors);
            error!(error = %e, "device flush failed");
            return Err(e.into());
        }
        Ok(())
    }

    /// Logically empties the engine without rewriting the device.
    ///
    /// Advances the generation so every bucket on the device reads as
    /// stale, clears all bloom segments and zeroes the occupancy counters.
    /// No per-key operation may run concurrently.
    pub fn reset(&self) {
        let previous = self.generation.load(Ordering::Acquire);
        let next = now_nanos().max(previous.wrapping_add(1)).max(1);
        self.generation.store(next, Ordering::Release);

        if let Some(bloom) = &self.bloom {
            bloom.reset();
        }
        self.counters.set_occupancy(0, 0);
        info!(generation = next, "bighash reset");
    }

    /// Writes engine metadata to `writer`.
    ///
    /// Bucket contents are not copied; call [`flush`](Self::flush) first
    /// if they must be durable. No per-key operation may run
    /// concurrently.
    pub fn persist(&self, writer: &mut impl Write) -> Result<(), BigHashError> {
        let state = PersistedState {
            format_version: FORMAT_VERSION,
            bucket_size: self.bucket_size,
            cache_start_offset: self.cache_start_offset,
            cache_size: self.cache_size,
            num_buckets: u64::from(self.num_buckets),
            generation: self.generation.load(Ordering::Acquire),
            item_count: self.counters.item_count.load(Ordering::Relaxed),
            used_size_bytes: self.counters.used_size_bytes.load(Ordering::Relaxed),
            bloom: self.bloom.as_ref().map(|b| BloomSnapshot(b.to_segments())),
        };
        let record = encoding::encode_to_vec(&state)?;
        persist::write_frame(writer, &record)?;

        info!(
            item_count = state.item_count,
            used_size_bytes = state.used_size_bytes,
            record_len = record.len(),
            "bighash persisted"
        );
        Ok(())
    }

    /// Restores engine metadata written by [`persist`](Self::persist).
    ///
    /// All-or-nothing: the stream is fully validated before any state is
    /// replaced, and on error the engine is left as it was.
    ///
    /// # Errors
    ///
    /// - [`BigHashError::RecoveryFormatMismatch`] for an unknown format
    ///   version, a geometry that differs from this engine's, or missing
    ///   bloom state when a bloom filter is configured.
    /// - [`BigHashError::Corrupt`] for a truncated or checksum-failing
    ///   stream.
    /// - [`BigHashError::Bloom`] if the bloom segments do not fit this
    ///   engine's filter.
    pub fn recover(&self, reader: &mut impl Read) -> Result<(), BigHashError> {
        match self.try_recover(reader) {
            Ok(state) => {
                info!(
                    generation = state.generation,
                    item_count = state.item_count,
                    used_size_bytes = state.used_size_bytes,
                    "bighash recovered"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "bighash recovery rejected");
                Err(e)
            }
        }
    }

    fn try_recover(&self, reader: &mut impl Read) -> Result<PersistedState, BigHashError> {
        let record = persist::read_frame(reader)?;
        let state = PersistedState::from_record(&record)?;
        self.check_fingerprint(&state)?;

        match (&self.bloom, &state.bloom) {
            (Some(bloom), Some(snapshot)) => bloom.restore(&snapshot.0)?,
            (Some(_), None) => {
                return Err(BigHashError::RecoveryFormatMismatch(
                    "bloom filter configured but persisted state has none".into(),
                ));
            }
            // Without a filter every lookup reads the device, so persisted
            // segments are simply not needed.
            (None, _) => {}
        }

        self.generation.store(state.generation, Ordering::Release);
        self.counters
            .set_occupancy(state.item_count, state.used_size_bytes);
        Ok(state)
    }

    fn check_fingerprint(&self, state: &PersistedState) -> Result<(), BigHashError> {
        let mismatch = |field: &str, stored: u64, current: u64| {
            BigHashError::RecoveryFormatMismatch(format!(
                "{field}: persisted {stored}, configured {current}"
            ))
        };
        if state.bucket_size != self.bucket_size {
            return Err(mismatch(
                "bucket_size",
                u64::from(state.bucket_size),
                u64::from(self.bucket_size),
            ));
        }
        if state.cache_start_offset != self.cache_start_offset {
            return Err(mismatch(
                "cache_start_offset",
                state.cache_start_offset,
                self.cache_start_offset,
            ));
        }
        if state.cache_size != self.cache_size {
            return Err(mismatch("cache_size", state.cache_size, self.cache_size));
        }
        if state.num_buckets != u64::from(self.num_buckets) {
            return Err(mismatch(
                "num_buckets",
                state.num_buckets,
                u64::from(self.num_buckets),
            ));
        }
        if state.generation == 0 {
            return Err(BigHashError::Corrupt("persisted generation is zero".into()));
        }
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Counters
    // --------------------------------------------------------------------------------------------

    /// Entries currently counted, expired but unreclaimed ones included.
    pub fn item_count(&self) -> u64 {
        self.counters.item_count.load(Ordering::Relaxed)
    }

    /// Encoded bytes of the counted entries.
    pub fn used_size_bytes(&self) -> u64 {
        self.counters.used_size_bytes.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> BigHashStats {
        self.counters.snapshot()
    }

    /// Decoded contents of one bucket, read under its shared lock.
    #[cfg(test)]
    pub(crate) fn bucket_contents(&self, bucket: BucketId) -> Result<Bucket, BigHashError> {
        let _guard = self.read_guard(bucket)?;
        self.read_bucket(bucket).map(|(contents, _)| contents)
    }
}

/// Nanoseconds since the UNIX epoch, never zero. Zero is what an
/// untouched device holds, so it must never be a live generation.
fn now_nanos() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    u64::try_from(nanos).unwrap_or(u64::MAX).max(1)
}
