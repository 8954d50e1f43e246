//! Key and index newtypes shared by every layer of the engine.
//!
//! [`BucketId`] and [`ShardIndex`] are deliberately distinct types: a bucket
//! index is never a byte offset and never a lock slot. Conversions are
//! explicit method calls ([`BucketId::new`], [`BucketId::index`]) so a raw
//! integer cannot flow into the wrong role by accident.

use crc32fast::Hasher as Crc32;

/// Seed for the upper 32 bits of [`HashedKey::new`].
const HASH_SEED_HI: u32 = 0x9E37_79B9;

/// Seed for the lower 32 bits of [`HashedKey::new`].
const HASH_SEED_LO: u32 = 0x85EB_CA6B;

// ------------------------------------------------------------------------------------------------
// HashedKey
// ------------------------------------------------------------------------------------------------

/// An immutable key together with its 64-bit hash.
///
/// The hash is computed once, by the caller, and reused for bucket
/// selection and bloom filter probes. The engine never re-hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedKey {
    key: Vec<u8>,
    hash: u64,
}

impl HashedKey {
    /// Hashes `key` with the crate's default hash.
    ///
    /// The hash is two seeded CRC32 passes concatenated into 64 bits. It
    /// is stable across builds and platforms, which matters because the
    /// bucket a key lands in must not change across restarts.
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        let key = key.into();
        let hash = default_hash(&key);
        Self { key, hash }
    }

    /// Wraps a key with a hash the caller already computed.
    pub fn with_hash(key: impl Into<Vec<u8>>, hash: u64) -> Self {
        Self {
            key: key.into(),
            hash,
        }
    }

    /// Raw key bytes.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Precomputed 64-bit hash of the key.
    pub fn key_hash(&self) -> u64 {
        self.hash
    }
}

fn default_hash(key: &[u8]) -> u64 {
    let mut hi = Crc32::new_with_initial(HASH_SEED_HI);
    hi.update(key);
    let mut lo = Crc32::new_with_initial(HASH_SEED_LO);
    lo.update(key);
    (u64::from(hi.finalize()) << 32) | u64::from(lo.finalize())
}

// ------------------------------------------------------------------------------------------------
// BucketId
// ------------------------------------------------------------------------------------------------

/// Index of a bucket in `[0, num_buckets)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketId(u32);

impl BucketId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw bucket number. Callers turn it into an offset or a lock
    /// slot through the engine, never directly.
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for BucketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bucket#{}", self.0)
    }
}

// ------------------------------------------------------------------------------------------------
// ShardIndex
// ------------------------------------------------------------------------------------------------

/// Slot in the lock shard table. Only produced by
/// [`ShardTable::shard_of`](crate::shard::ShardTable::shard_of).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardIndex(usize);

impl ShardIndex {
    pub(crate) const fn new(slot: usize) -> Self {
        Self(slot)
    }

    pub const fn slot(self) -> usize {
        self.0
    }
}

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------
