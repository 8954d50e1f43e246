//! # Lock shard table
//!
//! A fixed, power-of-two array of reader/writer locks shared by all
//! buckets. A bucket's lock is `shards[bucket & (N - 1)]`, so lock memory
//! is independent of the bucket count, at the price of unrelated buckets
//! that alias the same slot serializing against each other.
//!
//! # Sizing
//!
//! With `k` operations in flight spread uniformly over `N` slots, the
//! probability that any two of them share a slot is approximately
//! `1 - exp(-k(k-1) / 2N)` (the birthday bound).
//! [`ShardTable::recommended_shards`] inverts that to pick `N`.

#[cfg(test)]
mod tests;

use std::sync::RwLock;

use crate::types::{BucketId, ShardIndex};

/// Default shard count: comfortably below 1% collision probability for
/// a dozen concurrent operations.
pub const DEFAULT_NUM_SHARDS: usize = 16 * 1024;

/// Fixed array of bucket locks indexed by masking the bucket id.
#[derive(Debug)]
pub struct ShardTable {
    shards: Box<[RwLock<()>]>,
    mask: usize,
}

impl ShardTable {
    /// Allocates `num_shards` locks. Returns `None` unless `num_shards` is
    /// a non-zero power of two.
    pub fn new(num_shards: usize) -> Option<Self> {
        if !num_shards.is_power_of_two() {
            return None;
        }
        let shards = (0..num_shards).map(|_| RwLock::new(())).collect();
        Some(Self {
            shards,
            mask: num_shards - 1,
        })
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Slot guarding `bucket`.
    pub fn shard_of(&self, bucket: BucketId) -> ShardIndex {
        ShardIndex::new(bucket.index() as usize & self.mask)
    }

    /// The lock guarding `bucket`.
    pub fn lock_for(&self, bucket: BucketId) -> &RwLock<()> {
        &self.shards[self.shard_of(bucket).slot()]
    }

    /// Smallest power-of-two shard count for which `parallelism`
    /// concurrent operations collide with probability at most
    /// `collision_probability`.
    ///
    /// `collision_probability` is clamped into `(0, 1)`; `parallelism`
    /// below 2 can never collide and yields a single shard.
    pub fn recommended_shards(parallelism: usize, collision_probability: f64) -> usize {
        if parallelism < 2 {
            return 1;
        }
        let p = collision_probability.clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON);
        let k = parallelism as f64;
        let pairs = k * (k - 1.0) / 2.0;
        let n = (pairs / -(1.0 - p).ln()).ceil();
        if n >= (usize::MAX >> 1) as f64 {
            return 1usize << (usize::BITS - 1);
        }
        (n as usize).max(1).next_power_of_two()
    }

    /// Birthday-bound collision probability for `parallelism` operations
    /// over `num_shards` slots.
    pub fn collision_probability(parallelism: usize, num_shards: usize) -> f64 {
        if parallelism < 2 || num_shards == 0 {
            return 0.0;
        }
        let k = parallelism as f64;
        1.0 - (-(k * (k - 1.0)) / (2.0 * num_shards as f64)).exp()
    }
}
