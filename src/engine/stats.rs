//! Occupancy counters and operation telemetry.
//!
//! Counters are plain atomics updated outside the bucket locks. A reader
//! may observe them between the steps of one operation, but they settle
//! on the values left by the last completed operation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the engine counters returned by
/// [`BigHash::stats`](super::BigHash::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BigHashStats {
    /// Entries believed to be stored, expired ones included.
    pub item_count: u64,
    /// Encoded bytes of those entries (headers included).
    pub used_size_bytes: u64,
    pub lookups: u64,
    pub lookup_hits: u64,
    pub inserts: u64,
    pub insert_successes: u64,
    pub removes: u64,
    pub remove_successes: u64,
    /// Entries evicted to make room for newer ones.
    pub evictions: u64,
    pub bloom_probes: u64,
    /// Probes answered "definitely absent" without a device read.
    pub bloom_rejects: u64,
    /// Buckets that failed checksum or structural validation on read.
    pub checksum_errors: u64,
    pub io_errors: u64,
    /// Bytes written to the device by bucket rewrites.
    pub physical_written_bytes: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) item_count: AtomicU64,
    pub(crate) used_size_bytes: AtomicU64,
    pub(crate) lookups: AtomicU64,
    pub(crate) lookup_hits: AtomicU64,
    pub(crate) inserts: AtomicU64,
    pub(crate) insert_successes: AtomicU64,
    pub(crate) removes: AtomicU64,
    pub(crate) remove_successes: AtomicU64,
    pub(crate) evictions: AtomicU64,
    pub(crate) bloom_probes: AtomicU64,
    pub(crate) bloom_rejects: AtomicU64,
    pub(crate) checksum_errors: AtomicU64,
    pub(crate) io_errors: AtomicU64,
    pub(crate) physical_written_bytes: AtomicU64,
}

impl Counters {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Subtracts without wrapping below zero.
    pub(crate) fn sub(counter: &AtomicU64, n: u64) {
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_sub(n))
        });
    }

    /// Accounts for one entry entering the engine.
    pub(crate) fn entry_added(&self, encoded_size: usize) {
        Self::incr(&self.item_count);
        Self::add(&self.used_size_bytes, encoded_size as u64);
    }

    /// Accounts for one entry leaving the engine.
    pub(crate) fn entry_dropped(&self, encoded_size: usize) {
        Self::sub(&self.item_count, 1);
        Self::sub(&self.used_size_bytes, encoded_size as u64);
    }

    /// Drops occupancy that left the engine without a per-entry account,
    /// such as the contents of a corrupt bucket.
    pub(crate) fn retire(&self, items: u64, bytes: u64) {
        Self::sub(&self.item_count, items);
        Self::sub(&self.used_size_bytes, bytes);
    }

    /// Overwrites the occupancy counters. Operation counters are left
    /// alone.
    pub(crate) fn set_occupancy(&self, item_count: u64, used_size_bytes: u64) {
        self.item_count.store(item_count, Ordering::Relaxed);
        self.used_size_bytes.store(used_size_bytes, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BigHashStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        BigHashStats {
            item_count: load(&self.item_count),
            used_size_bytes: load(&self.used_size_bytes),
            lookups: load(&self.lookups),
            lookup_hits: load(&self.lookup_hits),
            inserts: load(&self.inserts),
            insert_successes: load(&self.insert_successes),
            removes: load(&self.removes),
            remove_successes: load(&self.remove_successes),
            evictions: load(&self.evictions),
            bloom_probes: load(&self.bloom_probes),
            bloom_rejects: load(&self.bloom_rejects),
            checksum_errors: load(&self.checksum_errors),
            io_errors: load(&self.io_errors),
            physical_written_bytes: load(&self.physical_written_bytes),
        }
    }
}
