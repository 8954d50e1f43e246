//! # Per-bucket bloom filters
//!
//! One [`bloomfilter::Bloom`] segment per bucket, probed with the key hash
//! before the engine touches the device. A negative answer is definitive
//! and saves a full bucket read; a positive answer may be false.
//!
//! Segments are never updated incrementally on removal. After every
//! mutation of a bucket the engine calls [`BloomFilter::rebuild`] with the
//! hashes of the entries actually stored, so a segment can shrink as well
//! as grow and never drifts from the bucket contents.
//!
//! # Concurrency
//!
//! Each segment sits behind its own `RwLock`. Probes take the read side and
//! may run without the bucket's shard lock; rebuilds take the write side
//! and are issued while the engine holds the shard lock exclusively, so a
//! probe observes either the whole old segment or the whole new one.
//!
//! Poisoned segment locks are recovered with `PoisonError::into_inner`;
//! probes on a poisoned segment answer "maybe present".


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::sync::{PoisonError, RwLock};

use bloomfilter::Bloom;
use thiserror::Error;

use crate::types::BucketId;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by bloom filter construction and restore.
#[derive(Debug, Error)]
pub enum BloomError {
    /// Invalid sizing parameters.
    #[error("invalid bloom filter config: {0}")]
    InvalidConfig(String),

    /// Restored state has a different number of segments.
    #[error("segment count mismatch (expected {expected}, found {actual})")]
    SegmentCount { expected: usize, actual: usize },

    /// A restored segment has a different serialized size.
    #[error("segment {segment} size mismatch (expected {expected} bytes, found {actual})")]
    SegmentSize {
        segment: usize,
        expected: usize,
        actual: usize,
    },

    /// A restored segment could not be parsed.
    #[error("segment {segment} is malformed: {reason}")]
    Malformed { segment: usize, reason: String },
}

// ------------------------------------------------------------------------------------------------
// BloomFilter
// ------------------------------------------------------------------------------------------------

/// A fixed array of bloom segments, one per bucket.
pub struct BloomFilter {
    segments: Box<[RwLock<Bloom<u64>>]>,
    expected_items: usize,
    false_positive_rate: f64,
    segment_bytes: usize,
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("segments", &self.segments.len())
            .field("expected_items", &self.expected_items)
            .field("false_positive_rate", &self.false_positive_rate)
            .field("segment_bytes", &self.segment_bytes)
            .finish()
    }
}

impl BloomFilter {
    /// Creates `num_segments` empty segments, each sized for
    /// `expected_items` keys at the given false positive rate.
    ///
    /// # Errors
    ///
    /// [`BloomError::InvalidConfig`] if any parameter is zero or the rate
    /// is outside `(0.0, 1.0)`.
    pub fn new(
        num_segments: usize,
        expected_items: usize,
        false_positive_rate: f64,
    ) -> Result<Self, BloomError> {
        if num_segments == 0 {
            return Err(BloomError::InvalidConfig(
                "num_segments must be > 0".into(),
            ));
        }
        if expected_items == 0 {
            return Err(BloomError::InvalidConfig(
                "expected_items must be > 0".into(),
            ));
        }
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(BloomError::InvalidConfig(
                "false_positive_rate must be in (0.0, 1.0)".into(),
            ));
        }

        let mut segments = Vec::with_capacity(num_segments);
        for _ in 0..num_segments {
            let bloom = Bloom::new_for_fp_rate(expected_items, false_positive_rate)
                .map_err(|e| BloomError::InvalidConfig(e.to_string()))?;
            segments.push(RwLock::new(bloom));
        }
        let segment_bytes = segments
            .first()
            .map(|s| read(s).as_slice().len())
            .unwrap_or(0);

        Ok(Self {
            segments: segments.into_boxed_slice(),
            expected_items,
            false_positive_rate,
            segment_bytes,
        })
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Serialized size of a single segment, in bytes.
    pub fn segment_bytes(&self) -> usize {
        self.segment_bytes
    }

    /// Total serialized size of all segments, in bytes.
    pub fn byte_size(&self) -> usize {
        self.segment_bytes * self.segments.len()
    }

    /// Records `key_hash` in the bucket's segment.
    pub fn add(&self, bucket: BucketId, key_hash: u64) {
        if let Some(segment) = self.segment(bucket) {
            write(segment).set(&key_hash);
        }
    }

    /// `false` only if `key_hash` is definitely absent from the bucket.
    ///
    /// Buckets outside the filter answer `true`.
    pub fn may_contain(&self, bucket: BucketId, key_hash: u64) -> bool {
        match self.segment(bucket) {
            Some(segment) => match segment.read() {
                Ok(bloom) => bloom.check(&key_hash),
                Err(_) => true,
            },
            None => true,
        }
    }

    /// Empties the bucket's segment.
    pub fn clear(&self, bucket: BucketId) {
        if let Some(segment) = self.segment(bucket) {
            write(segment).clear();
        }
    }

    /// Replaces the bucket's segment with one holding exactly `hashes`.
    pub fn rebuild(&self, bucket: BucketId, hashes: impl IntoIterator<Item = u64>) {
        if let Some(segment) = self.segment(bucket) {
            let mut bloom = write(segment);
            bloom.clear();
            for hash in hashes {
                bloom.set(&hash);
            }
        }
    }

    /// Empties every segment.
    pub fn reset(&self) {
        for segment in self.segments.iter() {
            write(segment).clear();
        }
    }

    /// Serialized bytes of every segment, in bucket order.
    pub fn to_segments(&self) -> Vec<Vec<u8>> {
        self.segments
            .iter()
            .map(|s| read(s).as_slice().to_vec())
            .collect()
    }

    /// Replaces every segment with previously serialized state.
    ///
    /// All segments are parsed and validated before any is replaced; on
    /// error the filter is unchanged.
    pub fn restore(&self, segments: &[Vec<u8>]) -> Result<(), BloomError> {
        if segments.len() != self.segments.len() {
            return Err(BloomError::SegmentCount {
                expected: self.segments.len(),
                actual: segments.len(),
            });
        }

        let mut parsed = Vec::with_capacity(segments.len());
        for (i, bytes) in segments.iter().enumerate() {
            if bytes.len() != self.segment_bytes {
                return Err(BloomError::SegmentSize {
                    segment: i,
                    expected: self.segment_bytes,
                    actual: bytes.len(),
                });
            }
            let bloom = Bloom::from_slice(bytes).map_err(|e| BloomError::Malformed {
                segment: i,
                reason: e.to_string(),
            })?;
            parsed.push(bloom);
        }

        for (slot, bloom) in self.segments.iter().zip(parsed) {
            *write(slot) = bloom;
        }
        Ok(())
    }

    fn segment(&self, bucket: BucketId) -> Option<&RwLock<Bloom<u64>>> {
        self.segments.get(bucket.index() as usize)
    }
}

fn read(segment: &RwLock<Bloom<u64>>) -> std::sync::RwLockReadGuard<'_, Bloom<u64>> {
    segment.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(segment: &RwLock<Bloom<u64>>) -> std::sync::RwLockWriteGuard<'_, Bloom<u64>> {
    segment.write().unwrap_or_else(PoisonError::into_inner)
}
