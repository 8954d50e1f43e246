//! # BigHash
//!
//! A flash cache engine for small objects. Keys are hashed onto fixed-size
//! buckets laid out back to back on a block device; each bucket holds as
//! many entries as fit and evicts its oldest entries first when a new one
//! does not. There is no in-memory index, so per-item memory overhead is
//! zero beyond an optional bloom filter.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use bighash::{BigHash, BigHashConfig, HashedKey, MemoryDevice};
//!
//! let device = Arc::new(MemoryDevice::new(64 * 4096));
//! let cache = BigHash::new(BigHashConfig::new(device)).unwrap();
//!
//! let key = HashedKey::new(b"user:42".to_vec());
//! cache.insert(&key, b"payload").unwrap();
//! assert_eq!(cache.lookup(&key).unwrap(), Some(b"payload".to_vec()));
//!
//! assert!(cache.remove(&key).unwrap());
//! assert_eq!(cache.lookup(&key).unwrap(), None);
//! ```
//!
//! ## Restart
//!
//! Bucket contents already live on the device. To reuse them after a
//! restart, [`BigHash::persist`] the engine metadata before shutdown and
//! [`BigHash::recover`] it into a new engine with the same geometry:
//!
//! ```rust
//! use std::io::Cursor;
//! use std::sync::Arc;
//! use bighash::{BigHash, BigHashConfig, Device, HashedKey, MemoryDevice};
//!
//! let device: Arc<dyn Device> = Arc::new(MemoryDevice::new(16 * 4096));
//! let key = HashedKey::new(b"k".to_vec());
//!
//! let mut saved = Vec::new();
//! {
//!     let cache = BigHash::new(BigHashConfig::new(device.clone())).unwrap();
//!     cache.insert(&key, b"v").unwrap();
//!     cache.flush().unwrap();
//!     cache.persist(&mut saved).unwrap();
//! }
//!
//! let cache = BigHash::new(BigHashConfig::new(device)).unwrap();
//! cache.recover(&mut Cursor::new(saved)).unwrap();
//! assert_eq!(cache.lookup(&key).unwrap(), Some(b"v".to_vec()));
//! ```
//!
//! ## Features
//!
//! - **Set-associative buckets**: one device read per lookup, one
//!   read-modify-write per mutation.
//! - **FIFO eviction**: oldest entries in a bucket go first.
//! - **Sharded locks**: a fixed lock table, independent of bucket count.
//! - **Bloom filters**: optional, skip device reads on definite misses.
//! - **CRC32 integrity**: torn or corrupted buckets are detected and
//!   treated as empty.
//! - **Instant reset**: a generation bump invalidates every bucket without
//!   touching the device.

pub mod bloom;
pub mod bucket;
pub mod device;
pub mod encoding;
pub mod engine;
pub mod shard;
pub mod types;

pub use bloom::{BloomError, BloomFilter};
pub use device::{Device, DeviceError, FileDevice, MemoryDevice};
pub use engine::{
    BigHash, BigHashConfig, BigHashError, BigHashStats, DestructorCallback, DestructorEvent,
    ExpiredCheck, RandomEntry,
};
pub use shard::ShardTable;
pub use types::{BucketId, HashedKey};
