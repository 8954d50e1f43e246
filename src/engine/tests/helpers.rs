use crate::bloom::BloomFilter;
use crate::device::{Device, DeviceError, MemoryDevice};
use crate::engine::{BigHash, BigHashConfig, DestructorCallback, DestructorEvent};
use crate::types::HashedKey;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config over a fresh in-memory device holding exactly `num_buckets`
/// buckets of `bucket_size` bytes, one device stripe per bucket.
pub fn mem_config(num_buckets: u32, bucket_size: u32) -> BigHashConfig {
    init_tracing();
    let device = Arc::new(MemoryDevice::with_stripe_size(
        num_buckets as usize * bucket_size as usize,
        bucket_size as usize,
    ));
    BigHashConfig {
        bucket_size,
        num_shards: 64,
        ..BigHashConfig::new(device)
    }
}

/// Same as [`mem_config`] with a bloom filter sized for `expected_items`
/// per bucket.
pub fn bloom_config(num_buckets: u32, bucket_size: u32, expected_items: usize) -> BigHashConfig {
    let mut config = mem_config(num_buckets, bucket_size);
    config.bloom_filter = Some(BloomFilter::new(num_buckets as usize, expected_items, 0.01).unwrap());
    config
}

/// Config over a caller-supplied device.
pub fn device_config(device: Arc<dyn Device>, bucket_size: u32) -> BigHashConfig {
    init_tracing();
    BigHashConfig {
        bucket_size,
        num_shards: 64,
        ..BigHashConfig::new(device)
    }
}

pub fn engine(num_buckets: u32, bucket_size: u32) -> BigHash {
    BigHash::new(mem_config(num_buckets, bucket_size)).unwrap()
}

/// A key pinned to `bucket`: the low 32 bits of its hash are the bucket
/// index, the high 32 bits come from the name. Only valid for engines
/// whose bucket count is a power of two.
pub fn key_in(bucket: u32, name: &str) -> HashedKey {
    let high = HashedKey::new(name.as_bytes().to_vec()).key_hash() & 0xFFFF_FFFF_0000_0000;
    HashedKey::with_hash(name.as_bytes().to_vec(), high | u64::from(bucket))
}

pub fn key(name: &str) -> HashedKey {
    HashedKey::new(name.as_bytes().to_vec())
}

/// Collects every destructor invocation.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(Vec<u8>, Vec<u8>, DestructorEvent)>>>,
}

impl Recorder {
    pub fn callback(&self) -> DestructorCallback {
        let events = Arc::clone(&self.events);
        Arc::new(move |key: &[u8], value: &[u8], event: DestructorEvent| {
            events
                .lock()
                .unwrap()
                .push((key.to_vec(), value.to_vec(), event));
        })
    }

    pub fn events(&self) -> Vec<(Vec<u8>, Vec<u8>, DestructorEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn keys_with(&self, event: DestructorEvent) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter(|(_, _, e)| *e == event)
            .map(|(k, _, _)| k)
            .collect()
    }
}

/// Memory device whose reads, writes or flushes can be made to fail.
pub struct FaultyDevice {
    inner: MemoryDevice,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_flush: AtomicBool,
}

impl FaultyDevice {
    pub fn new(size: usize) -> Self {
        Self {
            inner: MemoryDevice::new(size),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_flush: AtomicBool::new(false),
        }
    }

    fn injected() -> DeviceError {
        DeviceError::Io(std::io::Error::other("injected fault"))
    }
}

impl Device for FaultyDevice {
    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), DeviceError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.read_at(offset, buf)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<(), DeviceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.write_at(offset, buf)
    }

    fn flush(&self) -> Result<(), DeviceError> {
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.flush()
    }
}
