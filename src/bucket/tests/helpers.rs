use crate::bucket::BucketEntry;

/// Entry with a hash derived from the key, no expiry.
pub fn entry(key: &[u8], value: &[u8]) -> BucketEntry {
    BucketEntry {
        key_hash: key.iter().fold(17u64, |h, &b| h.wrapping_mul(31).wrapping_add(u64::from(b))),
        expiry_time: 0,
        key: key.to_vec(),
        value: value.to_vec(),
    }
}

/// Entry whose encoded size is exactly `size` bytes (header included).
pub fn sized_entry(key: &[u8], size: usize) -> BucketEntry {
    let value_len = size - BucketEntry::encoded_size_for(key.len(), 0);
    entry(key, &vec![0x5A; value_len])
}
