//! Bucket-to-slot masking and the blocking behaviour it implies.

#[cfg(test)]
mod tests {
    use crate::shard::ShardTable;
    use crate::types::BucketId;
    use std::sync::{Arc, Barrier, TryLockError};
    use std::thread;

    #[test]
    fn rejects_non_power_of_two() {
        assert!(ShardTable::new(0).is_none());
        assert!(ShardTable::new(3).is_none());
        assert!(ShardTable::new(1000).is_none());
        assert_eq!(ShardTable::new(1).unwrap().len(), 1);
        assert_eq!(ShardTable::new(1024).unwrap().len(), 1024);
    }

    /// # Scenario
    /// Map buckets onto an 8-slot table.
    ///
    /// # Expected behavior
    /// The slot is the bucket index masked to the low three bits.
    #[test]
    fn slot_is_masked_bucket_index() {
        let table = ShardTable::new(8).unwrap();
        assert_eq!(table.shard_of(BucketId::new(0)).slot(), 0);
        assert_eq!(table.shard_of(BucketId::new(7)).slot(), 7);
        assert_eq!(table.shard_of(BucketId::new(8)).slot(), 0);
        assert_eq!(table.shard_of(BucketId::new(13)).slot(), 5);
        assert!(std::ptr::eq(
            table.lock_for(BucketId::new(3)),
            table.lock_for(BucketId::new(11))
        ));
    }

    /// # Scenario
    /// One thread holds bucket 1's lock exclusively; another thread tries
    /// bucket 2 (different slot) and bucket 9 (aliases bucket 1).
    ///
    /// # Expected behavior
    /// Bucket 2 is acquired immediately; bucket 9 would block.
    #[test]
    fn aliasing_buckets_contend_distinct_slots_do_not() {
        let table = Arc::new(ShardTable::new(8).unwrap());
        let held = Arc::new(Barrier::new(2));
        let probed = Arc::new(Barrier::new(2));

        let holder = {
            let table = Arc::clone(&table);
            let held = Arc::clone(&held);
            let probed = Arc::clone(&probed);
            thread::spawn(move || {
                let _guard = table.lock_for(BucketId::new(1)).write().unwrap();
                held.wait();
                probed.wait();
            })
        };

        held.wait();
        assert!(table.lock_for(BucketId::new(2)).try_write().is_ok());
        assert!(matches!(
            table.lock_for(BucketId::new(9)).try_write(),
            Err(TryLockError::WouldBlock)
        ));
        assert!(matches!(
            table.lock_for(BucketId::new(9)).try_read(),
            Err(TryLockError::WouldBlock)
        ));
        probed.wait();
        holder.join().unwrap();

        assert!(table.lock_for(BucketId::new(9)).try_write().is_ok());
    }

    /// # Scenario
    /// Two readers on the same slot.
    ///
    /// # Expected behavior
    /// Shared acquisition does not exclude other readers.
    #[test]
    fn readers_share_a_slot() {
        let table = ShardTable::new(4).unwrap();
        let _a = table.lock_for(BucketId::new(1)).read().unwrap();
        assert!(table.lock_for(BucketId::new(5)).try_read().is_ok());
    }
}
