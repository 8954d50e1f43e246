//! Reset and flush.

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use crate::device::{Device, MemoryDevice};
    use crate::engine::BigHash;
    use crate::engine::tests::helpers::*;
    use std::sync::Arc;

    /// # Scenario
    /// Populate, reset, look everything up.
    ///
    /// # Expected behavior
    /// Every key is gone, counters read zero and the device bytes were
    /// not rewritten by the reset itself.
    #[test]
    fn reset__hides_all_entries_without_rewriting_device() {
        let device = Arc::new(MemoryDevice::new(4 * 1024));
        let engine = BigHash::new(device_config(device.clone(), 1024)).unwrap();
        let keys: Vec<_> = (0..30).map(|i| key(&format!("k{i}"))).collect();
        for k in &keys {
            engine.insert(k, b"value").unwrap();
        }

        let mut before = vec![0u8; 4 * 1024];
        device.read_at(0, &mut before).unwrap();
        let written = engine.stats().physical_written_bytes;

        engine.reset();

        let mut after = vec![0u8; 4 * 1024];
        device.read_at(0, &mut after).unwrap();
        assert_eq!(before, after);
        assert_eq!(engine.stats().physical_written_bytes, written);

        assert_eq!(engine.item_count(), 0);
        assert_eq!(engine.used_size_bytes(), 0);
        for k in &keys {
            assert_eq!(engine.lookup(k).unwrap(), None);
        }
        assert_eq!(engine.stats().checksum_errors, 0);
    }

    /// # Scenario
    /// Reset, then insert a key into a bucket that still holds pre-reset
    /// bytes.
    ///
    /// # Expected behavior
    /// The stale entries do not resurface and are not reported to the
    /// destructor; only the new entry is counted.
    #[test]
    fn reset__stale_bucket_is_overwritten_cleanly() {
        let recorder = Recorder::default();
        let mut config = mem_config(2, 512);
        config.destructor = recorder.callback();
        let engine = BigHash::new(config).unwrap();

        engine.insert(&key_in(0, "before"), b"1").unwrap();
        engine.reset();
        engine.insert(&key_in(0, "after"), b"2").unwrap();

        assert_eq!(engine.lookup(&key_in(0, "before")).unwrap(), None);
        assert_eq!(engine.lookup(&key_in(0, "after")).unwrap(), Some(b"2".to_vec()));
        assert_eq!(engine.item_count(), 1);
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn reset__clears_bloom_filter() {
        let engine = BigHash::new(bloom_config(4, 512, 8)).unwrap();
        let k = key("k");
        engine.insert(&k, b"v").unwrap();
        assert!(engine.could_exist(&k));
        engine.reset();
        assert!(!engine.could_exist(&k));
    }

    #[test]
    fn reset__repeated_resets_keep_engine_usable() {
        let engine = engine(4, 512);
        for round in 0..5 {
            let k = key(&format!("round-{round}"));
            engine.insert(&k, b"v").unwrap();
            assert_eq!(engine.item_count(), 1);
            engine.reset();
            assert_eq!(engine.lookup(&k).unwrap(), None);
        }
    }

    /// # Scenario
    /// A new engine is built over a device that already holds buckets,
    /// without recovering.
    ///
    /// # Expected behavior
    /// It starts empty: old buckets carry another generation.
    #[test]
    fn new_engine__ignores_existing_device_contents() {
        let device = Arc::new(MemoryDevice::new(4 * 512));
        {
            let engine = BigHash::new(device_config(device.clone(), 512)).unwrap();
            engine.insert(&key("old"), b"v").unwrap();
        }
        let engine = BigHash::new(device_config(device.clone(), 512)).unwrap();
        assert_eq!(engine.lookup(&key("old")).unwrap(), None);
        assert_eq!(engine.item_count(), 0);
    }

    #[test]
    fn flush__delegates_to_device() {
        use std::sync::atomic::Ordering;

        let device = Arc::new(FaultyDevice::new(4 * 512));
        let engine = BigHash::new(device_config(device.clone(), 512)).unwrap();
        engine.flush().unwrap();

        device.fail_flush.store(true, Ordering::SeqCst);
        assert!(engine.flush().is_err());
        assert_eq!(engine.stats().io_errors, 1);
    }
}
