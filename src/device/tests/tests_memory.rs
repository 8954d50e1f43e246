//! In-memory device tests: positional round-trips and bounds checks.

#[cfg(test)]
mod tests {
    use crate::device::{Device, DeviceError, MemoryDevice};

    /// # Scenario
    /// Write a pattern at a non-zero offset and read it back.
    ///
    /// # Expected behavior
    /// The same bytes come back; neighbouring bytes stay zero.
    #[test]
    fn write_then_read_at_offset() {
        let dev = MemoryDevice::new(4096);
        dev.write_at(100, &[7u8; 32]).unwrap();

        let mut buf = [0u8; 34];
        dev.read_at(99, &mut buf).unwrap();
        assert_eq!(buf[0], 0);
        assert!(buf[1..33].iter().all(|&b| b == 7));
        assert_eq!(buf[33], 0);
    }

    /// # Scenario
    /// Read and write ranges that cross the end of the device.
    ///
    /// # Expected behavior
    /// Both fail with `OutOfBounds`; nothing is written.
    #[test]
    fn out_of_bounds_is_rejected() {
        let dev = MemoryDevice::new(128);

        let err = dev.write_at(120, &[1u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::OutOfBounds {
                offset: 120,
                len: 16,
                size: 128
            }
        ));

        let mut buf = [0u8; 16];
        assert!(matches!(
            dev.read_at(u64::MAX, &mut buf),
            Err(DeviceError::OutOfBounds { .. })
        ));

        dev.read_at(112, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn size_and_flush() {
        let dev = MemoryDevice::new(512);
        assert_eq!(dev.size(), 512);
        dev.flush().unwrap();
    }

    /// # Scenario
    /// Write a range that spans three 64-byte stripes, starting and ending
    /// mid-stripe, then read a wider range back.
    ///
    /// # Expected behavior
    /// Bytes land at the right offsets across stripe boundaries.
    #[test]
    fn stripes__access_spanning_boundaries() {
        let dev = MemoryDevice::with_stripe_size(200, 64);
        assert_eq!(dev.stripe_size(), 64);

        let pattern: Vec<u8> = (0..100u8).collect();
        dev.write_at(50, &pattern).unwrap();

        let mut buf = [0xFFu8; 120];
        dev.read_at(40, &mut buf).unwrap();
        assert!(buf[..10].iter().all(|&b| b == 0));
        assert_eq!(&buf[10..110], pattern.as_slice());
        assert!(buf[110..].iter().all(|&b| b == 0));

        let mut tail = [0xFFu8; 8];
        dev.read_at(192, &mut tail).unwrap();
        assert_eq!(tail, [0u8; 8]);
        dev.read_at(200, &mut []).unwrap();
    }

    /// # Scenario
    /// Hold the write lock of stripe 0, then write to stripe 1 from another
    /// thread.
    ///
    /// # Expected behavior
    /// The second write completes without waiting for the first stripe.
    #[test]
    fn stripes__disjoint_writes_do_not_contend() {
        let dev = MemoryDevice::with_stripe_size(256, 128);
        let held = dev.stripes[0].write().unwrap();

        let (done_tx, done_rx) = crossbeam::channel::bounded::<()>(1);
        crossbeam::scope(|s| {
            let dev = &dev;
            s.spawn(move |_| {
                dev.write_at(128, &[9u8; 128]).unwrap();
                let _ = done_tx.send(());
            });
            assert!(
                done_rx
                    .recv_timeout(std::time::Duration::from_secs(10))
                    .is_ok(),
                "write to stripe 1 waited on stripe 0"
            );
        })
        .unwrap();
        drop(held);

        let mut buf = [0u8; 128];
        dev.read_at(128, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 9));
    }
}
