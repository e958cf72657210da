// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Integer-keyed OS shared-memory segments with a binary relocation header.
//!
//! A [`Segment`] is a thin, platform-independent wrapper over one shared
//! memory object: System V shared memory on Unix, a named file mapping on
//! Windows. It knows nothing about relocation, mutual exclusion, or
//! payload encoding — those live in `parcel-mutex` and the `parcel` crate
//! that layers on top of both.

mod error;
mod header;
mod key;
mod platform;

pub use error::SegmentError;
pub use header::{Header, HeaderDecodeError, State, HEADER_LEN};
pub use key::{derive_initial_key, next_key, RANDOM_RANGE_MAX, RANDOM_RANGE_MIN};

use platform::PlatformSegment;

/// One OS shared-memory object, addressed by a 32-bit key.
pub struct Segment {
    key: u32,
    inner: PlatformSegment,
}

impl Segment {
    /// Creates a new segment of `capacity` bytes at `key`, failing if one
    /// already exists there or the OS denies the request.
    pub fn create(key: u32, permissions: u16, capacity: usize) -> Result<Segment, SegmentError> {
        tracing::debug!(key, capacity, permissions, "creating segment");
        let inner = PlatformSegment::create(key, permissions, capacity)
            .map_err(|source| SegmentError::Create { key, source })?;
        Ok(Segment { key, inner })
    }

    /// Attaches to an existing segment at `key`.
    pub fn open(key: u32) -> Result<Segment, SegmentError> {
        tracing::trace!(key, "opening segment");
        let inner =
            PlatformSegment::open(key).map_err(|source| SegmentError::Open { key, source })?;
        Ok(Segment { key, inner })
    }

    /// The key this segment is attached at.
    pub fn key(&self) -> u32 {
        self.key
    }

    /// Current OS-reported byte capacity, including the 7-byte header.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Reads `len` bytes starting at `offset`. Fails if the range exceeds
    /// the segment's capacity.
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, SegmentError> {
        Ok(self.inner.read(offset, len)?)
    }

    /// Writes `bytes` starting at `offset`. Fails if the range exceeds the
    /// segment's capacity.
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<(), SegmentError> {
        self.inner.write(offset, bytes)?;
        Ok(())
    }

    /// Requests the OS delete the segment once the last process detaches.
    /// The segment remains readable/writable by already-attached processes
    /// (including this one) until they close it.
    pub fn mark_deleted(&self) -> Result<(), SegmentError> {
        tracing::debug!(key = self.key, "marking segment deleted");
        Ok(self.inner.mark_deleted()?)
    }

    /// Detaches this process from the segment. Idempotent.
    pub fn close(mut self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("key", &self.key)
            .field("capacity", &self.inner.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> u32 {
        // fastrand keeps parallel test runs from colliding on the same
        // SysV key, mirroring how spawn_worker's tests randomize state
        // shared with the OS.
        fastrand::u32(0x1000..0x7FFF_FFFF)
    }

    #[test]
    fn create_then_open_round_trips_bytes() {
        let key = test_key();
        let seg = Segment::create(key, 0o600, 128).unwrap();
        seg.write(7, b"hello").unwrap();
        drop(seg);

        let opened = Segment::open(key).unwrap();
        assert_eq!(opened.read(7, 5).unwrap(), b"hello");
        opened.mark_deleted().unwrap();
    }

    #[test]
    fn create_twice_at_same_key_fails() {
        let key = test_key();
        let seg = Segment::create(key, 0o600, 64).unwrap();
        let err = Segment::create(key, 0o600, 64).unwrap_err();
        assert!(matches!(err, SegmentError::Create { .. }));
        seg.mark_deleted().unwrap();
    }

    #[test]
    fn open_missing_key_fails() {
        let err = Segment::open(0xDEAD_0001).unwrap_err();
        assert!(matches!(err, SegmentError::Open { .. }));
    }

    #[test]
    fn write_past_capacity_fails() {
        let key = test_key();
        let seg = Segment::create(key, 0o600, 16).unwrap();
        let err = seg.write(10, &[0u8; 16]).unwrap_err();
        assert!(matches!(err, SegmentError::Io(_)));
        seg.mark_deleted().unwrap();
    }

    #[test]
    fn capacity_reports_requested_size() {
        let key = test_key();
        let seg = Segment::create(key, 0o600, 256).unwrap();
        assert!(seg.capacity() >= 256);
        seg.mark_deleted().unwrap();
    }
}
