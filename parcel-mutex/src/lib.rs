// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A named, max-1 counting semaphore that survives `fork`/`exec` and is
//! addressable purely by a serializable 32-bit key, so it can ride along
//! inside a parcel's serialized handle without passing a file descriptor.

mod error;
mod platform;

pub use error::MutexError;

use platform::PlatformMutex;
use std::cell::Cell;

/// A cross-process mutex backed by a counting semaphore initialised to 1.
///
/// Fairness and reentrancy are not guaranteed; a single holder must not
/// re-acquire its own mutex.
pub struct Mutex {
    key: u32,
    inner: PlatformMutex,
}

impl Mutex {
    /// Creates a fresh semaphore at `key`, initialised to 1 (unlocked).
    pub fn create(key: u32) -> Result<Mutex, MutexError> {
        tracing::debug!(key, "creating mutex");
        let inner = PlatformMutex::create(key).map_err(|source| MutexError::Create {
            key,
            source,
        })?;
        Ok(Mutex { key, inner })
    }

    /// Attaches to an existing semaphore at `key`.
    pub fn open(key: u32) -> Result<Mutex, MutexError> {
        tracing::trace!(key, "opening mutex");
        let inner = PlatformMutex::open(key).map_err(|source| MutexError::Open {
            key,
            source,
        })?;
        Ok(Mutex { key, inner })
    }

    /// The key this mutex is attached at. Carried verbatim in a parcel's
    /// serialized handle.
    pub fn key(&self) -> u32 {
        self.key
    }

    /// Blocks until the semaphore is taken. The returned guard releases
    /// exactly once, on drop or explicit [`MutexGuard::release`].
    pub fn acquire(&self) -> Result<MutexGuard<'_>, MutexError> {
        tracing::trace!(key = self.key, "acquiring mutex");
        self.inner.acquire().map_err(MutexError::Acquire)?;
        Ok(MutexGuard {
            mutex: self,
            released: Cell::new(false),
        })
    }

    /// Removes the underlying OS primitive. Safe to call only once no
    /// holder remains. Takes `&self`, mirroring
    /// `parcel_segment::Segment::mark_deleted`: the OS object is gone from
    /// the namespace but this handle's resources are released separately
    /// when it drops.
    pub fn free(&self) -> Result<(), MutexError> {
        tracing::debug!(key = self.key, "freeing mutex");
        self.inner.free().map_err(MutexError::Free)
    }
}

/// RAII guard returned by [`Mutex::acquire`]. Releases the semaphore on
/// drop if [`release`](MutexGuard::release) was not called explicitly.
#[must_use = "the mutex is held until this guard is released or dropped"]
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
    released: Cell<bool>,
}

impl MutexGuard<'_> {
    /// Releases the semaphore now, surfacing any OS failure instead of
    /// silently logging it the way `Drop` must.
    pub fn release(self) -> Result<(), MutexError> {
        self.released.set(true);
        tracing::trace!(key = self.mutex.key, "releasing mutex");
        self.mutex.inner.release().map_err(MutexError::Release)
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        if self.released.get() {
            return;
        }
        if let Err(err) = self.mutex.inner.release() {
            tracing::error!(key = self.mutex.key, %err, "failed to release mutex on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> u32 {
        fastrand::u32(0x1000..0x7FFF_FFFF)
    }

    #[test]
    fn create_then_open_shares_state() {
        let key = test_key();
        let m1 = Mutex::create(key).unwrap();
        let m2 = Mutex::open(key).unwrap();

        let guard = m1.acquire().unwrap();
        drop(guard);

        // After release, the second handle can acquire it.
        let guard2 = m2.acquire().unwrap();
        guard2.release().unwrap();
        m1.free().unwrap();
    }

    #[test]
    fn explicit_release_does_not_double_release() {
        let key = test_key();
        let m = Mutex::create(key).unwrap();
        let guard = m.acquire().unwrap();
        guard.release().unwrap();
        // Re-acquiring should succeed, proving the semaphore count is 1,
        // not negative from a double release.
        let guard2 = m.acquire().unwrap();
        guard2.release().unwrap();
        m.free().unwrap();
    }

    #[test]
    fn create_twice_at_same_key_fails() {
        let key = test_key();
        let m = Mutex::create(key).unwrap();
        let err = Mutex::create(key).unwrap_err();
        assert!(matches!(err, MutexError::Create { .. }));
        m.free().unwrap();
    }
}
