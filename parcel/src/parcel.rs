// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;

use parcel_segment::{derive_initial_key, next_key, Header, Segment, State, HEADER_LEN};

use crate::codec::{BincodeCodec, Codec};
use crate::error::{InitCause, ParcelError};
use crate::handle::ParcelHandle;

/// Defaults for [`Parcel::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParcelConfig {
    /// Bytes reserved for the payload, not counting the 7-byte header.
    pub capacity: usize,
    /// Permission mask recorded at creation and carried across relocations.
    pub permissions: u16,
}

impl Default for ParcelConfig {
    fn default() -> Self {
        ParcelConfig {
            capacity: 16384,
            permissions: 0o600,
        }
    }
}

struct Inner {
    current_key: u32,
    segment: Option<Segment>,
    freed: bool,
}

/// A value of type `T`, held in an OS shared-memory segment and synchronized
/// across cooperating processes by a named cross-process mutex.
///
/// Generic over the codec `C` used to turn `T` into bytes and back, so the
/// payload boundary is explicit at the type level instead of a hard-wired
/// universal deserializer. Defaults to [`BincodeCodec`].
pub struct Parcel<T, C: Codec<T> = BincodeCodec> {
    inner: StdMutex<Inner>,
    mutex: parcel_mutex::Mutex,
    _marker: PhantomData<fn() -> (T, C)>,
}

static IDENTITY_COUNTER: AtomicU64 = AtomicU64::new(0);

impl<T, C: Codec<T>> Parcel<T, C> {
    /// Creates a new parcel holding `value`, using [`ParcelConfig::default`].
    pub fn new(value: &T) -> Result<Self, ParcelError> {
        Self::with_config(value, ParcelConfig::default())
    }

    /// Creates a new parcel holding `value` with an explicit capacity and
    /// permission mask.
    pub fn with_config(value: &T, config: ParcelConfig) -> Result<Self, ParcelError> {
        // A stable hash of something unique to this construction site: the
        // process id, a thread-local-ish monotonic counter, and the current
        // time. This is a uniqueness heuristic, not a guarantee; a
        // collision surfaces as a single, non-retried SegmentCreate
        // failure below.
        let identity = (
            std::process::id(),
            IDENTITY_COUNTER.fetch_add(1, Ordering::Relaxed),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
        );
        let key = derive_initial_key(&identity);

        let segment = Segment::create(key, config.permissions, config.capacity + HEADER_LEN)
            .map_err(InitCause::Segment)
            .map_err(ParcelError::Init)?;
        segment
            .write(
                0,
                &Header::new(State::Allocated, 0, config.permissions).encode(),
            )
            .map_err(InitCause::Segment)
            .map_err(ParcelError::Init)?;
        let mutex = parcel_mutex::Mutex::create(key)
            .map_err(InitCause::Mutex)
            .map_err(ParcelError::Init)?;

        let parcel = Parcel {
            inner: StdMutex::new(Inner {
                current_key: key,
                segment: Some(segment),
                freed: false,
            }),
            mutex,
            _marker: PhantomData,
        };
        parcel.wrap(value)?;
        Ok(parcel)
    }

    /// Reopens a parcel from a handle produced by [`Parcel::handle`].
    ///
    /// Opens the segment and mutex at the keys carried in the handle
    /// without creating anything; the caller is responsible for ensuring
    /// another live handle keeps both alive during transit.
    pub fn from_handle(handle: ParcelHandle) -> Result<Self, ParcelError> {
        let segment = Segment::open(handle.current_key)?;
        let mutex = parcel_mutex::Mutex::open(handle.mutex_key)?;
        Ok(Parcel {
            inner: StdMutex::new(Inner {
                current_key: handle.current_key,
                segment: Some(segment),
                freed: false,
            }),
            mutex,
            _marker: PhantomData,
        })
    }

    /// The serializable form of this handle: the current segment key and
    /// the shared mutex's key.
    pub fn handle(&self) -> ParcelHandle {
        let guard = self.lock();
        ParcelHandle {
            current_key: guard.current_key,
            mutex_key: self.mutex.key(),
        }
    }

    /// Whether `free()` has completed on this handle (or been observed via
    /// a FREED header on another handle sharing this parcel).
    pub fn is_freed(&self) -> bool {
        self.lock().freed
    }

    /// Reads the current value.
    ///
    /// Correct without external synchronization only while the caller also
    /// holds the mutex (e.g. inside [`Parcel::synchronized`]); called
    /// outside that, it may race a concurrent `wrap` and observe a `MOVED`
    /// chase mid-flight or, rarely, `ParcelCorrupt` from a torn read.
    pub fn unwrap(&self) -> Result<T, ParcelError> {
        let mut guard = self.lock();
        if guard.freed {
            return Err(ParcelError::Freed);
        }
        loop {
            let segment = guard.segment.as_ref().ok_or(ParcelError::Freed)?;
            let header = Header::decode(&segment.read(0, HEADER_LEN)?)?;
            match header.state {
                State::Moved => {
                    let new_key = header.size_or_key;
                    tracing::debug!(
                        old_key = guard.current_key,
                        new_key,
                        "chasing relocated segment"
                    );
                    let new_segment = Segment::open(new_key)?;
                    if let Some(old) = guard.segment.replace(new_segment) {
                        old.close();
                    }
                    guard.current_key = new_key;
                    continue;
                }
                State::Freed => {
                    guard.freed = true;
                    return Err(ParcelError::Freed);
                }
                State::Allocated if header.size_or_key > 0 => {
                    let bytes = segment.read(HEADER_LEN, header.size_or_key as usize)?;
                    return C::decode(&bytes).map_err(|e| ParcelError::Corrupt(e.0));
                }
                _ => {
                    return Err(ParcelError::Corrupt(format!(
                        "unreadable header state {:?} size {}",
                        header.state, header.size_or_key
                    )));
                }
            }
        }
    }

    /// Writes `value`, relocating to a larger segment if it no longer
    /// fits.
    pub fn wrap(&self, value: &T) -> Result<(), ParcelError> {
        let mut guard = self.lock();
        if guard.freed {
            return Err(ParcelError::Freed);
        }
        let bytes = C::encode(value).map_err(|e| ParcelError::Corrupt(e.0))?;
        let len = bytes.len();

        let permissions = {
            let segment = guard.segment.as_ref().ok_or(ParcelError::Freed)?;
            Header::decode(&segment.read(0, HEADER_LEN)?)?.permissions
        };

        let fits = {
            let segment = guard.segment.as_ref().ok_or(ParcelError::Freed)?;
            segment.capacity() >= len + HEADER_LEN
        };

        if fits {
            let segment = guard.segment.as_ref().ok_or(ParcelError::Freed)?;
            segment.write(
                0,
                &Header::new(State::Allocated, len as u32, permissions).encode(),
            )?;
            segment.write(HEADER_LEN, &bytes)?;
            return Ok(());
        }

        self.relocate(&mut guard, len, permissions, &bytes)
    }

    fn relocate(
        &self,
        guard: &mut Inner,
        len: usize,
        permissions: u16,
        bytes: &[u8],
    ) -> Result<(), ParcelError> {
        let new_key = next_key(guard.current_key);
        tracing::info!(
            old_key = guard.current_key,
            new_key,
            len,
            "relocating parcel to a larger segment"
        );

        let result = self.try_relocate(guard, new_key, len, permissions, bytes);
        if result.is_err() {
            // Any failure partway through relocation (old segment header
            // write/mark-delete, new segment creation, or new segment
            // write) leaves this handle terminally Freed, matching every
            // other failure branch here. The mutex must still be released
            // by the caller; we only own the state flag.
            if let Some(old) = guard.segment.take() {
                old.close();
            }
            guard.freed = true;
        }
        result
    }

    fn try_relocate(
        &self,
        guard: &mut Inner,
        new_key: u32,
        len: usize,
        permissions: u16,
        bytes: &[u8],
    ) -> Result<(), ParcelError> {
        let old_segment = guard.segment.as_ref().ok_or(ParcelError::Freed)?;
        old_segment.write(0, &Header::new(State::Moved, new_key, 0).encode())?;
        old_segment.mark_deleted()?;

        let new_capacity = 2 * len + HEADER_LEN;
        let new_segment = Segment::create(new_key, permissions, new_capacity)?;

        if let Err(err) = new_segment.write(
            0,
            &Header::new(State::Allocated, len as u32, permissions).encode(),
        ) {
            new_segment.close();
            return Err(err.into());
        }
        if let Err(err) = new_segment.write(HEADER_LEN, bytes) {
            new_segment.close();
            return Err(err.into());
        }

        if let Some(old) = guard.segment.replace(new_segment) {
            old.close();
        }
        guard.current_key = new_key;
        Ok(())
    }

    /// Runs `f` under the cross-process mutex: reads the current value,
    /// passes it to `f`, and writes back `f`'s result (or the unchanged
    /// value if `f` returns `None`).
    ///
    /// The mutex is released on every exit path, including if `f` panics:
    /// the panic is caught, the guard is dropped (releasing the mutex),
    /// and then the panic is resumed.
    pub fn synchronized<F>(&self, f: F) -> Result<Option<T>, ParcelError>
    where
        T: Clone,
        F: FnOnce(T) -> Option<T>,
    {
        let guard = self.mutex.acquire()?;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let v = self.unwrap()?;
            let original = v.clone();
            let r = f(v);
            let to_store = r.clone().unwrap_or(original);
            self.wrap(&to_store)?;
            Ok::<Option<T>, ParcelError>(r)
        }));
        drop(guard);
        match result {
            Ok(outcome) => outcome,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    /// Produces an independent parcel holding a copy of the current value,
    /// with its own fresh segment and mutex. Mutating the clone never
    /// affects the original.
    pub fn try_clone(&self) -> Result<Self, ParcelError> {
        let value = self.unwrap()?;
        let (capacity, permissions) = {
            let guard = self.lock();
            let segment = guard.segment.as_ref().ok_or(ParcelError::Freed)?;
            let header = Header::decode(&segment.read(0, HEADER_LEN)?)?;
            (
                segment.capacity().saturating_sub(HEADER_LEN),
                header.permissions,
            )
        };
        Self::with_config(
            &value,
            ParcelConfig {
                capacity,
                permissions,
            },
        )
    }

    /// Idempotent. Marks the segment FREED, requests its deletion, and
    /// removes the mutex. Subsequent operations on this or any other
    /// handle sharing the parcel fail with [`ParcelError::Freed`].
    pub fn free(&self) -> Result<(), ParcelError> {
        let mut guard = self.lock();
        if guard.freed {
            return Ok(());
        }
        if let Some(segment) = guard.segment.as_ref() {
            segment.write(0, &Header::new(State::Freed, 0, 0).encode())?;
            segment.mark_deleted()?;
        }
        if let Some(segment) = guard.segment.take() {
            segment.close();
        }
        guard.freed = true;
        drop(guard);
        self.mutex.free()?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
