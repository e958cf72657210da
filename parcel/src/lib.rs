// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A shared-memory parcel: a process-addressable container that stores a
//! single logically-typed value in an OS shared-memory segment so that
//! cooperating processes can read and mutate it with mutual exclusion.
//!
//! Layered on [`parcel_segment`] (the raw shared-memory object) and
//! [`parcel_mutex`] (the cross-process semaphore). The interesting
//! engineering is the binary header protocol written into the segment
//! itself, used as an out-of-band channel for relocating the payload to a
//! larger segment and letting stale handles in other processes discover
//! the move by reading the old segment's header (see [`Parcel::wrap`] and
//! [`Parcel::unwrap`]).
//!
//! ```no_run
//! use parcel::Parcel;
//!
//! let p = Parcel::<i64>::new(&0).unwrap();
//! for _ in 0..1000 {
//!     p.synchronized(|n| Some(n + 1)).unwrap();
//! }
//! assert_eq!(p.unwrap().unwrap(), 1000);
//! p.free().unwrap();
//! ```

mod codec;
mod error;
mod handle;
#[allow(clippy::module_inception)]
mod parcel;

pub use codec::{BincodeCodec, Codec, CodecError};
pub use error::{InitCause, ParcelError};
pub use handle::ParcelHandle;
pub use parcel::{Parcel, ParcelConfig};
