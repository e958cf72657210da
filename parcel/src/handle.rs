// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire form of a parcel handle.

use serde::{Deserialize, Serialize};

/// The serializable form of a [`crate::Parcel`] handle: the segment key it
/// currently points at, plus the key of the mutex it shares with every
/// other handle on the same parcel.
///
/// Deserializing a `ParcelHandle` does not create anything; it is a
/// precondition that some other live handle keeps both the segment and the
/// mutex alive during transit, since transit itself is not atomic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelHandle {
    pub(crate) current_key: u32,
    pub(crate) mutex_key: u32,
}

impl ParcelHandle {
    /// The segment key this handle currently points at. May be stale by
    /// the time it is used if another process has since relocated the
    /// parcel; `Parcel::from_handle` chases the relocation chain as usual.
    pub fn current_key(&self) -> u32 {
        self.current_key
    }

    /// The key of the mutex shared by every handle on this parcel.
    pub fn mutex_key(&self) -> u32 {
        self.mutex_key
    }
}
