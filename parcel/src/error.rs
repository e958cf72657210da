// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use parcel_mutex::MutexError;
use parcel_segment::{HeaderDecodeError, SegmentError};

/// Failures surfaced by a [`crate::Parcel`].
#[derive(Debug, thiserror::Error)]
pub enum ParcelError {
    /// The initial segment or mutex could not be created.
    #[error("failed to initialize parcel: {0}")]
    Init(#[source] InitCause),

    /// The operation targeted a freed parcel.
    #[error("parcel is freed")]
    Freed,

    /// The header state was unrecognised, the declared size was invalid,
    /// or the payload failed to decode.
    #[error("parcel payload is corrupt: {0}")]
    Corrupt(String),

    /// A segment read, write, or delete failed.
    #[error("parcel I/O error: {0}")]
    Io(#[from] SegmentError),
}

/// The specific step that failed during [`ParcelError::Init`].
#[derive(Debug, thiserror::Error)]
pub enum InitCause {
    #[error("segment creation failed: {0}")]
    Segment(#[from] SegmentError),
    #[error("mutex creation failed: {0}")]
    Mutex(#[from] MutexError),
}

impl From<HeaderDecodeError> for ParcelError {
    fn from(err: HeaderDecodeError) -> Self {
        // An unrecognised state byte or a truncated header is a data
        // problem in bytes the OS successfully handed back, not an OS I/O
        // failure, so it must surface the same way a failed payload
        // decode does.
        ParcelError::Corrupt(err.to_string())
    }
}

impl From<MutexError> for ParcelError {
    fn from(err: MutexError) -> Self {
        // Acquire/release failures surface as Io: from the caller's
        // perspective they are the same class of "the platform primitive
        // backing this parcel misbehaved" as a segment read/write failure.
        ParcelError::Io(SegmentError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            err.to_string(),
        )))
    }
}
