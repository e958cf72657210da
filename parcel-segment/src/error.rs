// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Failures from the low-level OS shared-memory facility.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    /// `create` failed: a segment already exists at the requested key, the
    /// OS denied the request, or the platform has no shared-memory support.
    #[error("failed to create segment at key {key:#x}: {source}")]
    Create { key: u32, source: std::io::Error },

    /// `open` failed: no segment exists at the requested key, or the OS
    /// denied attach.
    #[error("failed to open segment at key {key:#x}: {source}")]
    Open { key: u32, source: std::io::Error },

    /// A read, write, resize, or mark-deleted call failed against an
    /// already-open segment.
    #[error("segment I/O error: {0}")]
    Io(#[from] std::io::Error),
}
