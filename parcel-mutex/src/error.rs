// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Failures from the cross-process mutex primitive.
#[derive(Debug, thiserror::Error)]
pub enum MutexError {
    /// `create` failed: a semaphore already exists at the requested key, or
    /// the OS denied the request.
    #[error("failed to create mutex at key {key:#x}: {source}")]
    Create { key: u32, source: std::io::Error },

    /// `open` failed: no semaphore exists at the requested key, or the OS
    /// denied attach.
    #[error("failed to open mutex at key {key:#x}: {source}")]
    Open { key: u32, source: std::io::Error },

    /// Acquiring the semaphore failed.
    #[error("failed to acquire mutex: {0}")]
    Acquire(std::io::Error),

    /// Releasing the semaphore failed.
    #[error("failed to release mutex: {0}")]
    Release(std::io::Error),

    /// Removing the underlying OS primitive failed.
    #[error("failed to free mutex: {0}")]
    Free(std::io::Error),
}
