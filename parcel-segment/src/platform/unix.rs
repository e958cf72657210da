// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! System V shared memory backing (`shmget`/`shmat`/`shmdt`/`shmctl`).
//!
//! SysV shm is keyed natively by a 32-bit integer (`key_t` on Linux is
//! actually an `i32`, but an unsigned 32-bit key space maps onto it
//! losslessly via bit-reinterpretation), and already has the create/attach/
//! detach/mark-deleted/reference-counted lifecycle this crate needs — no
//! bespoke protocol on top of a byte-range file is required.

use anyhow::Context;
use std::io;
use std::os::raw::c_void;
use std::ptr;

pub(crate) struct PlatformSegment {
    id: libc::c_int,
    ptr: *mut c_void,
    size: usize,
}

// The segment is just an attached region of kernel-managed memory; the
// pointer is not thread-confined and callers serialize access themselves
// via the cross-process mutex.
unsafe impl Send for PlatformSegment {}
unsafe impl Sync for PlatformSegment {}

fn last_errno() -> io::Error {
    io::Error::last_os_error()
}

impl PlatformSegment {
    pub(crate) fn create(key: u32, permissions: u16, capacity: usize) -> io::Result<Self> {
        let id = unsafe {
            libc::shmget(
                key as libc::key_t,
                capacity,
                libc::IPC_CREAT | libc::IPC_EXCL | (permissions as libc::c_int & 0o777),
            )
        };
        if id < 0 {
            return Err(last_errno());
        }
        Self::attach(id, capacity)
    }

    pub(crate) fn open(key: u32) -> io::Result<Self> {
        // size=0 attaches to the segment's existing size.
        let id = unsafe { libc::shmget(key as libc::key_t, 0, 0) };
        if id < 0 {
            return Err(last_errno());
        }
        let size = Self::query_size(id)?;
        Self::attach(id, size)
    }

    fn attach(id: libc::c_int, size: usize) -> io::Result<Self> {
        let ptr = unsafe { libc::shmat(id, ptr::null(), 0) };
        if ptr as isize == -1 {
            return Err(last_errno());
        }
        Ok(PlatformSegment { id, ptr, size })
    }

    fn query_size(id: libc::c_int) -> io::Result<usize> {
        Self::query_size_inner(id)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))
    }

    // Internal helper kept on `anyhow::Result` while it still has more than
    // one failure site to annotate, collapsing to the crate's typed error
    // at the public boundary.
    fn query_size_inner(id: libc::c_int) -> anyhow::Result<usize> {
        let mut stat: libc::shmid_ds = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::shmctl(id, libc::IPC_STAT, &mut stat) };
        if rc < 0 {
            return Err(last_errno()).context("shmctl(IPC_STAT) failed while querying segment size");
        }
        Ok(stat.shm_segsz as usize)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.size
    }

    pub(crate) fn read(&self, offset: usize, len: usize) -> io::Result<Vec<u8>> {
        self.bounds_check(offset, len)?;
        let mut buf = vec![0u8; len];
        unsafe {
            ptr::copy_nonoverlapping((self.ptr as *const u8).add(offset), buf.as_mut_ptr(), len);
        }
        Ok(buf)
    }

    pub(crate) fn write(&self, offset: usize, bytes: &[u8]) -> io::Result<()> {
        self.bounds_check(offset, bytes.len())?;
        unsafe {
            ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                (self.ptr as *mut u8).add(offset),
                bytes.len(),
            );
        }
        Ok(())
    }

    fn bounds_check(&self, offset: usize, len: usize) -> io::Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "out-of-bounds segment access: offset {offset} len {len} capacity {}",
                    self.size
                ),
            )),
        }
    }

    pub(crate) fn mark_deleted(&self) -> io::Result<()> {
        let rc = unsafe { libc::shmctl(self.id, libc::IPC_RMID, ptr::null_mut()) };
        if rc < 0 {
            return Err(last_errno());
        }
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::shmdt(self.ptr);
            }
            self.ptr = ptr::null_mut();
        }
    }
}

impl Drop for PlatformSegment {
    fn drop(&mut self) {
        self.close();
    }
}
