// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Named file mapping backing (`CreateFileMappingW`/`MapViewOfFile`).
//!
//! Windows has no integer-keyed shared memory primitive, so the u32 key
//! is rendered into a well-known object name and a named file mapping
//! over the system paging file stands in for a SysV segment.

use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use winapi::shared::minwindef::DWORD;
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::memoryapi::{MapViewOfFile, UnmapViewOfFile, VirtualQuery, FILE_MAP_ALL_ACCESS};
use winapi::um::winbase::CreateFileMappingW;
use winapi::um::winnt::{HANDLE, MEMORY_BASIC_INFORMATION, PAGE_READWRITE};

fn wide_name(key: u32) -> Vec<u16> {
    let name = format!("Local\\dd-parcel-segment-{key:08x}");
    OsStr::new(&name)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

fn last_error() -> io::Error {
    io::Error::last_os_error()
}

pub(crate) struct PlatformSegment {
    mapping: HANDLE,
    ptr: *mut winapi::ctypes::c_void,
    size: usize,
}

unsafe impl Send for PlatformSegment {}
unsafe impl Sync for PlatformSegment {}

impl PlatformSegment {
    pub(crate) fn create(key: u32, _permissions: u16, capacity: usize) -> io::Result<Self> {
        let name = wide_name(key);
        // Windows permission bits do not map onto POSIX mode bits; the
        // mapping is created with a default DACL and permissions are left
        // to the caller's process identity rather than attempting a POSIX
        // permission translation.
        let mapping = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                ptr::null_mut(),
                PAGE_READWRITE,
                0,
                capacity as DWORD,
                name.as_ptr(),
            )
        };
        if mapping.is_null() {
            return Err(last_error());
        }
        // CreateFileMappingW succeeds but sets ERROR_ALREADY_EXISTS when a
        // mapping of that name is already live; create must fail in that
        // case to match `create` semantics on Unix.
        let already_exists = io::Error::last_os_error().raw_os_error() == Some(183);
        if already_exists {
            unsafe { CloseHandle(mapping) };
            return Err(io::Error::from_raw_os_error(183));
        }
        Self::map(mapping, capacity)
    }

    pub(crate) fn open(key: u32) -> io::Result<Self> {
        let name = wide_name(key);
        let mapping =
            unsafe { winapi::um::memoryapi::OpenFileMappingW(FILE_MAP_ALL_ACCESS, 0, name.as_ptr()) };
        if mapping.is_null() {
            return Err(last_error());
        }
        // The mapping's size is not recoverable from its handle; query the
        // committed region of the view instead.
        let probe = unsafe { MapViewOfFile(mapping, FILE_MAP_ALL_ACCESS, 0, 0, 0) };
        if probe.is_null() {
            let err = last_error();
            unsafe { CloseHandle(mapping) };
            return Err(err);
        }
        let mut mbi: MEMORY_BASIC_INFORMATION = unsafe { std::mem::zeroed() };
        let written = unsafe {
            VirtualQuery(
                probe,
                &mut mbi,
                std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if written == 0 {
            let err = last_error();
            unsafe {
                UnmapViewOfFile(probe);
                CloseHandle(mapping);
            }
            return Err(err);
        }
        Ok(PlatformSegment {
            mapping,
            ptr: probe,
            size: mbi.RegionSize,
        })
    }

    fn map(mapping: HANDLE, capacity: usize) -> io::Result<Self> {
        let ptr = unsafe { MapViewOfFile(mapping, FILE_MAP_ALL_ACCESS, 0, 0, capacity) };
        if ptr.is_null() {
            let err = last_error();
            unsafe { CloseHandle(mapping) };
            return Err(err);
        }
        Ok(PlatformSegment {
            mapping,
            ptr,
            size: capacity,
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.size
    }

    pub(crate) fn read(&self, offset: usize, len: usize) -> io::Result<Vec<u8>> {
        self.bounds_check(offset, len)?;
        let mut buf = vec![0u8; len];
        unsafe {
            ptr::copy_nonoverlapping(
                (self.ptr as *const u8).add(offset),
                buf.as_mut_ptr(),
                len,
            );
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
        // Named kernel objects on Windows are reference-counted and vanish
        // once the last handle closes; there is no separate "mark for
        // deletion while still attached" call, so this is a no-op whose
        // effect is achieved by `close` dropping our reference.
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                UnmapViewOfFile(self.ptr);
            }
            self.ptr = ptr::null_mut();
        }
        if !self.mapping.is_null() {
            unsafe {
                CloseHandle(self.mapping);
            }
            self.mapping = ptr::null_mut();
        }
    }
}

impl Drop for PlatformSegment {
    fn drop(&mut self) {
        self.close();
    }
}
