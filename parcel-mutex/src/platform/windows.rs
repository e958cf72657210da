// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Named semaphore backing (`CreateSemaphoreW`/`WaitForSingleObject`/
//! `ReleaseSemaphore`).

use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use winapi::um::handleapi::CloseHandle;
use winapi::um::synchapi::{CreateSemaphoreW, OpenSemaphoreW, ReleaseSemaphore, WaitForSingleObject};
use winapi::um::winbase::{INFINITE, WAIT_FAILED, WAIT_OBJECT_0};
use winapi::um::winnt::{HANDLE, SEMAPHORE_ALL_ACCESS};

fn wide_name(key: u32) -> Vec<u16> {
    let name = format!("Local\\dd-parcel-mutex-{key:08x}");
    OsStr::new(&name)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

fn last_error() -> io::Error {
    io::Error::last_os_error()
}

pub(crate) struct PlatformMutex {
    handle: HANDLE,
}

unsafe impl Send for PlatformMutex {}
unsafe impl Sync for PlatformMutex {}

impl PlatformMutex {
    pub(crate) fn create(key: u32) -> io::Result<Self> {
        let name = wide_name(key);
        let handle = unsafe { CreateSemaphoreW(ptr::null_mut(), 1, 1, name.as_ptr()) };
        if handle.is_null() {
            return Err(last_error());
        }
        if io::Error::last_os_error().raw_os_error() == Some(183) {
            unsafe { CloseHandle(handle) };
            return Err(io::Error::from_raw_os_error(183));
        }
        Ok(PlatformMutex { handle })
    }

    pub(crate) fn open(key: u32) -> io::Result<Self> {
        let name = wide_name(key);
        let handle = unsafe { OpenSemaphoreW(SEMAPHORE_ALL_ACCESS, 0, name.as_ptr()) };
        if handle.is_null() {
            return Err(last_error());
        }
        Ok(PlatformMutex { handle })
    }

    pub(crate) fn acquire(&self) -> io::Result<()> {
        let rc = unsafe { WaitForSingleObject(self.handle, INFINITE) };
        if rc == WAIT_OBJECT_0 {
            Ok(())
        } else if rc == WAIT_FAILED {
            Err(last_error())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("unexpected WaitForSingleObject result {rc}"),
            ))
        }
    }

    pub(crate) fn release(&self) -> io::Result<()> {
        let rc = unsafe { ReleaseSemaphore(self.handle, 1, ptr::null_mut()) };
        if rc == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    pub(crate) fn free(&self) -> io::Result<()> {
        // Named kernel semaphores are reference-counted; there is no
        // explicit "mark for removal" distinct from the last handle
        // closing, so free is folded into Drop below.
        Ok(())
    }
}

impl Drop for PlatformMutex {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe {
                CloseHandle(self.handle);
            }
            self.handle = ptr::null_mut();
        }
    }
}
