// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! System V semaphore backing (`semget`/`semop`/`semctl`), one-element set
//! initialised to 1, using `SEM_UNDO` so a process that dies while holding
//! the mutex has its hold released by the kernel at exit rather than
//! leaking the lock forever.

use std::io;

pub(crate) struct PlatformMutex {
    id: libc::c_int,
}

unsafe impl Send for PlatformMutex {}
unsafe impl Sync for PlatformMutex {}

fn last_errno() -> io::Error {
    io::Error::last_os_error()
}

fn sembuf(op: i16, flags: i16) -> libc::sembuf {
    libc::sembuf {
        sem_num: 0,
        sem_op: op,
        sem_flg: flags,
    }
}

impl PlatformMutex {
    pub(crate) fn create(key: u32) -> io::Result<Self> {
        let id = unsafe {
            libc::semget(
                key as libc::key_t,
                1,
                libc::IPC_CREAT | libc::IPC_EXCL | 0o600,
            )
        };
        if id < 0 {
            return Err(last_errno());
        }
        let rc = unsafe { libc::semctl(id, 0, libc::SETVAL, 1i32) };
        if rc < 0 {
            let err = last_errno();
            unsafe { libc::semctl(id, 0, libc::IPC_RMID) };
            return Err(err);
        }
        Ok(PlatformMutex { id })
    }

    pub(crate) fn open(key: u32) -> io::Result<Self> {
        let id = unsafe { libc::semget(key as libc::key_t, 0, 0) };
        if id < 0 {
            return Err(last_errno());
        }
        Ok(PlatformMutex { id })
    }

    pub(crate) fn acquire(&self) -> io::Result<()> {
        let mut op = sembuf(-1, libc::SEM_UNDO);
        let rc = unsafe { libc::semop(self.id, &mut op, 1) };
        if rc < 0 {
            return Err(last_errno());
        }
        Ok(())
    }

    pub(crate) fn release(&self) -> io::Result<()> {
        let mut op = sembuf(1, libc::SEM_UNDO);
        let rc = unsafe { libc::semop(self.id, &mut op, 1) };
        if rc < 0 {
            return Err(last_errno());
        }
        Ok(())
    }

    pub(crate) fn free(&self) -> io::Result<()> {
        let rc = unsafe { libc::semctl(self.id, 0, libc::IPC_RMID) };
        if rc < 0 {
            return Err(last_errno());
        }
        Ok(())
    }
}
