// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Real multi-process exercise of `synchronized`, in the style of
//! `spawn_worker/tests/trampoline_unix.rs`: fork worker processes that
//! share the parent's already-attached shared memory and semaphore (SysV
//! shm and sem both survive `fork`, which is exactly the property the
//! mutex's `SEM_UNDO` flag and the segment's key-based addressing are
//! there to make use of) and assert the total after every worker exits.

#![cfg(unix)]

use parcel::Parcel;

fn fork_worker(p: &Parcel<i64>, increments: i64) -> libc::pid_t {
    let pid = unsafe { libc::fork() };
    match pid {
        0 => {
            for _ in 0..increments {
                p.synchronized(|n| Some(n + 1))
                    .expect("synchronized increment failed in child");
            }
            unsafe { libc::_exit(0) };
        }
        child if child > 0 => child,
        _ => panic!("fork failed: {}", std::io::Error::last_os_error()),
    }
}

fn wait_for_clean_exit(pid: libc::pid_t) {
    let mut status: libc::c_int = 0;
    let rc = unsafe { libc::waitpid(pid, &mut status, 0) };
    assert_eq!(rc, pid, "waitpid failed: {}", std::io::Error::last_os_error());
    assert!(
        libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0,
        "child {pid} exited abnormally: status {status}"
    );
}

#[test]
fn two_processes_interleave_a_thousand_increments_each() {
    let p = Parcel::<i64>::new(&0).unwrap();

    let increments = 1000;
    let child_a = fork_worker(&p, increments);
    let child_b = fork_worker(&p, increments);

    wait_for_clean_exit(child_a);
    wait_for_clean_exit(child_b);

    assert_eq!(p.unwrap().unwrap(), 2 * increments);

    p.free().unwrap();
}
