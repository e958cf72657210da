// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Demonstrates a parent forking worker processes that all increment a
//! shared counter through the same parcel, in the style of
//! `ddtelemetry/examples/tm-metrics-worker-test.rs`: the crate itself
//! never installs a subscriber, only the example does.

use parcel::Parcel;

#[cfg(unix)]
fn main() {
    tracing_subscriber::fmt::init();

    let counter = Parcel::<i64>::new(&0).expect("failed to create parcel");
    tracing::info!(handle = ?counter.handle(), "created shared counter");

    const WORKERS: usize = 4;
    const INCREMENTS_PER_WORKER: i64 = 1000;

    let mut children = Vec::with_capacity(WORKERS);
    for worker in 0..WORKERS {
        let pid = unsafe { libc::fork() };
        match pid {
            0 => {
                for _ in 0..INCREMENTS_PER_WORKER {
                    counter
                        .synchronized(|n| Some(n + 1))
                        .expect("synchronized increment failed");
                }
                tracing::info!(worker, "exiting");
                unsafe { libc::_exit(0) };
            }
            pid if pid > 0 => children.push(pid),
            _ => panic!("fork failed: {}", std::io::Error::last_os_error()),
        }
    }

    for pid in children {
        let mut status = 0;
        unsafe { libc::waitpid(pid, &mut status, 0) };
    }

    let total = counter.unwrap().expect("final read failed");
    tracing::info!(total, expected = WORKERS as i64 * INCREMENTS_PER_WORKER, "done");
    assert_eq!(total, WORKERS as i64 * INCREMENTS_PER_WORKER);

    counter.free().expect("failed to free parcel");
}

#[cfg(not(unix))]
fn main() {
    eprintln!("this example forks worker processes and is Unix-only");
}
