// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Integration tests exercising round-trip, relocation, freed-terminal,
//! null-callback-result, and clone-independence behavior.
//!
//! The concurrent-increment-across-real-processes scenario lives in
//! `tests/concurrent_increment.rs` (Unix-only, uses `fork`).

use parcel::{Parcel, ParcelConfig};

#[test]
fn round_trip_small_value() {
    let p = Parcel::<String>::new(&"hello".to_string()).unwrap();
    assert_eq!(p.unwrap().unwrap(), "hello");
    p.wrap(&"world".to_string()).unwrap();
    assert_eq!(p.unwrap().unwrap(), "world");
    p.free().unwrap();
}

#[test]
fn relocation_trigger_and_chase_from_a_stale_handle() {
    let p = Parcel::<Vec<u8>>::with_config(
        &Vec::new(),
        ParcelConfig {
            capacity: 32,
            permissions: 0o600,
        },
    )
    .unwrap();

    // A second handle attaches to the original segment *before* the
    // relocation, the way a cooperating process would hold it across the
    // whole lifetime of the parcel: its own attachment stays valid even
    // after the relocating handle marks the key deleted and detaches,
    // which is exactly the rendezvous the header protocol exists for.
    let stale = Parcel::<Vec<u8>>::from_handle(p.handle()).unwrap();

    let big = vec![0xABu8; 1024];
    p.wrap(&big).unwrap();

    assert_eq!(stale.unwrap().unwrap(), big);

    p.free().unwrap();
}

#[test]
fn freed_is_terminal_but_prior_clone_survives() {
    let p = Parcel::<i64>::new(&42).unwrap();
    let clone = p.try_clone().unwrap();

    p.free().unwrap();
    assert!(p.is_freed());
    let err = p.unwrap().unwrap_err();
    assert!(matches!(err, parcel::ParcelError::Freed));

    assert_eq!(clone.unwrap().unwrap(), 42);
    clone.free().unwrap();
}

#[test]
fn none_callback_result_keeps_input() {
    let p = Parcel::<i64>::new(&7).unwrap();
    let result = p.synchronized(|_n| None).unwrap();
    assert_eq!(result, None);
    assert_eq!(p.unwrap().unwrap(), 7);
    p.free().unwrap();
}

#[test]
fn some_callback_result_replaces_value_and_is_returned() {
    let p = Parcel::<i64>::new(&7).unwrap();
    let result = p.synchronized(|n| Some(n + 1)).unwrap();
    assert_eq!(result, Some(8));
    assert_eq!(p.unwrap().unwrap(), 8);
    p.free().unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct Point {
    a: i64,
}

#[test]
fn clone_independence() {
    let p1 = Parcel::<Point>::new(&Point { a: 1 }).unwrap();
    let p2 = p1.try_clone().unwrap();

    p2.wrap(&Point { a: 2 }).unwrap();

    assert_eq!(p1.unwrap().unwrap(), Point { a: 1 });
    assert_eq!(p2.unwrap().unwrap(), Point { a: 2 });

    p1.free().unwrap();
    p2.free().unwrap();
}

#[test]
fn header_stability_after_repeated_wraps() {
    let p = Parcel::<i64>::new(&0).unwrap();
    for n in 1..=50 {
        p.wrap(&n).unwrap();
        assert_eq!(p.unwrap().unwrap(), n);
    }
    p.free().unwrap();
}

#[test]
fn capacity_doubles_on_relocation() {
    let p = Parcel::<Vec<u8>>::with_config(
        &Vec::new(),
        ParcelConfig {
            capacity: 16,
            permissions: 0o600,
        },
    )
    .unwrap();
    let old_capacity = {
        let handle = p.handle();
        let seg = parcel_segment::Segment::open(handle.current_key()).unwrap();
        let cap = seg.capacity();
        seg.close();
        cap
    };

    let value = vec![1u8; 200];
    p.wrap(&value).unwrap();

    let handle_after = p.handle();
    let seg_after = parcel_segment::Segment::open(handle_after.current_key()).unwrap();
    assert!(seg_after.capacity() >= 2 * value.len() + parcel_segment::HEADER_LEN);
    assert!(seg_after.capacity() > old_capacity);
    seg_after.close();

    p.free().unwrap();
}

#[test]
fn freed_while_another_handle_still_attached_is_observed_on_next_unwrap() {
    let p = Parcel::<i64>::new(&9).unwrap();
    let other = Parcel::<i64>::from_handle(p.handle()).unwrap();

    p.free().unwrap();

    let err = other.unwrap().unwrap_err();
    assert!(matches!(err, parcel::ParcelError::Freed));
}
