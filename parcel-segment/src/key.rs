// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Key selection policy for segments.
//!
//! Keys are opaque 32-bit integers that double as both the SysV IPC key and
//! the Windows file-mapping name suffix, so the policy lives here rather
//! than in the parcel layer that consumes it.

use std::hash::{Hash, Hasher};
use zwohash::ZwoHasher;

/// Lower bound (inclusive) of the random fallback range used once
/// sequential `key + 1` allocation wraps past `u32::MAX`.
pub const RANDOM_RANGE_MIN: u32 = 0x10;
/// Upper bound (inclusive) of the random fallback range.
pub const RANDOM_RANGE_MAX: u32 = 0xFFFF_FFFE;

/// Picks the key for a freshly relocated segment given the key of the
/// segment it replaces.
///
/// `current + 1` while that stays below `u32::MAX`, otherwise a random key
/// in `[RANDOM_RANGE_MIN, RANDOM_RANGE_MAX]`. A collision at the new key
/// surfaces as `SegmentError::Create` from the caller's subsequent
/// `Segment::create` and is not retried here.
pub fn next_key(current: u32) -> u32 {
    if current < u32::MAX {
        current + 1
    } else {
        fastrand::u32(RANDOM_RANGE_MIN..=RANDOM_RANGE_MAX)
    }
}

/// Derives an initial segment key from a stable hash of some identity value
/// unique to the handle being constructed.
///
/// This is a uniqueness heuristic, not a guarantee: two handles can still
/// collide, in which case `Segment::create` fails and the caller treats it
/// as a construction-time error rather than a silent retry.
pub fn derive_initial_key<H: Hash>(identity: &H) -> u32 {
    let mut hasher = ZwoHasher::default();
    identity.hash(&mut hasher);
    let hash = hasher.finish();
    // Fold to 32 bits and keep clear of the reserved low range used by
    // well-known SysV keys on some platforms.
    let folded = (hash ^ (hash >> 32)) as u32;
    folded.max(RANDOM_RANGE_MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_until_wraparound() {
        assert_eq!(next_key(5), 6);
        assert_eq!(next_key(0xFFFF_FFFE), 0xFFFF_FFFF);
    }

    #[test]
    fn wraps_to_random_range() {
        let k = next_key(u32::MAX);
        assert!((RANDOM_RANGE_MIN..=RANDOM_RANGE_MAX).contains(&k));
    }

    #[test]
    fn identity_hash_is_stable() {
        let a = derive_initial_key(&("pid", 1234u32, "counter", 7u64));
        let b = derive_initial_key(&("pid", 1234u32, "counter", 7u64));
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_identities_usually_differ() {
        let a = derive_initial_key(&1u64);
        let b = derive_initial_key(&2u64);
        assert_ne!(a, b);
    }
}
