// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The 7-byte header every segment begins with.
//!
//! ```text
//! offset 0: u8   state       (0..=3)
//! offset 1: u32  size_or_key (little-endian)
//! offset 5: u16  permissions (little-endian)
//! offset 7: .... payload
//! ```

/// Size in bytes of the fixed header every segment carries.
pub const HEADER_LEN: usize = 7;

/// Failure decoding a header from raw bytes. Distinct from [`crate::SegmentError`]:
/// these are data-validity problems in bytes the OS successfully returned,
/// not a failure of the read itself, so callers need to tell the two apart.
#[derive(Debug, thiserror::Error)]
pub enum HeaderDecodeError {
    #[error("segment shorter than the {HEADER_LEN}-byte header: got {0} bytes")]
    Truncated(usize),
    #[error("unrecognised header state byte {0}")]
    InvalidState(u8),
}

/// State byte at offset 0 of every segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Unallocated = 0,
    Allocated = 1,
    Moved = 2,
    Freed = 3,
}

impl State {
    fn from_u8(b: u8) -> Option<State> {
        match b {
            0 => Some(State::Unallocated),
            1 => Some(State::Allocated),
            2 => Some(State::Moved),
            3 => Some(State::Freed),
            _ => None,
        }
    }
}

/// A decoded segment header.
///
/// `size_or_key` is the payload length when `state == Allocated`, and the
/// next segment's key when `state == Moved`. The field is left as a raw u32
/// to keep that overload explicit at every call site instead of hiding it
/// behind an enum variant that would need to lie about one of the two
/// cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub state: State,
    pub size_or_key: u32,
    pub permissions: u16,
}

impl Header {
    pub fn new(state: State, size_or_key: u32, permissions: u16) -> Self {
        Header {
            state,
            size_or_key,
            permissions,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.state as u8;
        buf[1..5].copy_from_slice(&self.size_or_key.to_le_bytes());
        buf[5..7].copy_from_slice(&self.permissions.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Header, HeaderDecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(HeaderDecodeError::Truncated(bytes.len()));
        }
        let state =
            State::from_u8(bytes[0]).ok_or(HeaderDecodeError::InvalidState(bytes[0]))?;
        let size_or_key = u32::from_le_bytes(bytes[1..5].try_into().unwrap());
        let permissions = u16::from_le_bytes(bytes[5..7].try_into().unwrap());
        Ok(Header {
            state,
            size_or_key,
            permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let h = Header::new(State::Allocated, 1024, 0o600);
        let bytes = h.encode();
        let decoded = Header::decode(&bytes).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn rejects_unrecognised_state() {
        let bytes = [9u8, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            Header::decode(&bytes),
            Err(HeaderDecodeError::InvalidState(9))
        ));
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(matches!(
            Header::decode(&[1, 2, 3]),
            Err(HeaderDecodeError::Truncated(3))
        ));
    }
}
