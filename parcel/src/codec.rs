// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The pluggable encode/decode boundary between a Rust value and the bytes
//! stored in a segment's payload.
//!
//! Parameterising [`crate::Parcel`] over a `Codec<T>` instead of hard-wiring
//! one universal (de)serializer keeps the payload boundary, and its single
//! failure mode, explicit at the type level.

/// Total (for valid inputs) conversion between `T` and bytes.
///
/// Implementations should not panic; any failure on the decode side must
/// be reported through the `Result` so the parcel can surface it as
/// [`crate::ParcelError::Corrupt`].
pub trait Codec<T> {
    /// Serializes `value` to bytes.
    fn encode(value: &T) -> Result<Vec<u8>, CodecError>;
    /// Deserializes bytes produced by [`Codec::encode`] back into `T`.
    fn decode(bytes: &[u8]) -> Result<T, CodecError>;
}

/// An encode or decode failure. Always surfaces to callers as
/// [`crate::ParcelError::Corrupt`].
#[derive(Debug, thiserror::Error)]
#[error("codec error: {0}")]
pub struct CodecError(pub(crate) String);

/// The default codec: [`bincode`]'s compact binary format, for any `T`
/// implementing `serde`'s `Serialize`/`DeserializeOwned`.
pub struct BincodeCodec;

impl<T> Codec<T> for BincodeCodec
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    fn encode(value: &T) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(value).map_err(|e| CodecError(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<T, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bincode_round_trips_primitives() {
        let bytes = <BincodeCodec as Codec<i64>>::encode(&42).unwrap();
        let value: i64 = <BincodeCodec as Codec<i64>>::decode(&bytes).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn bincode_rejects_truncated_bytes() {
        let bytes = <BincodeCodec as Codec<Vec<u8>>>::encode(&vec![1, 2, 3, 4, 5]).unwrap();
        let err = <BincodeCodec as Codec<Vec<u8>>>::decode(&bytes[..2]).unwrap_err();
        assert!(!err.0.is_empty());
    }
}
