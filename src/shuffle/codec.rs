//! Pluggable message encoding for framed streams.
//!
//! This module provides the [`MessageCodec`] trait and two built-in
//! implementations:
//!
//! - [`JsonCodec`]: human-readable JSON (always available)
//! - `BincodeCodec`: compact binary format (requires the `bincode`
//!   feature, enabled by default)
//!
//! It also defines [`KeyValue`], the message carried by shuffle partition
//! files.
//!
//! # Empty Encodings
//!
//! A length prefix of `1` is reserved by the framing layer to mean "empty
//! message", so a codec must never produce a one-byte encoding for a
//! non-empty value. Both built-in codecs encode a [`KeyValue`] to at least
//! two bytes.

use super::error::ShuffleError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Converts messages to and from byte buffers.
pub trait MessageCodec: Clone + Send + Sync + std::fmt::Debug {
    /// Serialize `message` into a new buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ShuffleError::Serialization`] if the message cannot be
    /// encoded.
    fn encode<M: Serialize>(&self, message: &M) -> Result<Vec<u8>, ShuffleError>;

    /// Deserialize a message from `data`.
    ///
    /// # Errors
    ///
    /// Returns [`ShuffleError::Deserialization`] if the bytes are malformed.
    fn decode<M: DeserializeOwned>(&self, data: &[u8]) -> Result<M, ShuffleError>;

    /// MIME-like identifier of the format, e.g. `"application/json"`.
    #[must_use]
    fn content_type(&self) -> &'static str;
}

// ─── JSON ───────────────────────────────────────────────────────────────────

/// JSON codec using `serde_json`.
///
/// # Content Type
///
/// `"application/json"`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl MessageCodec for JsonCodec {
    fn encode<M: Serialize>(&self, message: &M) -> Result<Vec<u8>, ShuffleError> {
        serde_json::to_vec(message).map_err(|e| ShuffleError::Serialization {
            message: e.to_string(),
        })
    }

    fn decode<M: DeserializeOwned>(&self, data: &[u8]) -> Result<M, ShuffleError> {
        serde_json::from_slice(data).map_err(|e| ShuffleError::Deserialization {
            message: e.to_string(),
        })
    }

    #[inline]
    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

// ─── Bincode ────────────────────────────────────────────────────────────────

/// Bincode codec using bincode 2's serde bridge with the standard
/// configuration (varint integers, little endian).
///
/// # Content Type
///
/// `"application/x-bincode"`
#[cfg(feature = "bincode")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

#[cfg(feature = "bincode")]
impl BincodeCodec {
    /// Create a new Bincode codec.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "bincode")]
impl MessageCodec for BincodeCodec {
    fn encode<M: Serialize>(&self, message: &M) -> Result<Vec<u8>, ShuffleError> {
        bincode::serde::encode_to_vec(message, bincode::config::standard()).map_err(|e| {
            ShuffleError::Serialization {
                message: e.to_string(),
            }
        })
    }

    fn decode<M: DeserializeOwned>(&self, data: &[u8]) -> Result<M, ShuffleError> {
        let (message, _) = bincode::serde::decode_from_slice(data, bincode::config::standard())
            .map_err(|e| ShuffleError::Deserialization {
                message: e.to_string(),
            })?;
        Ok(message)
    }

    #[inline]
    fn content_type(&self) -> &'static str {
        "application/x-bincode"
    }
}

/// Codec used when none is named: Bincode when available, JSON otherwise.
#[cfg(feature = "bincode")]
pub type DefaultCodec = BincodeCodec;

/// Codec used when none is named: Bincode when available, JSON otherwise.
#[cfg(not(feature = "bincode"))]
pub type DefaultCodec = JsonCodec;

// ─── Messages ───────────────────────────────────────────────────────────────

/// One key/value pair as written to a shuffle partition file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyValue {
    /// Raw key bytes; partitioning and ordering use these.
    pub key: Vec<u8>,
    /// Raw value bytes.
    pub value: Vec<u8>,
}

impl KeyValue {
    /// Create a pair from anything convertible to byte vectors.
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Compare by key only, as unsigned bytes.
    #[inline]
    #[must_use]
    pub fn cmp_key(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }

    /// `true` if `a` sorts strictly before `b` by key.
    #[inline]
    #[must_use]
    pub fn key_less(a: &Self, b: &Self) -> bool {
        a.key < b.key
    }
}
