//! Error types for the shuffle layer.

use crate::record::RecordError;
use std::io;

/// Errors that can occur while framing, merging or shuffling messages.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ShuffleError {
    /// An I/O error from a partition file or message source.
    #[error("shuffle I/O error: {0}")]
    Io(io::Error),

    /// An error from the block-aligned log underneath a partition file.
    #[error("record log error: {0}")]
    Record(#[from] RecordError),

    /// A message could not be encoded.
    #[error("message serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// A message body could not be decoded.
    #[error("message deserialization error: {message}")]
    Deserialization {
        /// Description of the failure.
        message: String,
    },

    /// The stream ended inside a message body.
    #[error("unexpected end of stream: expected {expected} bytes, read {read}")]
    UnexpectedEof {
        /// Declared message length.
        expected: usize,
        /// Bytes actually available.
        read: usize,
    },

    /// A length prefix is malformed or truncated.
    #[error("malformed message length prefix")]
    BadLength,

    /// A length prefix declares a message above the reader's cap.
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge {
        /// Declared message length.
        size: u64,
        /// The reader's cap.
        limit: u64,
    },

    /// A shuffle writer needs at least one partition.
    #[error("shuffle writer requires at least one partition")]
    NoPartitions,

    /// Shuffle configuration is inconsistent.
    #[error("invalid shuffle configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },
}

/// I/O errors raised through a block-aligned log's `Write` impl may carry a
/// [`RecordError`]; those come back out as [`ShuffleError::Record`].
impl From<io::Error> for ShuffleError {
    fn from(err: io::Error) -> Self {
        match RecordError::from_io(err) {
            RecordError::Io(e) => ShuffleError::Io(e),
            other => ShuffleError::Record(other),
        }
    }
}

impl ShuffleError {
    /// Returns `true` if the error is a clean-stream violation: the source
    /// ended where a message body or length was still expected.
    #[must_use]
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            ShuffleError::UnexpectedEof { .. } | ShuffleError::BadLength
        )
    }
}
