//! Error types for the record subsystem.
//!
//! [`RecordError`] covers every failure of the chunk codec, the
//! block-aligned logs and the log writer/reader: capacity problems detected
//! before any I/O, corruption detected at decode time, and I/O failures of
//! the underlying storage, which are passed through untouched.

use std::io;
use uuid::Uuid;

/// Errors that can occur while encoding, decoding or appending records.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RecordError {
    /// The buffer is larger than the log's record limit and cannot be
    /// appended atomically.
    #[error("cannot atomically append a record that large: {size} bytes exceeds limit {limit}")]
    RecordTooBig {
        /// Size of the rejected buffer in bytes.
        size: usize,
        /// The log's record limit in bytes.
        limit: usize,
    },

    /// The requested chunk size cannot hold a header plus one payload byte.
    #[error("requested chunk size {max_size} too small")]
    ChunkTooSmall {
        /// The requested maximum encoded chunk size.
        max_size: usize,
    },

    /// The stored checksum does not match the one computed from the chunk.
    #[error("record did not pass checksum: stored {expected:#010x}, computed {actual:#010x}")]
    BadChecksum {
        /// Checksum stored in the encoded chunk.
        expected: u32,
        /// Checksum computed from the decoded fields.
        actual: u32,
    },

    /// The payload length varint is malformed or truncated.
    #[error("could not parse payload size")]
    BadSize,

    /// The buffer ends before the chunk does.
    #[error("truncated chunk: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required to finish decoding.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// The kind byte does not name a known chunk kind.
    #[error("unknown chunk kind {0}")]
    UnknownChunkKind(u8),

    /// Merging needs at least two chunks.
    #[error("need at least two chunks to combine, got {0}")]
    NotEnoughChunks(usize),

    /// The first chunk passed to a merge is not a `First` chunk.
    #[error("need a first chunk to combine")]
    NoFirstChunk,

    /// A chunk belongs to a different record than the first chunk.
    #[error("chunk of record {found} cannot be merged into record {expected}")]
    MismatchedRecordId {
        /// Record id of the first chunk.
        expected: Uuid,
        /// Record id of the offending chunk.
        found: Uuid,
    },

    /// Chunk ids are not contiguous from zero.
    #[error("chunk out of order: expected chunk {expected}, found {found}")]
    ChunkOutOfOrder {
        /// The chunk id that should come next.
        expected: u32,
        /// The chunk id that was found instead.
        found: u32,
    },

    /// The chunk sequence ended without a `Last` chunk.
    #[error("record is missing its last chunk")]
    IncompleteRecord,

    /// Log options are inconsistent.
    #[error("invalid log options: {message}")]
    InvalidOptions {
        /// Description of the problem.
        message: String,
    },

    /// An internal mutex was poisoned (another thread panicked while
    /// holding the lock).
    #[error("record log internal mutex poisoned")]
    MutexPoisoned,

    /// An I/O error from the underlying storage.
    #[error("record log I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RecordError {
    /// Returns `true` for errors raised before any I/O because a buffer
    /// cannot fit the log's limits.
    #[must_use]
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            RecordError::RecordTooBig { .. } | RecordError::ChunkTooSmall { .. }
        )
    }

    /// Returns `true` for errors that indicate damaged bytes.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            RecordError::BadChecksum { .. }
                | RecordError::BadSize
                | RecordError::Truncated { .. }
                | RecordError::UnknownChunkKind(_)
        )
    }

    /// Wraps this error in an [`io::Error`] so it can travel through
    /// `std::io::Write` implementations.
    ///
    /// The original error can be recovered with [`RecordError::from_io`].
    pub(crate) fn into_io(self) -> io::Error {
        match self {
            RecordError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        }
    }

    /// Recovers a [`RecordError`] previously wrapped by `into_io`, or
    /// wraps a plain I/O error.
    #[must_use]
    pub fn from_io(err: io::Error) -> Self {
        if err
            .get_ref()
            .is_some_and(|inner| inner.is::<RecordError>())
        {
            if let Some(inner) = err.into_inner() {
                if let Ok(record) = inner.downcast::<RecordError>() {
                    return *record;
                }
            }
            return RecordError::Io(io::Error::other("unrecoverable wrapped record error"));
        }
        RecordError::Io(err)
    }
}
