//! Record chunk codec.
//!
//! A [`Record`] is the unit persisted by a block-aligned log. A logical
//! record whose encoding does not fit the log's record limit is split into
//! an ordered run of chunks that share one record id.
//!
//! # On-Disk Chunk Format
//!
//! ```text
//! [16 bytes: record_id][4 bytes: chunk_id BE][1 byte: kind]
//! [4 bytes: checksum BE][uvarint: payload_len][payload_len bytes: payload]
//! ```
//!
//! - The record id and chunk id come first and the chunk id is big-endian,
//!   so sorting encoded chunks groups the members of a record in order.
//! - The CRC32 checksum covers `record_id ‖ chunk_id ‖ kind ‖ payload`
//!   (not the length prefix).

use super::error::RecordError;
use crate::utils::varint::{get_uvarint, put_uvarint, uvarint_len};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

/// Size of the fixed part of a chunk header in bytes.
///
/// Layout: `[16 bytes record_id][4 bytes chunk_id][1 byte kind][4 bytes checksum]`
pub const FIXED_HEADER_SIZE: usize = 16 + 4 + 1 + 4;

/// Smallest possible encoded chunk: a fixed header and a one-byte length.
pub const MIN_CHUNK_SIZE: usize = FIXED_HEADER_SIZE + 1;

/// Size of the header of a chunk carrying `payload_len` bytes.
#[inline]
#[must_use]
pub fn header_size(payload_len: usize) -> usize {
    FIXED_HEADER_SIZE + uvarint_len(payload_len as u64)
}

/// Encoded size of a chunk carrying `payload_len` bytes.
#[inline]
#[must_use]
pub fn chunk_size(payload_len: usize) -> usize {
    header_size(payload_len) + payload_len
}

/// Position of a chunk within its logical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChunkKind {
    /// The whole logical record fits in this chunk.
    Full = 0,
    /// First chunk of a split record.
    First = 1,
    /// Interior chunk of a split record.
    Middle = 2,
    /// Final chunk of a split record.
    Last = 3,
}

impl ChunkKind {
    /// The byte stored on disk for this kind.
    #[inline]
    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ChunkKind {
    type Error = RecordError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ChunkKind::Full),
            1 => Ok(ChunkKind::First),
            2 => Ok(ChunkKind::Middle),
            3 => Ok(ChunkKind::Last),
            other => Err(RecordError::UnknownChunkKind(other)),
        }
    }
}

/// A single chunk of a logical record.
///
/// Chunks are immutable once produced. The payload is a [`Bytes`] handle,
/// so splitting a record shares the original buffer instead of copying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    record_id: Uuid,
    chunk_id: u32,
    kind: ChunkKind,
    payload: Bytes,
}

impl Record {
    /// Create a `Full` record with a fresh time-ordered (UUIDv7) id.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self::with_id(Uuid::now_v7(), payload)
    }

    /// Create a `Full` record with the given id.
    ///
    /// Avoid the nil id: it makes the start of a chunk look like block
    /// padding.
    pub fn with_id(record_id: Uuid, payload: impl Into<Bytes>) -> Self {
        Self {
            record_id,
            chunk_id: 0,
            kind: ChunkKind::Full,
            payload: payload.into(),
        }
    }

    /// The id shared by every chunk of this logical record.
    #[inline]
    #[must_use]
    pub fn record_id(&self) -> Uuid {
        self.record_id
    }

    /// Zero-based position of this chunk within its record.
    #[inline]
    #[must_use]
    pub fn chunk_id(&self) -> u32 {
        self.chunk_id
    }

    /// The chunk kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ChunkKind {
        self.kind
    }

    /// The payload bytes carried by this chunk.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the chunk and return its payload.
    #[inline]
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Encoded size of this chunk in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        chunk_size(self.payload.len())
    }

    /// CRC32 over `record_id ‖ chunk_id (BE) ‖ kind ‖ payload`.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        compute_checksum(
            &self.record_id,
            self.chunk_id,
            self.kind.as_byte(),
            &self.payload,
        )
    }

    /// Encode this chunk into a new buffer.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        self.encode_to(&mut buf);
        buf.freeze()
    }

    /// Append the encoding of this chunk to `buf`.
    pub fn encode_to(&self, buf: &mut impl BufMut) {
        buf.put_slice(self.record_id.as_bytes());
        buf.put_u32(self.chunk_id);
        buf.put_u8(self.kind.as_byte());
        buf.put_u32(self.checksum());
        put_uvarint(buf, self.payload.len() as u64);
        buf.put_slice(&self.payload);
    }

    /// Decode a chunk from the start of `buf`, ignoring trailing bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Truncated`] if `buf` is shorter than the
    /// chunk, [`RecordError::BadSize`] if the length varint is malformed
    /// and [`RecordError::BadChecksum`] if the chunk was altered.
    pub fn decode(buf: &[u8]) -> Result<Self, RecordError> {
        Self::decode_prefix(buf).map(|(record, _)| record)
    }

    /// Decode a chunk from the start of `buf` and return it together with
    /// the number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// See [`Record::decode`].
    pub fn decode_prefix(buf: &[u8]) -> Result<(Self, usize), RecordError> {
        if buf.len() < FIXED_HEADER_SIZE {
            return Err(RecordError::Truncated {
                needed: MIN_CHUNK_SIZE,
                available: buf.len(),
            });
        }

        let mut cursor = buf;
        let mut id = [0u8; 16];
        cursor.copy_to_slice(&mut id);
        let record_id = Uuid::from_bytes(id);
        let chunk_id = cursor.get_u32();
        let kind_byte = cursor.get_u8();
        let stored = cursor.get_u32();

        let len = get_uvarint(&mut cursor).ok_or(RecordError::BadSize)?;
        let len = usize::try_from(len).map_err(|_| RecordError::BadSize)?;
        let start = buf.len() - cursor.len();
        let end = start.checked_add(len).ok_or(RecordError::BadSize)?;
        if end > buf.len() {
            return Err(RecordError::Truncated {
                needed: end,
                available: buf.len(),
            });
        }
        let payload = &buf[start..end];

        let actual = compute_checksum(&record_id, chunk_id, kind_byte, payload);
        if actual != stored {
            return Err(RecordError::BadChecksum {
                expected: stored,
                actual,
            });
        }

        let kind = ChunkKind::try_from(kind_byte)?;
        let record = Self {
            record_id,
            chunk_id,
            kind,
            payload: Bytes::copy_from_slice(payload),
        };
        Ok((record, end))
    }

    /// Split this record into chunks whose encodings fit in `max_size`.
    ///
    /// A record that already fits is returned unchanged as a single-element
    /// vector; this is also how an empty payload is handled. Otherwise the
    /// largest payload slice that fits is found by binary search and the
    /// payload is cut into `First`, `Middle`* and `Last` chunks with
    /// contiguous chunk ids starting at zero.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::ChunkTooSmall`] if not even a single payload
    /// byte fits in `max_size`.
    pub fn split(&self, max_size: usize) -> Result<Vec<Record>, RecordError> {
        if self.size() <= max_size {
            return Ok(vec![self.clone()]);
        }

        let piece = largest_fitting_payload(self.payload.len(), max_size);
        if piece == 0 {
            return Err(RecordError::ChunkTooSmall { max_size });
        }

        let total = self.payload.len();
        let mut out = Vec::with_capacity(total.div_ceil(piece));
        let mut offset = 0usize;
        while offset < total {
            let end = (offset + piece).min(total);
            let chunk_id = out.len() as u32;
            let kind = if chunk_id == 0 {
                ChunkKind::First
            } else if end == total {
                ChunkKind::Last
            } else {
                ChunkKind::Middle
            };
            out.push(Record {
                record_id: self.record_id,
                chunk_id,
                kind,
                payload: self.payload.slice(offset..end),
            });
            offset = end;
        }

        Ok(out)
    }

    /// Reassemble a logical record from its chunks.
    ///
    /// The first chunk must be a `First` chunk, chunk ids must run
    /// contiguously from zero, every chunk must carry the same record id,
    /// and the sequence must reach a `Last` chunk. Chunks after the `Last`
    /// chunk are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotEnoughChunks`], [`RecordError::NoFirstChunk`],
    /// [`RecordError::MismatchedRecordId`], [`RecordError::ChunkOutOfOrder`]
    /// or [`RecordError::IncompleteRecord`] when the chunks do not form one
    /// complete record.
    pub fn merge<'a, I>(chunks: I) -> Result<Record, RecordError>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let chunks: Vec<&Record> = chunks.into_iter().collect();
        if chunks.len() < 2 {
            return Err(RecordError::NotEnoughChunks(chunks.len()));
        }

        let first = chunks[0];
        if first.kind != ChunkKind::First {
            return Err(RecordError::NoFirstChunk);
        }

        let capacity = chunks.iter().map(|c| c.payload.len()).sum();
        let mut payload = BytesMut::with_capacity(capacity);
        let mut expected = 0u32;
        for chunk in chunks {
            if chunk.record_id != first.record_id {
                return Err(RecordError::MismatchedRecordId {
                    expected: first.record_id,
                    found: chunk.record_id,
                });
            }
            if chunk.chunk_id != expected {
                return Err(RecordError::ChunkOutOfOrder {
                    expected,
                    found: chunk.chunk_id,
                });
            }
            payload.put_slice(&chunk.payload);
            if chunk.kind == ChunkKind::Last {
                return Ok(Record::with_id(first.record_id, payload.freeze()));
            }
            expected = expected.wrapping_add(1);
        }

        Err(RecordError::IncompleteRecord)
    }
}

/// CRC32 over the checksum-covered fields of a chunk.
fn compute_checksum(record_id: &Uuid, chunk_id: u32, kind: u8, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(record_id.as_bytes());
    hasher.update(&chunk_id.to_be_bytes());
    hasher.update(&[kind]);
    hasher.update(payload);
    hasher.finalize()
}

/// Largest `s` in `0..payload_len` such that `chunk_size(s) <= max_size`.
///
/// `chunk_size` is monotonic in the payload length, so this is a plain
/// binary search for the last fitting length.
fn largest_fitting_payload(payload_len: usize, max_size: usize) -> usize {
    let (mut lo, mut hi) = (0usize, payload_len.saturating_sub(1));
    if chunk_size(lo) > max_size {
        return 0;
    }
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if chunk_size(mid) <= max_size {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}
