//! Reading records back from a block-aligned log.
//!
//! [`LogReader`] walks a log block by block. Inside a block it decodes
//! chunks back to back. An all-zero tail of a complete block is padding,
//! and the reader skips to the next block boundary. Any other tail that
//! cannot hold a chunk, including zeros in the final partial block, is a
//! torn write and is reported as [`RecordError::Truncated`].
//!
//! Several writers may share one synchronized log, so the chunks of
//! different logical records can interleave. The reader keeps the chunks of
//! every unfinished record and yields the record once its `Last` chunk
//! arrives, so records come out in order of completion.

use super::chunk::{ChunkKind, MIN_CHUNK_SIZE, Record};
use super::error::RecordError;
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

/// Bytes backing a reader.
enum Source {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl AsRef<[u8]> for Source {
    fn as_ref(&self) -> &[u8] {
        match self {
            Source::Mapped(map) => &map[..],
            Source::Owned(bytes) => bytes.as_slice(),
        }
    }
}

/// Sequential reader over the records of a block-aligned log.
pub struct LogReader {
    source: Source,
    block_size: usize,
    pos: usize,
    pending: HashMap<Uuid, Vec<Record>>,
    finished: bool,
}

impl std::fmt::Debug for LogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader")
            .field("len", &self.source.as_ref().len())
            .field("block_size", &self.block_size)
            .field("pos", &self.pos)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl LogReader {
    /// Memory-map the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidOptions`] for a block size smaller than
    /// one chunk and [`RecordError::Io`] if the file cannot be opened or
    /// mapped.
    pub fn open(path: impl AsRef<Path>, block_size: usize) -> Result<Self, RecordError> {
        check_block_size(block_size)?;
        let file = File::open(path.as_ref())?;
        if file.metadata()?.len() == 0 {
            return Ok(Self::with_source(Source::Owned(Vec::new()), block_size));
        }

        // SAFETY: the log is append-only. Writers never truncate or rewrite
        // bytes that are already in the file while it is mapped.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self::with_source(Source::Mapped(map), block_size))
    }

    /// Read a log held in memory.
    ///
    /// A zero `block_size` is treated as one block spanning the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidOptions`] for a non-zero block size
    /// smaller than one chunk.
    pub fn from_bytes(bytes: Vec<u8>, block_size: usize) -> Result<Self, RecordError> {
        let block_size = if block_size == 0 {
            bytes.len().max(MIN_CHUNK_SIZE)
        } else {
            check_block_size(block_size)?;
            block_size
        };
        Ok(Self::with_source(Source::Owned(bytes), block_size))
    }

    fn with_source(source: Source, block_size: usize) -> Self {
        Self {
            source,
            block_size,
            pos: 0,
            pending: HashMap::new(),
            finished: false,
        }
    }

    /// Byte offset of the next chunk to decode.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Decode the next chunk, skipping padding.
    ///
    /// Returns `Ok(None)` at the end of the log.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if the chunk at the current position does
    /// not decode, and [`RecordError::Truncated`] for a block tail that is
    /// neither padding nor a whole chunk. The reader does not resynchronize
    /// after an error.
    pub fn read_chunk(&mut self) -> Result<Option<Record>, RecordError> {
        let data = self.source.as_ref();
        let block = self.block_size;
        loop {
            if self.pos >= data.len() {
                return Ok(None);
            }
            let next_boundary = (self.pos / block + 1) * block;
            let block_end = next_boundary.min(data.len());
            let window = &data[self.pos..block_end];

            if window.iter().all(|b| *b == 0) {
                // Padding only ever fills a block up to its boundary.
                if block_end == next_boundary {
                    self.pos = next_boundary;
                    continue;
                }
                return Err(RecordError::Truncated {
                    needed: next_boundary - self.pos,
                    available: window.len(),
                });
            }
            if window.len() < MIN_CHUNK_SIZE {
                return Err(RecordError::Truncated {
                    needed: MIN_CHUNK_SIZE,
                    available: window.len(),
                });
            }

            let (record, used) = Record::decode_prefix(window)?;
            self.pos += used;
            return Ok(Some(record));
        }
    }

    /// Read the next complete logical record.
    ///
    /// Split records are merged back into one `Full` record. Returns
    /// `Ok(None)` at the end of the log; records whose `Last` chunk never
    /// arrived are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns any chunk decode error, [`RecordError::NoFirstChunk`] for a
    /// continuation chunk with no open record, or a merge error.
    pub fn read_record(&mut self) -> Result<Option<Record>, RecordError> {
        while let Some(chunk) = self.read_chunk()? {
            match chunk.kind() {
                ChunkKind::Full => return Ok(Some(chunk)),
                ChunkKind::First => {
                    let id = chunk.record_id();
                    if self.pending.insert(id, vec![chunk]).is_some() {
                        warn!(record = %id, "restarted record replaces earlier partial copy");
                    }
                }
                ChunkKind::Middle => {
                    let id = chunk.record_id();
                    self.pending
                        .get_mut(&id)
                        .ok_or(RecordError::NoFirstChunk)?
                        .push(chunk);
                }
                ChunkKind::Last => {
                    let id = chunk.record_id();
                    let mut parts = self
                        .pending
                        .remove(&id)
                        .ok_or(RecordError::NoFirstChunk)?;
                    parts.push(chunk);
                    return Record::merge(&parts).map(Some);
                }
            }
        }

        if !self.pending.is_empty() {
            warn!(
                incomplete = self.pending.len(),
                "log ended with records missing their last chunk"
            );
            self.pending.clear();
        }
        Ok(None)
    }
}

impl Iterator for LogReader {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = self.read_record().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }
}

fn check_block_size(block_size: usize) -> Result<(), RecordError> {
    if block_size < MIN_CHUNK_SIZE {
        return Err(RecordError::InvalidOptions {
            message: format!("block size {block_size} cannot hold a {MIN_CHUNK_SIZE} byte chunk"),
        });
    }
    Ok(())
}

/// Decode every chunk of the log at `path` and return the chunk count.
///
/// # Errors
///
/// Returns the first decode or I/O error.
pub fn verify_integrity(path: impl AsRef<Path>, block_size: usize) -> Result<usize, RecordError> {
    let path = path.as_ref();
    let mut reader = LogReader::open(path, block_size)?;
    let mut chunks = 0usize;
    while reader.read_chunk()?.is_some() {
        chunks += 1;
    }
    debug!(path = %path.display(), chunks, "verified log");
    Ok(chunks)
}
