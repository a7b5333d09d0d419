//! Block-aligned append-only log files.
//!
//! A block-aligned log guarantees that every appended record lies entirely
//! within one fixed-size block. When the current block has less room left
//! than the record needs, the remainder of the block is filled with zero
//! bytes and the record starts at the next block boundary.
//!
//! Two variants are provided:
//!
//! - [`SyncFile`] takes an exclusive advisory lock around every append and
//!   syncs the file before releasing it, so independent processes can share
//!   one file as long as they all lock.
//! - [`ExclusiveFile`] assumes a single writing process. It skips the lock
//!   and the per-append sync but still pads before crossing a block.
//!
//! The default record limit is a quarter of the block size, which bounds the
//! space lost to padding at the end of a block.

use super::chunk::MIN_CHUNK_SIZE;
use super::error::RecordError;
use super::lock::{ExclusiveLock, LockFile};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, trace};

/// Default block size in bytes (32 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 32 * 1024;

/// Sizing options for a block-aligned log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    /// Size of one block in bytes.
    pub block_size: usize,
    /// Largest buffer accepted by a single append. `None` means a quarter
    /// of the block size.
    pub record_limit: Option<usize>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            record_limit: None,
        }
    }
}

impl LogOptions {
    /// Options with the given block size and the default record limit.
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            record_limit: None,
        }
    }

    /// Override the record limit.
    #[must_use]
    pub fn with_record_limit(mut self, record_limit: usize) -> Self {
        self.record_limit = Some(record_limit);
        self
    }

    /// The record limit in effect.
    #[must_use]
    pub fn effective_record_limit(&self) -> usize {
        self.record_limit.unwrap_or(self.block_size >> 2)
    }

    /// Check that the options describe a usable log.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidOptions`] if the block size cannot hold
    /// the smallest chunk, the record limit is zero, or the record limit
    /// exceeds the block size.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.block_size < MIN_CHUNK_SIZE {
            return Err(RecordError::InvalidOptions {
                message: format!(
                    "block size {} cannot hold a {MIN_CHUNK_SIZE} byte chunk",
                    self.block_size
                ),
            });
        }
        let limit = self.effective_record_limit();
        if limit == 0 {
            return Err(RecordError::InvalidOptions {
                message: format!(
                    "record limit must be positive (block size {})",
                    self.block_size
                ),
            });
        }
        if limit > self.block_size {
            return Err(RecordError::InvalidOptions {
                message: format!(
                    "record limit {limit} exceeds block size {}",
                    self.block_size
                ),
            });
        }
        Ok(())
    }
}

/// Storage underneath a block-aligned log.
///
/// Appends always go to the current end of the storage, so implementations
/// only need to report their length and make written data durable.
pub trait BlockFile: Write + Seek {
    /// Current length of the storage in bytes.
    fn len(&self) -> io::Result<u64>;

    /// Returns `true` if nothing has been written yet.
    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Flush written data to stable storage.
    fn sync(&mut self) -> io::Result<()>;
}

impl BlockFile for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

impl BlockFile for Cursor<Vec<u8>> {
    fn len(&self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// An append-only log that keeps every record inside one block.
pub trait Log {
    /// Append `buf` so that it lies entirely within one block, padding the
    /// current block first if needed. Returns the offset just past the
    /// written bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::RecordTooBig`] before any I/O if `buf` is
    /// longer than [`Log::record_limit`]; I/O failures are returned as
    /// [`RecordError::Io`].
    fn record_append(&mut self, buf: &[u8]) -> Result<u64, RecordError>;

    /// Largest buffer accepted by [`Log::record_append`].
    fn record_limit(&self) -> usize;

    /// Block size of the log.
    fn block_size(&self) -> usize;

    /// Current size of the log in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Io`] if the size cannot be read.
    fn size(&self) -> Result<u64, RecordError>;

    /// Flush buffered data and release the log.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Io`] if the final flush fails.
    fn close(self) -> Result<(), RecordError>
    where
        Self: Sized;
}

/// Number of zero bytes to write before a record of `record_len` bytes when
/// the log is currently `size` bytes long.
///
/// `block_size` must be non-zero; [`LogOptions::validate`] guarantees it for
/// every log in this crate.
#[inline]
#[must_use]
pub(crate) fn padding_for(size: u64, block_size: usize, record_len: usize) -> usize {
    let block = block_size as u64;
    let remaining = (block - size % block) as usize;
    if remaining < record_len { remaining } else { 0 }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
}

fn check_limit(buf: &[u8], limit: usize) -> Result<(), RecordError> {
    if buf.len() > limit {
        return Err(RecordError::RecordTooBig {
            size: buf.len(),
            limit,
        });
    }
    Ok(())
}

#[cfg(feature = "metrics")]
fn record_metrics(padding: usize) {
    metrics::counter!("chunklog_records_appended_total").increment(1);
    if padding > 0 {
        metrics::counter!("chunklog_padding_bytes_total").increment(padding as u64);
    }
}

#[cfg(not(feature = "metrics"))]
fn record_metrics(_padding: usize) {}

// ─── Synchronized ───────────────────────────────────────────────────────────

/// A block-aligned log safe for concurrent writers in separate processes.
///
/// Each append is one critical section under an exclusive advisory lock:
/// read the size, pad, write, sync, unlock.
#[derive(Debug)]
pub struct SyncFile<F: BlockFile + LockFile> {
    file: F,
    block_size: usize,
    record_limit: usize,
}

impl SyncFile<File> {
    /// Open (creating if needed) the log at `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidOptions`] for bad options and
    /// [`RecordError::Io`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>, options: LogOptions) -> Result<Self, RecordError> {
        options.validate()?;
        let file = open_append(path.as_ref())?;
        Self::new(file, options)
    }
}

impl<F: BlockFile + LockFile> SyncFile<F> {
    /// Wrap `file` as a synchronized block-aligned log.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidOptions`] for bad options.
    pub fn new(file: F, options: LogOptions) -> Result<Self, RecordError> {
        options.validate()?;
        Ok(Self {
            file,
            block_size: options.block_size,
            record_limit: options.effective_record_limit(),
        })
    }

    /// Borrow the underlying storage.
    pub fn get_ref(&self) -> &F {
        &self.file
    }

    /// Unwrap the underlying storage.
    pub fn into_inner(self) -> F {
        self.file
    }

    fn append_locked(file: &mut F, block_size: usize, buf: &[u8]) -> io::Result<(u64, usize)> {
        let size = file.len()?;
        let padding = padding_for(size, block_size, buf.len());
        let mut payload = Vec::with_capacity(padding + buf.len());
        payload.resize(padding, 0);
        payload.extend_from_slice(buf);

        file.seek(SeekFrom::End(0))?;
        file.write_all(&payload)?;
        file.sync()?;
        Ok((size + payload.len() as u64, padding))
    }
}

impl<F: BlockFile + LockFile> Log for SyncFile<F> {
    fn record_append(&mut self, buf: &[u8]) -> Result<u64, RecordError> {
        check_limit(buf, self.record_limit)?;

        let mut guard = ExclusiveLock::acquire(&mut self.file)?;
        let (end, padding) = Self::append_locked(&mut guard, self.block_size, buf)?;
        guard.release()?;

        if padding > 0 {
            trace!(padding, end, "padded block before record");
        }
        record_metrics(padding);
        Ok(end)
    }

    fn record_limit(&self) -> usize {
        self.record_limit
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn size(&self) -> Result<u64, RecordError> {
        Ok(self.file.len()?)
    }

    fn close(mut self) -> Result<(), RecordError> {
        self.file.flush()?;
        debug!("closed synchronized log");
        Ok(())
    }
}

/// Plain writes still take the lock, but are neither padded nor synced.
impl<F: BlockFile + LockFile> Write for SyncFile<F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = ExclusiveLock::acquire(&mut self.file)?;
        guard.seek(SeekFrom::End(0))?;
        let n = guard.write(buf)?;
        guard.release()?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

// ─── Exclusive ──────────────────────────────────────────────────────────────

/// A block-aligned log for a single writing process.
///
/// Appends re-read the size until no padding is needed, so the record is
/// written at a position that keeps it inside one block. Nothing is synced
/// until [`ExclusiveFile::sync`] or [`Log::close`].
#[derive(Debug)]
pub struct ExclusiveFile<F: BlockFile> {
    file: F,
    block_size: usize,
    record_limit: usize,
}

impl ExclusiveFile<File> {
    /// Open (creating if needed) the log at `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidOptions`] for bad options and
    /// [`RecordError::Io`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>, options: LogOptions) -> Result<Self, RecordError> {
        options.validate()?;
        let file = open_append(path.as_ref())?;
        Self::new(file, options)
    }
}

impl<F: BlockFile> ExclusiveFile<F> {
    /// Wrap `file` as an exclusive block-aligned log.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidOptions`] for bad options.
    pub fn new(file: F, options: LogOptions) -> Result<Self, RecordError> {
        options.validate()?;
        Ok(Self {
            file,
            block_size: options.block_size,
            record_limit: options.effective_record_limit(),
        })
    }

    /// Borrow the underlying storage.
    pub fn get_ref(&self) -> &F {
        &self.file
    }

    /// Unwrap the underlying storage.
    pub fn into_inner(self) -> F {
        self.file
    }

    /// Flush and sync everything written so far.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync()
    }

    fn append(&mut self, buf: &[u8]) -> Result<u64, RecordError> {
        check_limit(buf, self.record_limit)?;

        let mut padded = 0usize;
        let size = loop {
            let size = self.file.len()?;
            let padding = padding_for(size, self.block_size, buf.len());
            if padding == 0 {
                break size;
            }
            self.file.seek(SeekFrom::End(0))?;
            self.file.write_all(&vec![0u8; padding])?;
            self.file.flush()?;
            padded += padding;
        };

        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(buf)?;

        if padded > 0 {
            trace!(padding = padded, offset = size, "padded block before record");
        }
        record_metrics(padded);
        Ok(size + buf.len() as u64)
    }
}

impl<F: BlockFile> Log for ExclusiveFile<F> {
    fn record_append(&mut self, buf: &[u8]) -> Result<u64, RecordError> {
        self.append(buf)
    }

    fn record_limit(&self) -> usize {
        self.record_limit
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn size(&self) -> Result<u64, RecordError> {
        Ok(self.file.len()?)
    }

    fn close(mut self) -> Result<(), RecordError> {
        self.sync()?;
        debug!("closed exclusive log");
        Ok(())
    }
}

/// Every write is a record append: it is padded so that it never crosses a
/// block boundary. A buffer over the record limit fails with an
/// [`io::ErrorKind::InvalidInput`] error wrapping
/// [`RecordError::RecordTooBig`].
impl<F: BlockFile> Write for ExclusiveFile<F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf).map_err(RecordError::into_io)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
