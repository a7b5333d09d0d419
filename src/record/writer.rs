//! Multiplexing many buffered writers onto one block-aligned log.
//!
//! A [`LogWriter`] hands out [`WriteHandle`]s. Each handle accumulates bytes
//! in a private buffer; closing the handle parks the buffer in the writer's
//! registry, and [`LogWriter::flush`] appends every parked buffer to the log
//! as one logical record, split into chunks at the log's record limit.
//!
//! The registry is a lock-free ordered map keyed by a stable handle id, so
//! handles only touch the shared state when they are created and closed.
//! The log itself sits behind a mutex held for the duration of an append.

use super::chunk::Record;
use super::error::RecordError;
use super::file::Log;
use crossbeam_skiplist::SkipMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

/// Stable identifier of a write handle within one [`LogWriter`].
pub type HandleId = u64;

/// Registry state of one handle.
#[derive(Debug)]
enum Slot {
    /// The handle is still being written to.
    Open,
    /// The handle was closed; its buffer waits for the next flush.
    Closed(Vec<u8>),
}

/// Appends logical records of arbitrary size to a block-aligned [`Log`].
///
/// `LogWriter` is `Sync` when the log is `Send`, so it can be shared behind
/// an `Arc` by several producers, each holding its own [`WriteHandle`].
#[derive(Debug)]
pub struct LogWriter<L: Log> {
    log: Mutex<L>,
    registry: Arc<SkipMap<HandleId, Slot>>,
    next_id: AtomicU64,
}

impl<L: Log> LogWriter<L> {
    /// Create a writer over `log`.
    pub fn new(log: L) -> Self {
        Self {
            log: Mutex::new(log),
            registry: Arc::new(SkipMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register and return a new buffered write handle.
    pub fn next_writer(&self) -> WriteHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.insert(id, Slot::Open);
        trace!(handle = id, "registered write handle");
        WriteHandle {
            id,
            buf: Vec::new(),
            registry: Some(Arc::clone(&self.registry)),
        }
    }

    /// Number of handles that are open or closed but not yet flushed.
    pub fn pending(&self) -> usize {
        self.registry.len()
    }

    /// Append every closed, unflushed handle to the log in handle order.
    ///
    /// Open handles are kept for a later flush. A handle is removed from the
    /// registry as soon as its record is appended, so a flush that fails
    /// part way never appends an earlier handle twice.
    ///
    /// Returns the number of handles flushed.
    ///
    /// # Errors
    ///
    /// The first append error aborts the flush and is returned; the failing
    /// handle stays in the registry.
    pub fn flush(&self) -> Result<usize, RecordError> {
        let mut log = self.log.lock().map_err(|_| RecordError::MutexPoisoned)?;

        let mut flushed = 0usize;
        for entry in self.registry.iter() {
            let Slot::Closed(buf) = entry.value() else {
                continue;
            };
            let end = append_record(&mut *log, buf)?;
            trace!(handle = *entry.key(), bytes = buf.len(), end, "flushed write handle");
            entry.remove();
            flushed += 1;
        }

        if flushed > 0 {
            debug!(flushed, remaining = self.registry.len(), "log writer flush complete");
        }
        Ok(flushed)
    }

    /// Encode, chunk and append `buf` immediately, bypassing the handles.
    ///
    /// Returns the offset just past the last chunk written.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::ChunkTooSmall`] if the record limit cannot
    /// hold a chunk, or any append error.
    pub fn write_record(&self, buf: &[u8]) -> Result<u64, RecordError> {
        let mut log = self.log.lock().map_err(|_| RecordError::MutexPoisoned)?;
        append_record(&mut *log, buf)
    }

    /// Current size of the underlying log.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MutexPoisoned`] or the log's size error.
    pub fn size(&self) -> Result<u64, RecordError> {
        let log = self.log.lock().map_err(|_| RecordError::MutexPoisoned)?;
        log.size()
    }

    /// Take the log back. Unflushed handles are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MutexPoisoned`] if a writer thread panicked.
    pub fn into_inner(self) -> Result<L, RecordError> {
        let discarded = self
            .registry
            .iter()
            .filter(|e| matches!(e.value(), Slot::Closed(_)))
            .count();
        if discarded > 0 {
            warn!(discarded, "log writer dropped closed handles that were never flushed");
        }
        self.log.into_inner().map_err(|_| RecordError::MutexPoisoned)
    }

    /// Flush pending handles, then close the log.
    ///
    /// # Errors
    ///
    /// Returns the flush error or the log's close error.
    pub fn close(self) -> Result<(), RecordError> {
        self.flush()?;
        self.into_inner()?.close()
    }
}

/// Split `buf` into chunks at the log's record limit and append them.
fn append_record<L: Log + ?Sized>(log: &mut L, buf: &[u8]) -> Result<u64, RecordError> {
    let record = Record::new(buf.to_vec());
    let chunks = record.split(log.record_limit())?;
    let mut end = 0u64;
    let mut scratch = Vec::with_capacity(log.record_limit());
    for chunk in &chunks {
        scratch.clear();
        chunk.encode_to(&mut scratch);
        end = log.record_append(&scratch)?;
    }
    Ok(end)
}

/// A buffered writer registered with a [`LogWriter`].
///
/// Bytes written to the handle stay in memory. [`WriteHandle::close`] hands
/// the buffer to the writer for the next flush; dropping the handle without
/// closing it discards the buffer.
#[derive(Debug)]
pub struct WriteHandle {
    id: HandleId,
    buf: Vec<u8>,
    registry: Option<Arc<SkipMap<HandleId, Slot>>>,
}

impl WriteHandle {
    /// The handle's id; flushes append handles in id order.
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Bytes buffered so far.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Mark the handle finished so the next flush appends its buffer.
    pub fn close(mut self) {
        if let Some(registry) = self.registry.take() {
            let buf = std::mem::take(&mut self.buf);
            trace!(handle = self.id, bytes = buf.len(), "closed write handle");
            registry.insert(self.id, Slot::Closed(buf));
        }
    }
}

impl Write for WriteHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.remove(&self.id);
            warn!(
                handle = self.id,
                bytes = self.buf.len(),
                "write handle dropped without close; buffer discarded"
            );
        }
    }
}
