//! Chunked, block-aligned record log.
//!
//! This module provides the durable append log that the shuffle layer is
//! built on, and that is usable on its own as a write-ahead log.
//!
//! # Types
//!
//! - [`Record`]: one checksummed chunk of a logical record
//! - [`ChunkKind`]: position of a chunk within its record
//! - [`RecordError`]: error type for every record operation
//! - [`Log`]: trait for block-aligned append-only logs
//! - [`SyncFile`]: log guarded by an exclusive advisory lock, synced per append
//! - [`ExclusiveFile`]: single-writer log without locking or per-append sync
//! - [`LogOptions`]: block size and record limit
//! - [`LogWriter`] / [`WriteHandle`]: many buffered writers multiplexed onto one log
//! - [`LogReader`]: block-walking reader that reassembles split records
//!
//! # Example
//!
//! ```
//! use chunklog_rs::record::{ExclusiveFile, LogOptions, LogReader, LogWriter};
//! use std::io::{Cursor, Write};
//!
//! let log = ExclusiveFile::new(Cursor::new(Vec::new()), LogOptions::new(4096))?;
//! let writer = LogWriter::new(log);
//!
//! let mut handle = writer.next_writer();
//! handle.write_all(b"hello, log")?;
//! handle.close();
//! writer.flush()?;
//!
//! let bytes = writer.into_inner()?.into_inner().into_inner();
//! let records: Vec<_> = LogReader::from_bytes(bytes, 4096)?.collect::<Result<_, _>>()?;
//! assert_eq!(&records[0].payload()[..], b"hello, log");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod chunk;
pub mod error;
pub mod file;
pub mod lock;
pub mod reader;
pub mod writer;

pub use chunk::{
    ChunkKind, FIXED_HEADER_SIZE, MIN_CHUNK_SIZE, Record, chunk_size, header_size,
};
pub use error::RecordError;
pub use file::{BlockFile, DEFAULT_BLOCK_SIZE, ExclusiveFile, Log, LogOptions, SyncFile};
pub use lock::LockFile;
pub use reader::{LogReader, verify_integrity};
pub use writer::{HandleId, LogWriter, WriteHandle};
