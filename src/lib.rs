//! # Chunked Block-Aligned Record Log and Shuffle Layer
//!
//! A durable append log with checksummed, multi-chunk records, and the
//! external-merge-sort shuffle layer built on top of it. The shuffle layer
//! persists the key/value pairs exchanged between the map and reduce phases
//! of a batch pipeline and replays them in key order.
//!
//! ## Key Features
//!
//! - **Checksummed Chunks**: every record carries a time-ordered UUIDv7 id,
//!   a chunk position, a kind and a CRC32 checksum. Payloads larger than the
//!   log's record limit are split into `First`/`Middle`/`Last` chunks and
//!   merged back on read.
//!
//! - **Block Alignment**: a log never lets a chunk straddle a block
//!   boundary. When the current block is too full, its tail is padded with
//!   zeros and the chunk starts the next block, so every block can be read
//!   on its own.
//!
//! - **Cross-Process Appends**: [`record::SyncFile`] wraps every append in
//!   an exclusive advisory lock and syncs it before unlocking, so several
//!   processes can share one log file. [`record::ExclusiveFile`] drops the
//!   lock and the per-append sync for the single-writer case.
//!
//! - **Multiplexed Writers**: [`record::LogWriter`] hands out any number of
//!   buffered write handles and appends each closed handle as one logical
//!   record.
//!
//! - **Sorted Partitioned Shuffle**: [`shuffle::ShuffleWriter`] buffers
//!   pairs in a sorted map and flushes one key-ordered file per touched
//!   partition. Files are staged and published by rename, and a failed
//!   flush either keeps or discards what it wrote, per
//!   [`shuffle::FlushAtomicity`].
//!
//! - **Linear-Time Merge**: [`shuffle::MergeReader`] merges any number of
//!   sorted message sources, or concatenates unsorted ones.
//!
//! ## Record Layout
//!
//! ```text
//! [16 bytes: record_id][4 bytes: chunk_id BE][1 byte: kind]
//! [4 bytes: checksum BE][uvarint: payload_len][payload]
//! ```
//!
//! The checksum covers `record_id ‖ chunk_id ‖ kind ‖ payload`. The fixed
//! header is 25 bytes; the smallest chunk is 26 bytes.
//!
//! ## Message Stream Layout
//!
//! Partition files hold `[uvarint: len][len bytes]` frames. A length of `1`
//! is an empty message and a zero byte is padding up to the next block
//! boundary. Frames are encoded with a pluggable [`shuffle::MessageCodec`]:
//! `JsonCodec` always, `BincodeCodec` with the default `bincode` feature.
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Enables                                             |
//! |-----------|---------|-----------------------------------------------------|
//! | `bincode` | yes     | `BincodeCodec` and the Bincode `DefaultCodec`       |
//! | `metrics` | no      | counters for appends, padding and shuffle flushes   |
//!
//! With `metrics` enabled the crate reports through the `metrics` facade:
//! `chunklog_records_appended_total`, `chunklog_padding_bytes_total`,
//! `chunklog_shuffle_messages_total`, `chunklog_shuffle_flushes_total` and
//! `chunklog_shuffle_flush_errors_total`. Diagnostics are emitted with
//! `tracing`; install a subscriber to see them.
//!
//! ## Concurrency Model
//!
//! Nothing runs in the background. Every call does its work synchronously
//! on the caller's thread:
//!
//! - A [`record::LogWriter`] can be shared between threads; each thread
//!   owns its own [`record::WriteHandle`].
//! - A [`shuffle::ShuffleWriter`] has a single owner and does no internal
//!   locking.
//! - Lock acquisition, `fsync` and flushes block until complete.
//!
//! ## Example
//!
//! ```
//! use chunklog_rs::prelude::*;
//!
//! let dir = tempfile::tempdir()?;
//!
//! // A shared, synced log of arbitrary-size records.
//! let log = SyncFile::open(dir.path().join("wal.log"), LogOptions::new(4096))?;
//! let writer = LogWriter::new(log);
//! writer.write_record(&vec![7u8; 5000])?;
//! writer.close()?;
//! let records: Vec<Record> =
//!     LogReader::open(dir.path().join("wal.log"), 4096)?.collect::<Result<_, _>>()?;
//! assert_eq!(records[0].payload().len(), 5000);
//!
//! // A two-partition shuffle, read back in key order.
//! let mut shuffle =
//!     ShuffleWriter::open(dir.path().join("shuffle"), 2, JsonCodec::new(), ShuffleConfig::default())?;
//! shuffle.send(b"banana", b"2")?;
//! shuffle.send(b"apple", b"1")?;
//! let partitions = shuffle.close()?;
//! let sources = partitions
//!     .iter()
//!     .map(|p| p.open_merged(JsonCodec::new()))
//!     .collect::<Result<Vec<_>, _>>()?;
//! let keys: Vec<Vec<u8>> = MergeReader::merge_sorted(KeyValue::key_less, sources)
//!     .map(|kv| kv.key)
//!     .collect();
//! assert_eq!(keys, vec![b"apple".to_vec(), b"banana".to_vec()]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod record;
pub mod shuffle;

pub mod prelude;
mod utils;

pub use record::{
    ChunkKind, ExclusiveFile, Log, LogOptions, LogReader, LogWriter, Record, RecordError,
    SyncFile, WriteHandle,
};
#[cfg(feature = "bincode")]
pub use shuffle::BincodeCodec;
pub use shuffle::{
    FlushAtomicity, JsonCodec, KeyGroups, KeyValue, LogPrefix, MergeReader, MessageCodec,
    MessageReader, MessageSource, MessageWriter, ShuffleConfig, ShuffleError, ShuffleWriter,
};
