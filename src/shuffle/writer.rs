//! Partitioned shuffle writer.
//!
//! [`ShuffleWriter`] buffers key/value pairs in a sorted map, grouping the
//! values of each key in arrival order. When the buffered size passes the
//! configured limit, or on an explicit [`ShuffleWriter::flush`], the buffer
//! is drained in ascending key order into per-partition outputs: each
//! partition touched by the flush gets exactly one new file, written once
//! and never reopened. Every partition file is therefore sorted by key, and
//! a [`MergeReader`](super::merge::MergeReader) can combine them in linear
//! time.
//!
//! # Flush Failures
//!
//! An open or write error stops the flush: later keys are not written. What
//! happens to the outputs already opened by that flush depends on
//! [`FlushAtomicity`]. Either way the buffer is cleared; a failed flush is
//! never retried.

use super::codec::{DefaultCodec, MessageCodec};
use super::error::ShuffleError;
use super::framing::MessageWriter;
use super::group::{LogGroup, LogPrefix, PartitionOutput};
use super::partition::{PartitionFn, default_partition, partition_of};
use crate::record::{DEFAULT_BLOCK_SIZE, LogOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Default buffer limit in bytes (64 MiB).
pub const DEFAULT_BUFFER_LIMIT: usize = 64 * 1024 * 1024;

/// What a failed flush does with the partition files it already opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushAtomicity {
    /// Commit every opened file. Partitions written before the failure
    /// stay visible; downstream consumers must tolerate a partial flush.
    #[default]
    BestEffort,
    /// Abort every opened file. A failed flush leaves no new files behind.
    AllOrNothing,
}

/// Shuffle writer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShuffleConfig {
    /// Buffered bytes (distinct key lengths plus value lengths) above which
    /// `send` flushes automatically.
    pub buffer_limit: usize,
    /// Block size of partition files.
    pub block_size: usize,
    /// Failure behavior of a flush.
    pub atomicity: FlushAtomicity,
}

impl Default for ShuffleConfig {
    fn default() -> Self {
        Self {
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            block_size: DEFAULT_BLOCK_SIZE,
            atomicity: FlushAtomicity::BestEffort,
        }
    }
}

impl ShuffleConfig {
    /// Parse and validate a JSON configuration. Missing fields take their
    /// default values.
    ///
    /// # Errors
    ///
    /// Returns [`ShuffleError::InvalidConfig`] for malformed JSON or
    /// inconsistent values.
    pub fn from_json(json: &str) -> Result<Self, ShuffleError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ShuffleError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ShuffleError::InvalidConfig`] for a zero buffer limit or an
    /// unusable block size.
    pub fn validate(&self) -> Result<(), ShuffleError> {
        if self.buffer_limit == 0 {
            return Err(ShuffleError::InvalidConfig {
                message: "buffer limit must be positive".to_string(),
            });
        }
        LogOptions::new(self.block_size)
            .validate()
            .map_err(|e| ShuffleError::InvalidConfig {
                message: e.to_string(),
            })
    }
}

/// Borrowed form of [`KeyValue`](super::codec::KeyValue); encodes
/// identically.
#[derive(Serialize)]
struct KeyValueRef<'a> {
    key: &'a [u8],
    value: &'a [u8],
}

type Buffer = BTreeMap<Vec<u8>, Vec<Vec<u8>>>;

/// Buffers, sorts and partitions key/value pairs into per-partition files.
///
/// The writer does no internal locking; share it across threads only
/// behind external synchronization.
pub struct ShuffleWriter<G: LogGroup, C: MessageCodec = DefaultCodec> {
    groups: Vec<G>,
    codec: C,
    partition_fn: PartitionFn,
    buffer: Buffer,
    buffered_bytes: usize,
    buffered_values: usize,
    config: ShuffleConfig,
}

impl<G: LogGroup, C: MessageCodec> std::fmt::Debug for ShuffleWriter<G, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShuffleWriter")
            .field("partitions", &self.groups.len())
            .field("codec", &self.codec)
            .field("buffered_keys", &self.buffer.len())
            .field("buffered_bytes", &self.buffered_bytes)
            .field("config", &self.config)
            .finish()
    }
}

/// Directory of partition `index` under a shuffle root.
#[must_use]
pub fn partition_dir(root: &Path, index: usize) -> PathBuf {
    root.join(format!("partition-{index:05}"))
}

impl<C: MessageCodec> ShuffleWriter<LogPrefix, C> {
    /// Write `partitions` partitions under `root`, one [`LogPrefix`]
    /// directory each (see [`partition_dir`]).
    ///
    /// # Errors
    ///
    /// Returns [`ShuffleError::NoPartitions`], a configuration error, or
    /// the error from creating a directory.
    pub fn open(
        root: impl AsRef<Path>,
        partitions: usize,
        codec: C,
        config: ShuffleConfig,
    ) -> Result<Self, ShuffleError> {
        config.validate()?;
        let root = root.as_ref();
        let groups = (0..partitions)
            .map(|i| LogPrefix::new(partition_dir(root, i), config.block_size))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(groups, codec, config)
    }
}

impl<G: LogGroup, C: MessageCodec> ShuffleWriter<G, C> {
    /// Shuffle into `groups`, one per partition.
    ///
    /// # Errors
    ///
    /// Returns [`ShuffleError::NoPartitions`] if `groups` is empty, or a
    /// configuration error.
    pub fn new(groups: Vec<G>, codec: C, config: ShuffleConfig) -> Result<Self, ShuffleError> {
        if groups.is_empty() {
            return Err(ShuffleError::NoPartitions);
        }
        config.validate()?;
        Ok(Self {
            groups,
            codec,
            partition_fn: Box::new(default_partition),
            buffer: BTreeMap::new(),
            buffered_bytes: 0,
            buffered_values: 0,
            config,
        })
    }

    /// Replace the default CRC-based partition function.
    #[must_use]
    pub fn with_partition_fn<F>(mut self, partition_fn: F) -> Self
    where
        F: Fn(&[u8]) -> u64 + Send + Sync + 'static,
    {
        self.partition_fn = Box::new(partition_fn);
        self
    }

    /// Number of partitions.
    #[must_use]
    pub fn partitions(&self) -> usize {
        self.groups.len()
    }

    /// Partition index `key` is written to.
    #[must_use]
    pub fn partition_for(&self, key: &[u8]) -> usize {
        partition_of(&*self.partition_fn, key, self.groups.len())
    }

    /// Approximate buffered size: each distinct key once plus every value.
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    /// Distinct keys currently buffered.
    #[must_use]
    pub fn buffered_keys(&self) -> usize {
        self.buffer.len()
    }

    /// The per-partition groups.
    #[must_use]
    pub fn groups(&self) -> &[G] {
        &self.groups
    }

    /// Buffer one pair, flushing if the buffer passes its limit.
    ///
    /// # Errors
    ///
    /// Returns the error of an automatic flush.
    pub fn send(&mut self, key: &[u8], value: &[u8]) -> Result<(), ShuffleError> {
        match self.buffer.get_mut(key) {
            Some(values) => values.push(value.to_vec()),
            None => {
                self.buffered_bytes += key.len();
                self.buffer.insert(key.to_vec(), vec![value.to_vec()]);
            }
        }
        self.buffered_bytes += value.len();
        self.buffered_values += 1;

        #[cfg(feature = "metrics")]
        metrics::counter!("chunklog_shuffle_messages_total").increment(1);

        if self.buffered_bytes > self.config.buffer_limit {
            trace!(
                buffered_bytes = self.buffered_bytes,
                limit = self.config.buffer_limit,
                "shuffle buffer over limit"
            );
            self.flush()?;
        }
        Ok(())
    }

    /// Write the buffer out, one new file per touched partition.
    ///
    /// # Errors
    ///
    /// Returns the first open or write error; otherwise the last commit or
    /// abort error. The buffer is cleared in every case.
    pub fn flush(&mut self) -> Result<(), ShuffleError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let buffer = std::mem::take(&mut self.buffer);
        let bytes = std::mem::take(&mut self.buffered_bytes);
        let values = std::mem::take(&mut self.buffered_values);

        let mut outputs: Vec<Option<MessageWriter<G::Output, C>>> =
            self.groups.iter().map(|_| None).collect();
        let written = write_partitions(
            &buffer,
            &mut self.groups,
            &mut outputs,
            &*self.partition_fn,
            &self.codec,
        );

        let abort = written.is_err() && self.config.atomicity == FlushAtomicity::AllOrNothing;
        let mut finished = Ok(());
        let mut touched = 0usize;
        for (partition, output) in outputs.into_iter().enumerate() {
            let Some(writer) = output else {
                continue;
            };
            touched += 1;
            let output = writer.into_inner();
            let result = if abort { output.abort() } else { output.commit() };
            if let Err(e) = result {
                warn!(partition, error = %e, aborted = abort, "failed to finish partition file");
                finished = Err(e);
            }
        }

        #[cfg(feature = "metrics")]
        {
            metrics::counter!("chunklog_shuffle_flushes_total").increment(1);
            if written.is_err() || finished.is_err() {
                metrics::counter!("chunklog_shuffle_flush_errors_total").increment(1);
            }
        }

        match &written {
            Ok(()) => debug!(
                keys = buffer.len(),
                values,
                bytes,
                partitions = touched,
                "shuffle flush complete"
            ),
            Err(e) => warn!(
                keys = buffer.len(),
                partitions = touched,
                aborted = abort,
                error = %e,
                "shuffle flush failed"
            ),
        }

        written.and(finished)
    }

    /// Flush whatever is buffered and return the partition groups.
    ///
    /// # Errors
    ///
    /// Returns the final flush's error.
    pub fn close(mut self) -> Result<Vec<G>, ShuffleError> {
        self.flush()?;
        Ok(std::mem::take(&mut self.groups))
    }
}

impl<G: LogGroup, C: MessageCodec> Drop for ShuffleWriter<G, C> {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            warn!(
                keys = self.buffer.len(),
                bytes = self.buffered_bytes,
                "shuffle writer dropped with unflushed records"
            );
        }
    }
}

/// Write the buffer in key order, opening each partition's output lazily.
fn write_partitions<G: LogGroup, C: MessageCodec>(
    buffer: &Buffer,
    groups: &mut [G],
    outputs: &mut [Option<MessageWriter<G::Output, C>>],
    partition_fn: &(dyn Fn(&[u8]) -> u64 + Send + Sync),
    codec: &C,
) -> Result<(), ShuffleError> {
    for (key, values) in buffer {
        let partition = partition_of(partition_fn, key, groups.len());
        let slot = &mut outputs[partition];
        let writer = match slot {
            Some(writer) => writer,
            None => {
                let output = groups[partition].next_output()?;
                slot.insert(MessageWriter::new(output, codec.clone()))
            }
        };
        for value in values {
            writer.send(&KeyValueRef { key, value })?;
        }
    }
    Ok(())
}
