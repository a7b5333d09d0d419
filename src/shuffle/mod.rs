//! External-merge-sort shuffle layer.
//!
//! Producers push key/value pairs into a [`ShuffleWriter`], which buffers
//! them sorted by key and periodically flushes one sorted file per touched
//! partition. On the reduce side, a [`MergeReader`] combines the sorted
//! files of a partition into one key-ordered stream, and [`KeyGroups`]
//! collapses it into per-key value lists.
//!
//! ```text
//! producer → ShuffleWriter (buffer, sort, partition)
//!          → partition files (MessageWriter over ExclusiveFile)
//!          → MergeReader → KeyGroups → consumer
//! ```
//!
//! # Types
//!
//! - [`ShuffleWriter`] / [`ShuffleConfig`] / [`FlushAtomicity`]: buffering and flushing
//! - [`LogGroup`] / [`PartitionOutput`]: "next file" providers and their outputs
//! - [`LogPrefix`]: on-disk partition directory with staged, renamed files
//! - [`MessageWriter`] / [`MessageReader`]: length-prefixed framing
//! - [`MessageSource`] / [`IterSource`]: pull-based message streams
//! - [`MergeReader`]: k-way merge or concatenation of sources
//! - [`KeyGroups`]: reduce-side grouping of equal keys
//! - [`MessageCodec`]: `JsonCodec`, and `BincodeCodec` with the `bincode` feature
//! - [`ShuffleError`]: error type for the layer
//!
//! # Example
//!
//! ```
//! use chunklog_rs::shuffle::{JsonCodec, KeyGroups, ShuffleConfig, ShuffleWriter};
//!
//! let dir = tempfile::tempdir()?;
//! let mut writer = ShuffleWriter::open(dir.path(), 2, JsonCodec::new(), ShuffleConfig::default())?;
//! writer.send(b"apple", b"1")?;
//! writer.send(b"banana", b"2")?;
//! writer.send(b"apple", b"3")?;
//!
//! for partition in writer.close()? {
//!     for group in KeyGroups::new(partition.open_merged(JsonCodec::new())?) {
//!         let group = group?;
//!         if group.key == b"apple" {
//!             assert_eq!(group.values, vec![b"1".to_vec(), b"3".to_vec()]);
//!         }
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod codec;
pub mod error;
pub mod framing;
pub mod group;
pub mod merge;
pub mod partition;
pub mod reduce;
pub mod writer;

#[cfg(feature = "bincode")]
pub use codec::BincodeCodec;
pub use codec::{DefaultCodec, JsonCodec, KeyValue, MessageCodec};
pub use error::ShuffleError;
pub use framing::{DEFAULT_MAX_MESSAGE_SIZE, IterSource, MessageReader, MessageSource, MessageWriter};
pub use group::{LogGroup, LogPrefix, PartitionOutput, StagedLog};
pub use merge::{LessFn, MergeReader};
pub use partition::{PartitionFn, default_partition, partition_of};
pub use reduce::{KeyGroup, KeyGroups};
pub use writer::{
    DEFAULT_BUFFER_LIMIT, FlushAtomicity, ShuffleConfig, ShuffleWriter, partition_dir,
};
