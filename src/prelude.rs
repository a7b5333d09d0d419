/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Prelude module that re-exports commonly used types and traits.
//!
//! Instead of importing each type individually, you can use:
//!
//! ```rust
//! use chunklog_rs::prelude::*;
//! ```
//!
//! This imports everything needed to write and read record logs and to run
//! a shuffle end to end.

// Record codec and logs
pub use crate::record::{
    BlockFile, ChunkKind, ExclusiveFile, LockFile, Log, LogOptions, LogReader, LogWriter, Record,
    RecordError, SyncFile, WriteHandle, verify_integrity,
};

// Message framing and codecs
#[cfg(feature = "bincode")]
pub use crate::shuffle::BincodeCodec;
pub use crate::shuffle::{
    DefaultCodec, IterSource, JsonCodec, KeyValue, MessageCodec, MessageReader, MessageSource,
    MessageWriter,
};

// Shuffle write and read paths
pub use crate::shuffle::{
    FlushAtomicity, KeyGroup, KeyGroups, LogGroup, LogPrefix, MergeReader, PartitionOutput,
    ShuffleConfig, ShuffleError, ShuffleWriter,
};
