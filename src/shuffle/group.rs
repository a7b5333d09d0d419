//! Partition file providers.
//!
//! A [`LogGroup`] hands out one fresh, writable destination per call. The
//! shuffle writer owns one group per partition and asks it for a new output
//! the first time a flush touches that partition.
//!
//! [`LogPrefix`] is the on-disk group: a directory whose files are named by
//! time-ordered UUIDv7 ids. A file is written under a `.partial` name and
//! renamed to `.log` when committed, so a reader listing the directory only
//! ever sees complete files.

use super::codec::{KeyValue, MessageCodec};
use super::error::ShuffleError;
use super::framing::MessageReader;
use super::merge::MergeReader;
use crate::record::{ExclusiveFile, LogOptions};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use uuid::Uuid;

/// Extension of committed partition files.
pub const COMMITTED_EXTENSION: &str = "log";

/// Extension of partition files still being written.
pub const STAGING_EXTENSION: &str = "partial";

/// A destination written by one flush.
pub trait PartitionOutput: Write {
    /// Make the output durable and visible to readers.
    ///
    /// # Errors
    ///
    /// Returns the sync or publish error.
    fn commit(self) -> Result<(), ShuffleError>;

    /// Discard everything written to the output.
    ///
    /// # Errors
    ///
    /// Returns the cleanup error.
    fn abort(self) -> Result<(), ShuffleError>;
}

/// Source of fresh outputs for one partition.
pub trait LogGroup {
    /// The output type handed out.
    type Output: PartitionOutput;

    /// Open a new, empty output.
    ///
    /// # Errors
    ///
    /// Returns the error from creating the output.
    fn next_output(&mut self) -> Result<Self::Output, ShuffleError>;
}

/// One directory of block-aligned partition files.
#[derive(Debug, Clone)]
pub struct LogPrefix {
    root: PathBuf,
    options: LogOptions,
}

impl LogPrefix {
    /// Use `root` (created if missing) with the given block size.
    ///
    /// # Errors
    ///
    /// Returns [`ShuffleError::Record`] for an unusable block size and
    /// [`ShuffleError::Io`] if the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>, block_size: usize) -> Result<Self, ShuffleError> {
        Self::with_options(root, LogOptions::new(block_size))
    }

    /// Use `root` (created if missing) with explicit log options.
    ///
    /// # Errors
    ///
    /// See [`LogPrefix::new`].
    pub fn with_options(root: impl Into<PathBuf>, options: LogOptions) -> Result<Self, ShuffleError> {
        options.validate()?;
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, options })
    }

    /// The directory holding this partition's files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Block size of the files written here.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.options.block_size
    }

    /// Committed files, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the error from listing the directory.
    pub fn files(&self) -> Result<Vec<PathBuf>, ShuffleError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == COMMITTED_EXTENSION) {
                files.push(path);
            }
        }
        // UUIDv7 names sort by creation time.
        files.sort();
        Ok(files)
    }

    /// A key-ordered reader over every committed file of this partition.
    ///
    /// # Errors
    ///
    /// Returns the error from listing or opening the files.
    #[allow(clippy::type_complexity)]
    pub fn open_merged<C: MessageCodec>(
        &self,
        codec: C,
    ) -> Result<MergeReader<KeyValue, MessageReader<File, KeyValue, C>>, ShuffleError> {
        let readers = self
            .files()?
            .into_iter()
            .map(|path| {
                MessageReader::open(&path, codec.clone())
                    .map(|r| r.with_block_size(self.options.block_size))
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(root = %self.root.display(), files = readers.len(), "opened merged partition reader");
        Ok(MergeReader::merge_sorted(KeyValue::key_less, readers))
    }
}

impl LogGroup for LogPrefix {
    type Output = StagedLog;

    fn next_output(&mut self) -> Result<StagedLog, ShuffleError> {
        let id = Uuid::now_v7();
        let staging = self
            .root
            .join(format!("{}.{STAGING_EXTENSION}", id.as_hyphenated()));
        let target = staging.with_extension(COMMITTED_EXTENSION);

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(true)
            .open(&staging)?;
        let log = ExclusiveFile::new(file, self.options)?;
        trace!(path = %staging.display(), "opened staged partition file");
        Ok(StagedLog {
            log,
            staging,
            target,
        })
    }
}

/// A partition file being written under its staging name.
#[derive(Debug)]
pub struct StagedLog {
    log: ExclusiveFile<File>,
    staging: PathBuf,
    target: PathBuf,
}

impl StagedLog {
    /// Path the file is written under until it is committed.
    #[must_use]
    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    /// Path the file will have once committed.
    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target
    }
}

impl Write for StagedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.log.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.log.flush()
    }
}

impl PartitionOutput for StagedLog {
    fn commit(mut self) -> Result<(), ShuffleError> {
        self.log.sync()?;
        fs::rename(&self.staging, &self.target)?;
        debug!(path = %self.target.display(), "committed partition file");
        Ok(())
    }

    fn abort(self) -> Result<(), ShuffleError> {
        let Self { log, staging, .. } = self;
        drop(log);
        fs::remove_file(&staging)?;
        debug!(path = %staging.display(), "aborted partition file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shuffle::codec::JsonCodec;
    use crate::shuffle::framing::MessageWriter;

    fn prefix() -> (tempfile::TempDir, LogPrefix) {
        let dir = tempfile::tempdir();
        assert!(dir.is_ok());
        let dir = dir.unwrap_or_else(|_| panic!("tempdir"));
        let prefix = LogPrefix::new(dir.path().join("part-0"), 4096);
        assert!(prefix.is_ok());
        (dir, prefix.unwrap_or_else(|_| panic!("prefix")))
    }

    fn write_sorted(prefix: &mut LogPrefix, keys: &[&str]) {
        let output = prefix.next_output().unwrap_or_else(|_| panic!("next_output"));
        let mut writer = MessageWriter::new(output, JsonCodec::new());
        for key in keys {
            assert!(writer.send(&KeyValue::new(*key, "v")).is_ok());
        }
        assert!(writer.into_inner().commit().is_ok());
    }

    #[test]
    fn test_staged_file_is_hidden_until_commit() {
        let (_dir, mut prefix) = prefix();
        let mut output = prefix.next_output().unwrap_or_else(|_| panic!("next_output"));
        assert!(output.write_all(b"\x05hello").is_ok());
        assert!(output.staging_path().exists());
        assert_eq!(prefix.files().map(|f| f.len()).ok(), Some(0));

        let target = output.target_path().to_path_buf();
        assert!(output.commit().is_ok());
        assert!(target.exists());
        assert_eq!(prefix.files().ok(), Some(vec![target]));
    }

    #[test]
    fn test_abort_removes_file() {
        let (_dir, mut prefix) = prefix();
        let output = prefix.next_output().unwrap_or_else(|_| panic!("next_output"));
        let staging = output.staging_path().to_path_buf();
        assert!(output.abort().is_ok());
        assert!(!staging.exists());
        assert_eq!(prefix.files().map(|f| f.len()).ok(), Some(0));
    }

    #[test]
    fn test_files_are_time_ordered() {
        let (_dir, mut prefix) = prefix();
        write_sorted(&mut prefix, &["a"]);
        write_sorted(&mut prefix, &["b"]);
        write_sorted(&mut prefix, &["c"]);
        let files = prefix.files().unwrap_or_default();
        assert_eq!(files.len(), 3);
        let mut sorted = files.clone();
        sorted.sort();
        assert_eq!(files, sorted);
    }

    #[test]
    fn test_open_merged_orders_keys_across_files() {
        let (_dir, mut prefix) = prefix();
        write_sorted(&mut prefix, &["apple", "cherry", "fig"]);
        write_sorted(&mut prefix, &["banana", "date"]);

        let reader = prefix.open_merged(JsonCodec::new());
        assert!(reader.is_ok());
        let keys: Vec<Vec<u8>> = reader
            .map(|r| r.map(|kv| kv.key).collect())
            .unwrap_or_default();
        let expected: Vec<Vec<u8>> = ["apple", "banana", "cherry", "date", "fig"]
            .iter()
            .map(|k| k.as_bytes().to_vec())
            .collect();
        assert_eq!(keys, expected);
    }
}
