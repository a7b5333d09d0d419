use chunklog_rs::prelude::*;
use chunklog_rs::shuffle::{default_partition, partition_dir, partition_of};
use std::path::Path;

#[cfg(test)]
mod tests_shuffle_scenario {
    use super::*;

    fn tempdir() -> tempfile::TempDir {
        let dir = tempfile::tempdir();
        assert!(dir.is_ok());
        dir.unwrap_or_else(|_| panic!("tempdir"))
    }

    fn read_partition(root: &Path, index: usize, block_size: usize) -> Vec<KeyValue> {
        let prefix = LogPrefix::new(partition_dir(root, index), block_size);
        assert!(prefix.is_ok());
        let prefix = prefix.unwrap_or_else(|_| panic!("prefix"));
        let reader = prefix.open_merged(JsonCodec::new());
        assert!(reader.is_ok());
        reader.map(|r| r.collect()).unwrap_or_default()
    }

    fn files_with_extension(dir: &Path, ext: &str) -> usize {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().extension().is_some_and(|x| x == ext))
                    .count()
            })
            .unwrap_or(0)
    }

    #[test]
    fn test_apple_banana_end_to_end() {
        let dir = tempdir();
        let config = ShuffleConfig {
            block_size: 4096,
            ..ShuffleConfig::default()
        };
        let writer = ShuffleWriter::open(dir.path(), 2, JsonCodec::new(), config);
        assert!(writer.is_ok());
        let mut writer = writer.unwrap_or_else(|_| panic!("writer"));

        assert!(writer.send(b"apple", &[1]).is_ok());
        assert!(writer.send(b"banana", &[2]).is_ok());
        assert!(writer.send(b"apple", &[3]).is_ok());
        assert!(writer.flush().is_ok());

        let apple_partition = partition_of(&default_partition, b"apple", 2);
        let banana_partition = partition_of(&default_partition, b"banana", 2);
        assert_eq!(writer.partition_for(b"apple"), apple_partition);

        let apple_groups: Vec<KeyGroup> = KeyGroups::new(IterSource::new(read_partition(
            dir.path(),
            apple_partition,
            4096,
        )))
        .collect::<Result<_, _>>()
        .unwrap_or_default();
        let apple = apple_groups.iter().find(|g| g.key == b"apple");
        assert_eq!(apple.map(|g| g.values.clone()), Some(vec![vec![1u8], vec![3u8]]));

        let banana_groups: Vec<KeyGroup> = KeyGroups::new(IterSource::new(read_partition(
            dir.path(),
            banana_partition,
            4096,
        )))
        .collect::<Result<_, _>>()
        .unwrap_or_default();
        let banana = banana_groups.iter().find(|g| g.key == b"banana");
        assert_eq!(banana.map(|g| g.values.clone()), Some(vec![vec![2u8]]));

        // Every partition file read through one merge yields ascending keys.
        let sources: Vec<_> = (0..2)
            .map(|i| IterSource::new(read_partition(dir.path(), i, 4096)))
            .collect();
        let keys: Vec<Vec<u8>> = MergeReader::merge_sorted(KeyValue::key_less, sources)
            .map(|kv| kv.key)
            .collect();
        assert_eq!(keys.len(), 3);
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        let mut distinct = keys.clone();
        distinct.dedup();
        assert_eq!(distinct, vec![b"apple".to_vec(), b"banana".to_vec()]);
    }

    #[test]
    fn test_multiple_flushes_merge_back_in_order() {
        let dir = tempdir();
        let config = ShuffleConfig {
            block_size: 1024,
            buffer_limit: 200,
            ..ShuffleConfig::default()
        };
        let mut writer = ShuffleWriter::open(dir.path(), 3, JsonCodec::new(), config)
            .unwrap_or_else(|_| panic!("writer"));

        // Reverse order so every flush sees a different key range.
        for i in (0..120u32).rev() {
            let key = format!("k{i:04}");
            assert!(writer.send(key.as_bytes(), &i.to_le_bytes()).is_ok());
        }
        let groups = writer.close().unwrap_or_default();

        let mut files = 0;
        let mut total = 0;
        for group in &groups {
            files += group.files().map(|f| f.len()).unwrap_or(0);
            let keys: Vec<Vec<u8>> = group
                .open_merged(JsonCodec::new())
                .map(|r| r.map(|kv| kv.key).collect())
                .unwrap_or_default();
            assert!(keys.windows(2).all(|w| w[0] < w[1]));
            total += keys.len();
        }
        assert!(files > 3, "expected several flushes, saw {files} files");
        assert_eq!(total, 120);
    }

    #[test]
    fn test_best_effort_keeps_partitions_written_before_failure() {
        let dir = tempdir();
        let config = ShuffleConfig {
            block_size: 256,
            ..ShuffleConfig::default()
        };
        let mut writer = ShuffleWriter::open(dir.path(), 1, JsonCodec::new(), config)
            .unwrap_or_else(|_| panic!("writer"));

        assert!(writer.send(b"a", b"small").is_ok());
        // A frame larger than the 64 byte record limit cannot be appended.
        assert!(writer.send(b"b", &[0u8; 64]).is_ok());
        let err = writer.flush();
        assert!(matches!(
            err,
            Err(ShuffleError::Record(RecordError::RecordTooBig { .. }))
        ));
        assert_eq!(writer.buffered_keys(), 0);

        let part = partition_dir(dir.path(), 0);
        assert_eq!(files_with_extension(&part, "log"), 1);
        assert_eq!(files_with_extension(&part, "partial"), 0);
        let kept = read_partition(dir.path(), 0, 256);
        assert_eq!(kept, vec![KeyValue::new("a", "small")]);
    }

    #[test]
    fn test_all_or_nothing_leaves_no_files_on_failure() {
        let dir = tempdir();
        let config = ShuffleConfig {
            block_size: 256,
            atomicity: FlushAtomicity::AllOrNothing,
            ..ShuffleConfig::default()
        };
        let mut writer = ShuffleWriter::open(dir.path(), 1, JsonCodec::new(), config)
            .unwrap_or_else(|_| panic!("writer"));

        assert!(writer.send(b"a", b"small").is_ok());
        assert!(writer.send(b"b", &[0u8; 64]).is_ok());
        assert!(writer.flush().is_err());

        let part = partition_dir(dir.path(), 0);
        assert_eq!(files_with_extension(&part, "log"), 0);
        assert_eq!(files_with_extension(&part, "partial"), 0);

        // The writer stays usable after a failed flush.
        assert!(writer.send(b"c", b"again").is_ok());
        assert!(writer.flush().is_ok());
        assert_eq!(files_with_extension(&part, "log"), 1);
    }

    #[cfg(feature = "bincode")]
    #[test]
    fn test_bincode_partition_files() {
        let dir = tempdir();
        let mut writer = ShuffleWriter::open(
            dir.path(),
            2,
            BincodeCodec::new(),
            ShuffleConfig::default(),
        )
        .unwrap_or_else(|_| panic!("writer"));
        for key in ["delta", "alpha", "charlie", "bravo"] {
            assert!(writer.send(key.as_bytes(), key.as_bytes()).is_ok());
        }
        let groups = writer.close().unwrap_or_default();
        let sources = groups
            .iter()
            .map(|g| g.open_merged(BincodeCodec::new()))
            .collect::<Result<Vec<_>, _>>()
            .unwrap_or_default();
        let keys: Vec<Vec<u8>> = MergeReader::merge_sorted(KeyValue::key_less, sources)
            .map(|kv| kv.key)
            .collect();
        let expected: Vec<Vec<u8>> = ["alpha", "bravo", "charlie", "delta"]
            .iter()
            .map(|k| k.as_bytes().to_vec())
            .collect();
        assert_eq!(keys, expected);
    }
}
