use chunklog_rs::prelude::*;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::thread;

#[cfg(test)]
mod tests_record_log {
    use super::*;

    const BLOCK: usize = 512;

    fn tempdir() -> tempfile::TempDir {
        let dir = tempfile::tempdir();
        assert!(dir.is_ok());
        dir.unwrap_or_else(|_| panic!("tempdir"))
    }

    fn read_all(path: &Path) -> Vec<Record> {
        let reader = LogReader::open(path, BLOCK);
        assert!(reader.is_ok());
        reader
            .map(|r| r.collect::<Result<_, _>>().unwrap_or_default())
            .unwrap_or_default()
    }

    #[test]
    fn test_concurrent_sync_files_share_one_log() {
        let dir = tempdir();
        let path = dir.path().join("shared.log");

        // Each thread opens its own file handle, as a separate process would.
        let threads: Vec<_> = (0..4u8)
            .map(|t| {
                let path = path.clone();
                thread::spawn(move || {
                    let log = SyncFile::open(&path, LogOptions::new(BLOCK));
                    assert!(log.is_ok());
                    let mut log = log.unwrap_or_else(|_| panic!("open"));
                    for i in 0..25u8 {
                        let record = Record::new(vec![t; usize::from(i) + 1]);
                        assert!(log.record_append(&record.encode()).is_ok());
                    }
                    assert!(log.close().is_ok());
                })
            })
            .collect();
        for t in threads {
            assert!(t.join().is_ok());
        }

        assert_eq!(verify_integrity(&path, BLOCK).ok(), Some(100));

        let mut per_thread: HashMap<u8, usize> = HashMap::new();
        for record in read_all(&path) {
            let payload = record.payload();
            assert!(payload.iter().all(|b| *b == payload[0]));
            *per_thread.entry(payload[0]).or_default() += 1;
        }
        assert_eq!(per_thread.len(), 4);
        assert!(per_thread.values().all(|n| *n == 25));
    }

    #[test]
    fn test_chunks_never_straddle_blocks() {
        let dir = tempdir();
        let path = dir.path().join("aligned.log");
        let mut log = ExclusiveFile::open(&path, LogOptions::new(BLOCK))
            .unwrap_or_else(|_| panic!("open"));
        for i in 0..60usize {
            let record = Record::new(vec![1u8; (i * 7) % 100 + 1]);
            assert!(log.record_append(&record.encode()).is_ok());
        }
        assert!(log.close().is_ok());

        let mut reader = LogReader::open(&path, BLOCK).unwrap_or_else(|_| panic!("reader"));
        let mut seen = 0;
        while let Ok(Some(chunk)) = reader.read_chunk() {
            let end = reader.position();
            let start = end - chunk.size();
            assert_eq!(start / BLOCK, (end - 1) / BLOCK, "chunk at {start} crosses a block");
            seen += 1;
        }
        assert_eq!(seen, 60);
    }

    #[test]
    fn test_interleaved_split_records_reassemble() {
        let dir = tempdir();
        let path = dir.path().join("split.log");
        let mut log =
            SyncFile::open(&path, LogOptions::new(BLOCK)).unwrap_or_else(|_| panic!("open"));
        let limit = log.record_limit();

        let first = Record::new(vec![b'x'; 700]);
        let second = Record::new(vec![b'y'; 450]);
        let a = first.split(limit).unwrap_or_default();
        let b = second.split(limit).unwrap_or_default();
        assert!(a.len() > 2 && b.len() > 2);

        // Alternate chunks of the two records.
        for i in 0..a.len().max(b.len()) {
            for chunks in [&a, &b] {
                if let Some(chunk) = chunks.get(i) {
                    assert!(log.record_append(&chunk.encode()).is_ok());
                }
            }
        }
        assert!(log.close().is_ok());

        let records = read_all(&path);
        assert_eq!(records.len(), 2);
        let by_id: HashMap<_, _> = records
            .iter()
            .map(|r| (r.record_id(), r.payload().clone()))
            .collect();
        assert_eq!(by_id.get(&first.record_id()), Some(first.payload()));
        assert_eq!(by_id.get(&second.record_id()), Some(second.payload()));
        assert!(records.iter().all(|r| r.kind() == ChunkKind::Full));
    }

    #[test]
    fn test_flipped_payload_byte_is_detected() {
        let dir = tempdir();
        let path = dir.path().join("corrupt.log");
        let mut log = ExclusiveFile::open(&path, LogOptions::new(BLOCK))
            .unwrap_or_else(|_| panic!("open"));
        assert!(log.record_append(&Record::new(vec![5u8; 100]).encode()).is_ok());
        assert!(log.close().is_ok());

        let file = OpenOptions::new().write(true).open(&path);
        assert!(file.is_ok());
        let mut file = file.unwrap_or_else(|_| panic!("reopen"));
        assert!(file.seek(SeekFrom::Start(40)).is_ok());
        assert!(file.write_all(&[6]).is_ok());
        drop(file);

        let result = verify_integrity(&path, BLOCK);
        assert!(matches!(result, Err(RecordError::BadChecksum { .. })));
        assert!(result.err().is_some_and(|e| e.is_corruption()));
    }

    #[test]
    fn test_truncated_tail_is_reported() {
        let dir = tempdir();
        let path = dir.path().join("torn.log");
        let mut log = ExclusiveFile::open(&path, LogOptions::new(BLOCK))
            .unwrap_or_else(|_| panic!("open"));
        assert!(log.record_append(&Record::new(vec![9u8; 100]).encode()).is_ok());
        assert_eq!(log.size().ok(), Some(126));
        assert!(log.close().is_ok());

        let file = OpenOptions::new().write(true).open(&path);
        assert!(file.is_ok());
        assert!(file.map(|f| f.set_len(100)).is_ok_and(|r| r.is_ok()));

        let mut reader = LogReader::open(&path, BLOCK).unwrap_or_else(|_| panic!("reader"));
        assert!(matches!(
            reader.read_chunk(),
            Err(RecordError::Truncated { .. })
        ));
    }

    #[test]
    fn test_tail_shorter_than_a_chunk_is_reported() {
        let dir = tempdir();
        let path = dir.path().join("short-tail.log");
        let mut log = SyncFile::open(&path, LogOptions::new(BLOCK))
            .unwrap_or_else(|_| panic!("open"));
        assert!(log.record_append(&Record::new(vec![1u8; 10]).encode()).is_ok());
        assert!(log.record_append(&Record::new(vec![2u8; 10]).encode()).is_ok());
        assert_eq!(log.size().ok(), Some(72));
        assert!(log.close().is_ok());

        // Keep the first chunk and only 20 bytes of the second.
        let file = OpenOptions::new().write(true).open(&path);
        assert!(file.map(|f| f.set_len(56)).is_ok_and(|r| r.is_ok()));

        let checked = verify_integrity(&path, BLOCK);
        assert!(matches!(checked, Err(RecordError::Truncated { .. })));

        let mut reader = LogReader::open(&path, BLOCK).unwrap_or_else(|_| panic!("reader"));
        assert!(matches!(reader.next(), Some(Ok(_))));
        assert!(matches!(reader.next(), Some(Err(RecordError::Truncated { .. }))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_oversized_append_is_rejected_without_io() {
        let dir = tempdir();
        let path = dir.path().join("limit.log");
        let mut log =
            SyncFile::open(&path, LogOptions::new(BLOCK)).unwrap_or_else(|_| panic!("open"));
        let limit = log.record_limit();
        let result = log.record_append(&vec![0u8; limit + 1]);
        assert!(matches!(result, Err(RecordError::RecordTooBig { .. })));
        assert_eq!(log.size().ok(), Some(0));
    }
}
