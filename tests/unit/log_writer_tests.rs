use chunklog_rs::prelude::*;
use std::io::Write;
use std::sync::Arc;
use std::thread;

#[cfg(test)]
mod tests_log_writer {
    use super::*;

    const BLOCK: usize = 512;

    fn tempdir() -> tempfile::TempDir {
        let dir = tempfile::tempdir();
        assert!(dir.is_ok());
        dir.unwrap_or_else(|_| panic!("tempdir"))
    }

    #[test]
    fn test_handles_from_many_threads() {
        let dir = tempdir();
        let path = dir.path().join("handles.log");
        let log = SyncFile::open(&path, LogOptions::new(BLOCK));
        assert!(log.is_ok());
        let writer = Arc::new(LogWriter::new(log.unwrap_or_else(|_| panic!("open"))));

        let threads: Vec<_> = (0..4u8)
            .map(|t| {
                let writer = Arc::clone(&writer);
                thread::spawn(move || {
                    for i in 0..10u8 {
                        let mut handle = writer.next_writer();
                        // Sizes cross the 128 byte record limit for some handles.
                        let payload = vec![t * 16 + i; usize::from(i) * 40 + 1];
                        assert!(handle.write_all(&payload).is_ok());
                        handle.close();
                    }
                })
            })
            .collect();
        for t in threads {
            assert!(t.join().is_ok());
        }

        assert_eq!(writer.flush().ok(), Some(40));
        assert_eq!(writer.pending(), 0);
        let writer = Arc::try_unwrap(writer).unwrap_or_else(|_| panic!("still shared"));
        assert!(writer.close().is_ok());

        let records: Vec<Record> = LogReader::open(&path, BLOCK)
            .map(|r| r.collect::<Result<_, _>>().unwrap_or_default())
            .unwrap_or_default();
        assert_eq!(records.len(), 40);
        for record in &records {
            let payload = record.payload();
            assert!(!payload.is_empty());
            assert!(payload.iter().all(|b| *b == payload[0]));
            let i = payload[0] % 16;
            assert_eq!(payload.len(), usize::from(i) * 40 + 1);
        }
    }

    #[test]
    fn test_flush_interleaves_with_open_handles() {
        let dir = tempdir();
        let path = dir.path().join("interleave.log");
        let log = ExclusiveFile::open(&path, LogOptions::new(BLOCK));
        let writer = LogWriter::new(log.unwrap_or_else(|_| panic!("open")));

        let mut long_lived = writer.next_writer();
        assert!(long_lived.write_all(b"part one, ").is_ok());

        let mut short = writer.next_writer();
        assert!(short.write_all(b"short").is_ok());
        short.close();
        assert_eq!(writer.flush().ok(), Some(1));

        assert!(long_lived.write_all(b"part two").is_ok());
        long_lived.close();
        assert_eq!(writer.flush().ok(), Some(1));
        assert!(writer.close().is_ok());

        let payloads: Vec<Vec<u8>> = LogReader::open(&path, BLOCK)
            .map(|r| {
                r.map(|rec| rec.map(|rec| rec.payload().to_vec()))
                    .collect::<Result<_, _>>()
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        assert_eq!(payloads, vec![b"short".to_vec(), b"part one, part two".to_vec()]);
    }

    #[test]
    fn test_write_record_spans_blocks() {
        let dir = tempdir();
        let path = dir.path().join("big.log");
        let writer = LogWriter::new(
            SyncFile::open(&path, LogOptions::new(BLOCK)).unwrap_or_else(|_| panic!("open")),
        );
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 253) as u8).collect();
        let end = writer.write_record(&payload);
        assert!(end.is_ok());
        assert_eq!(end.ok(), writer.size().ok());
        assert!(writer.close().is_ok());

        let chunks = verify_integrity(&path, BLOCK);
        assert!(chunks.map(|n| n > 1).unwrap_or(false));
        let records: Vec<Record> = LogReader::open(&path, BLOCK)
            .map(|r| r.collect::<Result<_, _>>().unwrap_or_default())
            .unwrap_or_default();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0].payload()[..], &payload[..]);
    }
}
