//! Demo of the block-aligned record log.
//!
//! Several threads share one synced log through a `LogWriter`, some records
//! are larger than the log's record limit and get split into chunks, and
//! the log is then read back and verified.

use chunklog_rs::prelude::*;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

const BLOCK_SIZE: usize = 1024;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    info!("=== Record Log Demo ===");

    let path = std::env::temp_dir().join(format!("record-log-demo-{}.log", uuid::Uuid::now_v7()));
    let log = SyncFile::open(&path, LogOptions::new(BLOCK_SIZE))?;
    info!(
        "Opened {} (block {} bytes, record limit {} bytes)",
        path.display(),
        log.block_size(),
        log.record_limit()
    );

    let writer = Arc::new(LogWriter::new(log));

    info!("\nStep 1: writing from three threads");
    let workers: Vec<_> = (0..3u8)
        .map(|worker| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || -> std::io::Result<()> {
                for n in 0..4usize {
                    let mut handle = writer.next_writer();
                    // Every fourth message is well past the record limit.
                    let size = if n == 3 { 2_000 } else { 40 + n * 10 };
                    handle.write_all(&vec![b'a' + worker; size])?;
                    handle.close();
                }
                Ok(())
            })
        })
        .collect();
    for worker in workers {
        match worker.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("  ✗ worker failed: {}", e),
            Err(_) => warn!("  ✗ worker panicked"),
        }
    }

    info!("  {} handles waiting to be flushed", writer.pending());
    let flushed = writer.flush()?;
    info!("  ✓ flushed {} records, log is {} bytes", flushed, writer.size()?);

    info!("\nStep 2: one direct write");
    let end = writer.write_record(b"written without a handle")?;
    info!("  ✓ log now ends at byte {}", end);

    match Arc::try_unwrap(writer) {
        Ok(writer) => writer.close()?,
        Err(_) => warn!("writer still shared, not closing"),
    }

    info!("\nStep 3: reading back");
    let chunks = verify_integrity(&path, BLOCK_SIZE)?;
    info!("  ✓ {} chunks passed their checksum", chunks);

    for record in LogReader::open(&path, BLOCK_SIZE)? {
        let record = record?;
        let payload = record.payload();
        info!(
            "  record {} → {} bytes starting with {:?}",
            record.record_id(),
            payload.len(),
            payload.first().map(|b| char::from(*b))
        );
    }

    std::fs::remove_file(&path)?;
    info!("\n=== Demo Complete ===");
    Ok(())
}
