//! Renders the crate's counters in the Prometheus text format.
//!
//! Run with `cargo run -p demos --features metrics --bin prometheus_export`.
//! The demo appends records to a small-block log so padding is written,
//! runs one shuffle with a failing flush, and prints what the recorder saw.

use chunklog_rs::prelude::*;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let handle = PrometheusBuilder::new().install_recorder()?;

    let root = std::env::temp_dir().join(format!("prometheus-export-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&root)?;

    // Record log: 200-byte records in 1 KiB blocks leave a padded tail.
    let mut log = ExclusiveFile::open(root.join("records.log"), LogOptions::new(1024))?;
    for i in 0..20u8 {
        log.record_append(&Record::new(vec![i; 150]).encode())?;
    }
    log.close()?;

    // Shuffle: one good flush, then one whose frame exceeds the record limit.
    let config = ShuffleConfig {
        block_size: 256,
        ..ShuffleConfig::default()
    };
    let mut writer = ShuffleWriter::open(root.join("shuffle"), 2, JsonCodec::new(), config)?;
    writer.send(b"alpha", b"1")?;
    writer.send(b"beta", b"2")?;
    writer.flush()?;
    writer.send(b"gamma", &[0u8; 128])?;
    if let Err(e) = writer.flush() {
        warn!("flush failed as expected: {}", e);
    }
    writer.close()?;

    info!("\n{}", handle.render());

    std::fs::remove_dir_all(&root)?;
    Ok(())
}
