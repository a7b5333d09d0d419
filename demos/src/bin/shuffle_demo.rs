//! Word count through the shuffle layer.
//!
//! A "map" step sends one `(word, 1)` pair per word to a small-buffer
//! `ShuffleWriter`, so the pairs land in several sorted files per
//! partition. The "reduce" step merges each partition back and sums the
//! counts per word.

use chunklog_rs::prelude::*;
use tracing::info;

const TEXT: &str = "the quick brown fox jumps over the lazy dog \
                    the dog barks and the fox runs over the hill \
                    a quick dog and a lazy fox";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    info!("=== Shuffle Demo ===");

    let root = std::env::temp_dir().join(format!("shuffle-demo-{}", uuid::Uuid::now_v7()));
    let config = ShuffleConfig::from_json(
        r#"{ "buffer_limit": 128, "block_size": 4096, "atomicity": "best_effort" }"#,
    )?;
    info!("Config: {:?}", config);

    info!("\nStep 1: map");
    let mut writer = ShuffleWriter::open(&root, 3, JsonCodec::new(), config)?;
    for word in TEXT.split_whitespace() {
        writer.send(word.as_bytes(), &1u32.to_le_bytes())?;
    }
    let partitions = writer.close()?;

    for (index, partition) in partitions.iter().enumerate() {
        info!(
            "  partition {} holds {} sorted files",
            index,
            partition.files()?.len()
        );
    }

    info!("\nStep 2: reduce");
    for (index, partition) in partitions.iter().enumerate() {
        for group in KeyGroups::new(partition.open_merged(JsonCodec::new())?) {
            let group = group?;
            let count: u32 = group
                .values
                .iter()
                .filter_map(|v| v.as_slice().try_into().ok().map(u32::from_le_bytes))
                .sum();
            info!(
                "  [p{}] {:<6} {}",
                index,
                String::from_utf8_lossy(&group.key),
                count
            );
        }
    }

    std::fs::remove_dir_all(&root)?;
    info!("\n=== Demo Complete ===");
    Ok(())
}
