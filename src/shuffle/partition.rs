//! Key partitioning.

/// Maps a key to a non-negative integer; the partition is that value modulo
/// the partition count. Must be deterministic.
pub type PartitionFn = Box<dyn Fn(&[u8]) -> u64 + Send + Sync>;

/// CRC32 of the key with the top bit cleared.
#[inline]
#[must_use]
pub fn default_partition(key: &[u8]) -> u64 {
    u64::from(crc32fast::hash(key) >> 1)
}

/// Partition index of `key` among `partitions` partitions.
#[inline]
#[must_use]
pub fn partition_of(partition_fn: &(dyn Fn(&[u8]) -> u64 + Send + Sync), key: &[u8], partitions: usize) -> usize {
    (partition_fn(key) % partitions as u64) as usize
}
