use crate::routing::partition::Partition;
use xxhash_rust::xxh32::xxh32;

/// PartitionRouter maps keys onto a fixed, ordered list of partitions. The mapping only changes
/// if the partition list does.
pub(crate) struct PartitionRouter {
    logger: slog::Logger,
    partitions: Vec<Partition>,
}

impl PartitionRouter {
    pub(crate) fn new(logger: slog::Logger, partitions: Vec<Partition>) -> Self {
        // Options validation rejects an empty partition list before a router is built.
        debug_assert!(!partitions.is_empty(), "PartitionRouter requires at least one partition");

        PartitionRouter {
            logger: logger.new(slog::o!("Component" => "PartitionRouter")),
            partitions,
        }
    }

    pub(crate) fn route(&self, key: &str) -> &Partition {
        let index = partition_index(key, self.partitions.len());
        slog::debug!(self.logger, "Selected partition {} for key {}", index, key);

        &self.partitions[index]
    }

    pub(crate) fn partitions(&self) -> &[Partition] {
        &self.partitions
    }
}

/// xxHash32 (seed 0) of the UTF-8 key. The digest's canonical big-endian bytes are read back as a
/// little-endian i32 so keys land where existing deployments already put them.
fn partition_index(key: &str, partition_count: usize) -> usize {
    let digest = xxh32(key.as_bytes(), 0);
    let hash = i32::from_le_bytes(digest.to_be_bytes()) as i64;

    (hash % partition_count as i64).unsigned_abs() as usize
}
