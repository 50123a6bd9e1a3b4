/// Partition-scoped entity key (element instances, jobs, timers, ...).
pub type Key = i64;

/// Position of a record in the partition log.
pub type Position = i64;

pub type PartitionId = u16;

/// Milliseconds since the unix epoch, as seen by the stream clock.
pub type Timestamp = i64;

pub const NO_KEY: Key = -1;
pub const NO_POSITION: Position = -1;

/// Number of low bits of a key reserved for the partition-local counter.
pub const KEY_BITS: u32 = 51;

/// Builds a globally unique key from a partition id and a partition-local counter value.
pub fn encode_partition_key(partition_id: PartitionId, local_key: i64) -> Key {
    ((partition_id as i64) << KEY_BITS) + local_key
}

pub fn decode_partition_id(key: Key) -> PartitionId {
    (key >> KEY_BITS) as PartitionId
}

pub fn local_key(key: Key) -> i64 {
    key & ((1_i64 << KEY_BITS) - 1)
}
