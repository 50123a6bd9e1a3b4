pub mod error;
pub mod types;

pub use error::{EngineError, Result};
pub use types::{
    KEY_BITS, Key, NO_KEY, NO_POSITION, PartitionId, Position, Timestamp, decode_partition_id,
    encode_partition_key, local_key,
};
