use crate::core::{Key, PartitionId, Result, encode_partition_key, local_key};
use crate::db::{ColumnFamilies, ColumnFamily, TransactionContext};
use std::sync::Arc;

const LATEST_KEY: u8 = 0;

/// Hands out partition-scoped keys. The counter lives in the store, so it rolls
/// back together with the transaction that used it.
pub struct KeyGenerator {
    partition_id: PartitionId,
    next_key: ColumnFamily<u8, i64>,
}

impl KeyGenerator {
    pub fn new(context: Arc<TransactionContext>, partition_id: PartitionId) -> Self {
        Self {
            partition_id,
            next_key: ColumnFamily::new(context, ColumnFamilies::KeyGenerator),
        }
    }

    pub fn next_key(&self) -> Result<Key> {
        let counter = self.next_key.get(&LATEST_KEY)?.unwrap_or(1);
        self.next_key.upsert(&LATEST_KEY, &(counter + 1))?;
        Ok(encode_partition_key(self.partition_id, counter))
    }

    /// Raises the counter past `key`; used while replaying events with keys from this partition.
    pub fn set_key_if_higher(&self, key: Key) -> Result<()> {
        if key < 0 || crate::core::decode_partition_id(key) != self.partition_id {
            return Ok(());
        }
        let candidate = local_key(key) + 1;
        let counter = self.next_key.get(&LATEST_KEY)?.unwrap_or(1);
        if candidate > counter {
            self.next_key.upsert(&LATEST_KEY, &candidate)?;
        }
        Ok(())
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }
}
