use crate::core::{Key, Result};
use crate::db::{ColumnFamilies, ColumnFamily, DbNil, TransactionContext};
use crate::record::Record;
use std::sync::Arc;
use tracing::{Level, event};

/// Process instances that are excluded from further processing. Banning is never undone.
pub struct BannedInstanceState {
    banned: ColumnFamily<i64, DbNil>,
}

impl BannedInstanceState {
    pub fn new(context: Arc<TransactionContext>) -> Self {
        Self {
            banned: ColumnFamily::new(context, ColumnFamilies::BannedInstance),
        }
    }

    /// True if the record is process-instance related and its instance is banned.
    pub fn is_banned(&self, record: &Record) -> Result<bool> {
        match record.process_instance_key() {
            Some(key) => self.is_banned_key(key),
            None => Ok(false),
        }
    }

    pub fn is_banned_key(&self, process_instance_key: Key) -> Result<bool> {
        self.banned.exists(&process_instance_key)
    }

    pub fn ban_instance(&self, process_instance_key: Key) -> Result<()> {
        self.banned.upsert(&process_instance_key, &DbNil)
    }

    /// Bans the instance of a failed command if its intent asks for it and the value
    /// refers to a process instance. `on_banning_instance` runs after the key was stored.
    pub fn try_to_ban_instance(
        &self,
        command: &Record,
        on_banning_instance: impl FnOnce(Key) -> Result<()>,
    ) -> Result<bool> {
        if !command.intent.should_ban_instance_on_error() {
            return Ok(false);
        }
        let Some(process_instance_key) = command.process_instance_key() else {
            return Ok(false);
        };
        self.ban_instance(process_instance_key)?;
        event!(
            Level::WARN,
            process_instance_key,
            intent = %command.intent,
            position = command.position,
            "banned process instance after processing error"
        );
        on_banning_instance(process_instance_key)?;
        Ok(true)
    }

    pub fn get_banned_process_instance_keys(&self) -> Result<Vec<Key>> {
        Ok(self.banned.entries()?.into_iter().map(|(key, _)| key).collect())
    }
}
