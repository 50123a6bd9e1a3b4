use super::MigrationTask;
use crate::core::Result;
use crate::db::{ColumnFamilies, ColumnFamily, DbNil};
use crate::state::ProcessingState;

/// Moves keys from the legacy blacklist family into the banned-instance family.
pub struct BannedInstancesMigration;

fn legacy_blacklist(state: &ProcessingState) -> ColumnFamily<i64, DbNil> {
    ColumnFamily::new(state.context().clone(), ColumnFamilies::DeprecatedBlacklist)
}

impl MigrationTask for BannedInstancesMigration {
    fn identifier(&self) -> &'static str {
        "banned-instances"
    }

    fn needs_to_run(&self, state: &ProcessingState) -> Result<bool> {
        Ok(!legacy_blacklist(state).is_empty()?)
    }

    fn run_migration(&self, state: &ProcessingState) -> Result<()> {
        let legacy = legacy_blacklist(state);
        for (process_instance_key, _) in legacy.entries()? {
            state.banned_instances.ban_instance(process_instance_key)?;
            legacy.delete_existing(&process_instance_key)?;
        }
        Ok(())
    }
}
