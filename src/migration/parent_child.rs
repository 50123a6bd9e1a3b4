use super::MigrationTask;
use crate::core::{NO_KEY, Result};
use crate::db::DbNil;
use crate::state::ProcessingState;

/// Rebuilds the parent/child index of element instances from the instances themselves.
pub struct ParentChildIndexMigration;

impl MigrationTask for ParentChildIndexMigration {
    fn identifier(&self) -> &'static str {
        "element-instance-parent-child"
    }

    fn needs_to_run(&self, state: &ProcessingState) -> Result<bool> {
        let elements = &state.element_instances;
        if !elements.parent_child_index().is_empty()? {
            return Ok(false);
        }
        Ok(elements
            .all_instances()?
            .iter()
            .any(|instance| instance.parent_key != NO_KEY))
    }

    fn run_migration(&self, state: &ProcessingState) -> Result<()> {
        let elements = &state.element_instances;
        for instance in elements.all_instances()? {
            if instance.parent_key != NO_KEY {
                elements
                    .parent_child_index()
                    .upsert(&(instance.parent_key, instance.key), &DbNil)?;
            }
        }
        Ok(())
    }
}
