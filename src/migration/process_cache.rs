use super::MigrationTask;
use crate::core::{Key, Result};
use crate::db::{ColumnFamilies, ColumnFamily};
use crate::model::ExecutableProcess;
use crate::state::{DeployedProcess, ProcessingState};
use serde::{Deserialize, Serialize};

/// Process entry of the legacy single-table process cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyProcess {
    pub bpmn_process_id: String,
    pub version: i32,
    pub key: Key,
    pub process: ExecutableProcess,
}

/// Splits the legacy process cache into the by-key, by-id-and-version and
/// latest-version families.
pub struct ProcessCacheMigration;

fn legacy_cache(state: &ProcessingState) -> ColumnFamily<i64, LegacyProcess> {
    ColumnFamily::new(state.context().clone(), ColumnFamilies::DeprecatedProcessCache)
}

impl MigrationTask for ProcessCacheMigration {
    fn identifier(&self) -> &'static str {
        "process-cache"
    }

    fn needs_to_run(&self, state: &ProcessingState) -> Result<bool> {
        Ok(!legacy_cache(state).is_empty()?)
    }

    fn run_migration(&self, state: &ProcessingState) -> Result<()> {
        let legacy = legacy_cache(state);
        for (key, process) in legacy.entries()? {
            state.processes.put_process(&DeployedProcess {
                bpmn_process_id: process.bpmn_process_id,
                version: process.version,
                key: process.key,
                process: process.process,
            })?;
            legacy.delete_existing(&key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::model::ProcessBuilder;

    #[test]
    fn test_latest_version_is_restored() {
        let state = ProcessingState::new(Db::in_memory().create_context(), 1);
        let process = ProcessBuilder::new("order").start_event("s").end_event("e").build().unwrap();
        let legacy = legacy_cache(&state);
        for version in 1..=2 {
            legacy
                .upsert(
                    &(version as i64 * 10),
                    &LegacyProcess {
                        bpmn_process_id: "order".into(),
                        version,
                        key: version as i64 * 10,
                        process: process.clone(),
                    },
                )
                .unwrap();
        }

        let migration = ProcessCacheMigration;
        migration.run_migration(&state).unwrap();

        assert!(!migration.needs_to_run(&state).unwrap());
        let latest = state.processes.get_latest_process("order").unwrap().unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.key, 20);
        assert!(state.processes.get_process_by_key(10).unwrap().is_some());
    }
}
