use crate::core::{EngineError, Key, Result};
use crate::db::{ColumnFamilies, ColumnFamily, TransactionContext};
use crate::model::ExecutableProcess;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedProcess {
    pub bpmn_process_id: String,
    pub version: i32,
    pub key: Key,
    pub process: ExecutableProcess,
}

pub struct ProcessState {
    by_key: ColumnFamily<i64, DeployedProcess>,
    by_id_and_version: ColumnFamily<(String, i32), i64>,
    latest_version: ColumnFamily<String, i32>,
}

impl ProcessState {
    pub fn new(context: Arc<TransactionContext>) -> Self {
        Self {
            by_key: ColumnFamily::new(Arc::clone(&context), ColumnFamilies::ProcessCacheByKey),
            by_id_and_version: ColumnFamily::new(
                Arc::clone(&context),
                ColumnFamilies::ProcessCacheByIdAndVersion,
            ),
            latest_version: ColumnFamily::new(context, ColumnFamilies::ProcessLatestVersion),
        }
    }

    pub fn put_process(&self, process: &DeployedProcess) -> Result<()> {
        self.by_key.upsert(&process.key, process)?;
        self.by_id_and_version
            .upsert(&(process.bpmn_process_id.clone(), process.version), &process.key)?;
        let latest = self.latest_version.get(&process.bpmn_process_id)?.unwrap_or(0);
        if process.version > latest {
            self.latest_version.upsert(&process.bpmn_process_id, &process.version)?;
        }
        Ok(())
    }

    pub fn get_process_by_key(&self, key: Key) -> Result<Option<DeployedProcess>> {
        self.by_key.get(&key)
    }

    /// Looks up a process that state refers to; a miss means corrupted state.
    pub fn require_process(&self, key: Key) -> Result<DeployedProcess> {
        self.by_key.get(&key)?.ok_or_else(|| {
            EngineError::illegal_state(format!(
                "Expected to find a deployed process with key {}, but none was found",
                key
            ))
        })
    }

    pub fn get_latest_version(&self, bpmn_process_id: &str) -> Result<i32> {
        Ok(self.latest_version.get(&bpmn_process_id.to_string())?.unwrap_or(0))
    }

    pub fn get_process_by_id_and_version(
        &self,
        bpmn_process_id: &str,
        version: i32,
    ) -> Result<Option<DeployedProcess>> {
        match self.by_id_and_version.get(&(bpmn_process_id.to_string(), version))? {
            Some(key) => self.by_key.get(&key),
            None => Ok(None),
        }
    }

    pub fn get_latest_process(&self, bpmn_process_id: &str) -> Result<Option<DeployedProcess>> {
        let version = self.get_latest_version(bpmn_process_id)?;
        if version == 0 {
            return Ok(None);
        }
        self.get_process_by_id_and_version(bpmn_process_id, version)
    }

    pub fn count(&self) -> Result<usize> {
        self.by_key.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::model::ProcessBuilder;

    fn deployed(key: Key, version: i32) -> DeployedProcess {
        DeployedProcess {
            bpmn_process_id: "order".into(),
            version,
            key,
            process: ProcessBuilder::new("order").start_event("s").end_event("e").build().unwrap(),
        }
    }

    #[test]
    fn test_latest_version_tracks_highest_deployment() {
        let db = Db::in_memory();
        let state = ProcessState::new(db.create_context());
        assert!(state.get_latest_process("order").unwrap().is_none());

        state.put_process(&deployed(100, 1)).unwrap();
        state.put_process(&deployed(200, 2)).unwrap();

        assert_eq!(state.get_latest_version("order").unwrap(), 2);
        assert_eq!(state.get_latest_process("order").unwrap().unwrap().key, 200);
        assert_eq!(state.get_process_by_id_and_version("order", 1).unwrap().unwrap().key, 100);
    }

    #[test]
    fn test_missing_process_is_illegal_state() {
        let db = Db::in_memory();
        let state = ProcessState::new(db.create_context());
        assert!(matches!(state.require_process(1), Err(EngineError::IllegalState(_))));
    }
}
