//! Read-only lookups for callers outside the processing loop.

use crate::core::{Key, Position, Result};
use crate::db::Db;
use crate::record::{IncidentRecord, JobRecord};
use crate::scheduler::ClockModification;
use crate::state::{DeployedProcess, ElementInstance, JobState, ProcessingState};

/// Reads the last committed state through a read-only context. Results may be
/// stale by the batches committed since the call, but never partially applied.
pub struct QueryService {
    state: ProcessingState,
}

impl QueryService {
    pub fn new(db: &Db, partition_id: crate::core::PartitionId) -> Self {
        Self {
            state: ProcessingState::new(db.create_read_only_context(), partition_id),
        }
    }

    pub fn element_instance(&self, key: Key) -> Result<Option<ElementInstance>> {
        self.state.element_instances.get_instance(key)
    }

    pub fn children(&self, scope_key: Key) -> Result<Vec<ElementInstance>> {
        self.state.element_instances.get_children(scope_key)
    }

    /// Every live element instance of one process instance, the process element included.
    pub fn element_instances_of(&self, process_instance_key: Key) -> Result<Vec<ElementInstance>> {
        Ok(self
            .state
            .element_instances
            .all_instances()?
            .into_iter()
            .filter(|instance| instance.value.process_instance_key == process_instance_key)
            .collect())
    }

    pub fn element_instance_count(&self) -> Result<usize> {
        self.state.element_instances.count()
    }

    pub fn job(&self, key: Key) -> Result<Option<(JobState, JobRecord)>> {
        let Some(job) = self.state.jobs.get_job(key)? else {
            return Ok(None);
        };
        Ok(self.state.jobs.get_state(key)?.map(|state| (state, job)))
    }

    pub fn job_count(&self) -> Result<usize> {
        self.state.jobs.count()
    }

    pub fn incident(&self, key: Key) -> Result<Option<IncidentRecord>> {
        self.state.incidents.get(key)
    }

    pub fn incident_count(&self) -> Result<usize> {
        self.state.incidents.count()
    }

    pub fn timer_count(&self) -> Result<usize> {
        self.state.timers.count()
    }

    pub fn signal_subscription_count(&self) -> Result<usize> {
        self.state.signal_subscriptions.count()
    }

    pub fn latest_process(&self, bpmn_process_id: &str) -> Result<Option<DeployedProcess>> {
        self.state.processes.get_latest_process(bpmn_process_id)
    }

    pub fn process_by_key(&self, key: Key) -> Result<Option<DeployedProcess>> {
        self.state.processes.get_process_by_key(key)
    }

    pub fn process_count(&self) -> Result<usize> {
        self.state.processes.count()
    }

    pub fn is_banned(&self, process_instance_key: Key) -> Result<bool> {
        self.state.banned_instances.is_banned_key(process_instance_key)
    }

    pub fn banned_instances(&self) -> Result<Vec<Key>> {
        self.state.banned_instances.get_banned_process_instance_keys()
    }

    pub fn last_processed_position(&self) -> Result<Position> {
        self.state
            .last_processed_position
            .get_last_successful_processed_record_position()
    }

    pub fn clock_modification(&self) -> Result<ClockModification> {
        self.state.clock.get_modification()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NO_POSITION;

    #[test]
    fn test_sees_committed_state_only() {
        let db = Db::in_memory();
        let state = ProcessingState::new(db.create_context(), 1);
        let query = QueryService::new(&db, 1);
        assert_eq!(query.last_processed_position().unwrap(), NO_POSITION);

        state.context().begin().unwrap();
        state.banned_instances.ban_instance(42).unwrap();
        assert!(!query.is_banned(42).unwrap());

        state.context().commit().unwrap();
        assert!(query.is_banned(42).unwrap());
        assert_eq!(query.banned_instances().unwrap(), vec![42]);
    }
}
