use crate::core::{Key, NO_KEY, Result};
use crate::db::{ColumnFamilies, ColumnFamily, TransactionContext};
use crate::record::IncidentRecord;
use std::sync::Arc;

pub struct IncidentState {
    incidents: ColumnFamily<i64, IncidentRecord>,
    by_element_instance: ColumnFamily<i64, i64>,
    by_job: ColumnFamily<i64, i64>,
}

impl IncidentState {
    pub fn new(context: Arc<TransactionContext>) -> Self {
        Self {
            incidents: ColumnFamily::new(Arc::clone(&context), ColumnFamilies::Incidents),
            by_element_instance: ColumnFamily::new(
                Arc::clone(&context),
                ColumnFamilies::IncidentByElementInstance,
            ),
            by_job: ColumnFamily::new(context, ColumnFamilies::IncidentByJob),
        }
    }

    pub fn create(&self, key: Key, incident: &IncidentRecord) -> Result<()> {
        self.incidents.insert(&key, incident)?;
        if incident.job_key != NO_KEY {
            self.by_job.upsert(&incident.job_key, &key)
        } else {
            self.by_element_instance.upsert(&incident.element_instance_key, &key)
        }
    }

    pub fn delete(&self, key: Key) -> Result<()> {
        if let Some(incident) = self.incidents.get(&key)? {
            self.incidents.delete_existing(&key)?;
            if incident.job_key != NO_KEY {
                self.by_job.delete_if_exists(&incident.job_key)?;
            } else {
                self.by_element_instance.delete_if_exists(&incident.element_instance_key)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, key: Key) -> Result<Option<IncidentRecord>> {
        self.incidents.get(&key)
    }

    pub fn incident_for_element_instance(&self, element_instance_key: Key) -> Result<Option<Key>> {
        self.by_element_instance.get(&element_instance_key)
    }

    pub fn incident_for_job(&self, job_key: Key) -> Result<Option<Key>> {
        self.by_job.get(&job_key)
    }

    pub fn count(&self) -> Result<usize> {
        self.incidents.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::record::ErrorType;

    #[test]
    fn test_job_incident_is_indexed_by_job() {
        let db = Db::in_memory();
        let state = IncidentState::new(db.create_context());
        let incident = IncidentRecord {
            error_type: ErrorType::JobNoRetries,
            error_message: "no retries left".into(),
            bpmn_process_id: "p".into(),
            process_definition_key: 1,
            process_instance_key: 2,
            element_id: "task".into(),
            element_instance_key: 3,
            job_key: 4,
        };
        state.create(9, &incident).unwrap();
        assert_eq!(state.incident_for_job(4).unwrap(), Some(9));
        assert_eq!(state.incident_for_element_instance(3).unwrap(), None);

        state.delete(9).unwrap();
        assert_eq!(state.incident_for_job(4).unwrap(), None);
        assert_eq!(state.count().unwrap(), 0);
    }
}
