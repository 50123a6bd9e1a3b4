use crate::core::{Key, Result, Timestamp};
use crate::db::{ColumnFamilies, ColumnFamily, DbNil, TransactionContext};
use crate::record::JobRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Activatable,
    Activated,
    Failed,
    ErrorThrown,
}

pub struct JobStore {
    jobs: ColumnFamily<i64, JobRecord>,
    states: ColumnFamily<i64, JobState>,
    activatable: ColumnFamily<(String, i64), DbNil>,
    deadlines: ColumnFamily<(i64, i64), DbNil>,
}

impl JobStore {
    pub fn new(context: Arc<TransactionContext>) -> Self {
        Self {
            jobs: ColumnFamily::new(Arc::clone(&context), ColumnFamilies::Jobs),
            states: ColumnFamily::new(Arc::clone(&context), ColumnFamilies::JobStates),
            activatable: ColumnFamily::new(Arc::clone(&context), ColumnFamilies::JobActivatable),
            deadlines: ColumnFamily::new(context, ColumnFamilies::JobDeadlines),
        }
    }

    pub fn get_job(&self, key: Key) -> Result<Option<JobRecord>> {
        self.jobs.get(&key)
    }

    pub fn get_state(&self, key: Key) -> Result<Option<JobState>> {
        self.states.get(&key)
    }

    pub fn exists(&self, key: Key) -> Result<bool> {
        self.jobs.exists(&key)
    }

    pub fn create(&self, key: Key, job: &JobRecord) -> Result<()> {
        self.jobs.insert(&key, job)?;
        self.make_activatable(key, job)
    }

    pub fn activate(&self, key: Key, job: &JobRecord) -> Result<()> {
        self.clear_indexes(key)?;
        self.jobs.upsert(&key, job)?;
        self.states.upsert(&key, &JobState::Activated)?;
        if job.deadline >= 0 {
            self.deadlines.upsert(&(job.deadline, key), &DbNil)?;
        }
        Ok(())
    }

    /// Removes every trace of the job (completed, canceled).
    pub fn delete(&self, key: Key) -> Result<()> {
        self.clear_indexes(key)?;
        self.jobs.delete_if_exists(&key)?;
        self.states.delete_if_exists(&key)?;
        Ok(())
    }

    /// A failed job with retries left becomes activatable again; otherwise it
    /// waits for an incident resolution.
    pub fn fail(&self, key: Key, job: &JobRecord) -> Result<()> {
        self.clear_indexes(key)?;
        self.jobs.upsert(&key, job)?;
        if job.retries > 0 {
            self.make_activatable(key, job)
        } else {
            self.states.upsert(&key, &JobState::Failed)
        }
    }

    pub fn error_thrown(&self, key: Key, job: &JobRecord) -> Result<()> {
        self.clear_indexes(key)?;
        self.jobs.upsert(&key, job)?;
        self.states.upsert(&key, &JobState::ErrorThrown)
    }

    pub fn timeout(&self, key: Key, job: &JobRecord) -> Result<()> {
        self.clear_indexes(key)?;
        self.jobs.upsert(&key, job)?;
        self.make_activatable(key, job)
    }

    pub fn update_retries(&self, key: Key, retries: i32) -> Result<()> {
        if let Some(mut job) = self.jobs.get(&key)? {
            job.retries = retries;
            self.jobs.update(&key, &job)?;
        }
        Ok(())
    }

    /// Makes a failed job, or one whose error was not caught, activatable again
    /// after its incident was resolved.
    pub fn resolve(&self, key: Key) -> Result<()> {
        if let Some(job) = self.jobs.get(&key)? {
            if matches!(self.states.get(&key)?, Some(JobState::Failed | JobState::ErrorThrown)) {
                self.make_activatable(key, &job)?;
            }
        }
        Ok(())
    }

    fn make_activatable(&self, key: Key, job: &JobRecord) -> Result<()> {
        let mut job = job.clone();
        job.deadline = -1;
        job.worker.clear();
        self.jobs.upsert(&key, &job)?;
        self.states.upsert(&key, &JobState::Activatable)?;
        self.activatable.upsert(&(job.job_type.clone(), key), &DbNil)
    }

    fn clear_indexes(&self, key: Key) -> Result<()> {
        if let Some(job) = self.jobs.get(&key)? {
            self.activatable.delete_if_exists(&(job.job_type.clone(), key))?;
            if job.deadline >= 0 {
                self.deadlines.delete_if_exists(&(job.deadline, key))?;
            }
        }
        Ok(())
    }

    /// Activatable jobs of a type, in key order, until the visitor returns `false`.
    pub fn for_each_activatable(
        &self,
        job_type: &str,
        mut visitor: impl FnMut(Key, JobRecord) -> bool,
    ) -> Result<()> {
        for ((_, key), _) in self.activatable.entries_with_prefix(&job_type.to_string())? {
            if let Some(job) = self.jobs.get(&key)? {
                if !visitor(key, job) {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Visits activated jobs whose deadline is at or before `now`, at most `limit` of them.
    /// Returns the next deadline after the visited ones, or `None` if there is none.
    pub fn for_each_timed_out(
        &self,
        now: Timestamp,
        limit: usize,
        mut visitor: impl FnMut(Key, JobRecord),
    ) -> Result<Option<Timestamp>> {
        let mut visited = 0;
        for ((deadline, key), _) in self.deadlines.entries()? {
            if deadline > now || visited >= limit {
                return Ok(Some(deadline));
            }
            if let Some(job) = self.jobs.get(&key)? {
                visitor(key, job);
                visited += 1;
            }
        }
        Ok(None)
    }

    pub fn count(&self) -> Result<usize> {
        self.jobs.count()
    }

    pub(crate) fn deadline_index(&self) -> &ColumnFamily<(i64, i64), DbNil> {
        &self.deadlines
    }

    pub(crate) fn all_jobs(&self) -> Result<Vec<(Key, JobRecord)>> {
        self.jobs.entries()
    }
}
