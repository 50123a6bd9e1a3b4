use super::MigrationTask;
use crate::core::Result;
use crate::db::DbNil;
use crate::state::{JobState, ProcessingState};

/// Rebuilds the deadline index of activated jobs.
pub struct JobDeadlineIndexMigration;

impl JobDeadlineIndexMigration {
    fn activated_with_deadline(state: &ProcessingState) -> Result<Vec<(i64, i64)>> {
        let mut entries = Vec::new();
        for (key, job) in state.jobs.all_jobs()? {
            if job.deadline >= 0 && state.jobs.get_state(key)? == Some(JobState::Activated) {
                entries.push((job.deadline, key));
            }
        }
        Ok(entries)
    }
}

impl MigrationTask for JobDeadlineIndexMigration {
    fn identifier(&self) -> &'static str {
        "job-deadlines"
    }

    fn needs_to_run(&self, state: &ProcessingState) -> Result<bool> {
        if !state.jobs.deadline_index().is_empty()? {
            return Ok(false);
        }
        Ok(!Self::activated_with_deadline(state)?.is_empty())
    }

    fn run_migration(&self, state: &ProcessingState) -> Result<()> {
        for entry in Self::activated_with_deadline(state)? {
            state.jobs.deadline_index().upsert(&entry, &DbNil)?;
        }
        Ok(())
    }
}
