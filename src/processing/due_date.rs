//! Scans for due timers and timed-out jobs and turns them into commands.

use crate::core::{Key, Result, Timestamp};
use crate::record::{Intent, JobIntent, Record, TimerIntent};
use crate::state::ProcessingState;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Commands written by the due-date checkers that were not processed yet.
///
/// A timer that stays due until its TRIGGER command is processed would
/// otherwise be written again by every check in between.
#[derive(Debug, Clone, Default)]
pub struct ScheduledCommandCache {
    pending: Arc<Mutex<HashSet<(Intent, Key)>>>,
}

impl ScheduledCommandCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the command is already pending.
    pub fn add(&self, intent: Intent, key: Key) -> Result<bool> {
        Ok(self.pending.lock()?.insert((intent, key)))
    }

    pub fn contains(&self, intent: Intent, key: Key) -> Result<bool> {
        Ok(self.pending.lock()?.contains(&(intent, key)))
    }

    pub fn remove(&self, intent: Intent, key: Key) -> Result<()> {
        self.pending.lock()?.remove(&(intent, key));
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.pending.lock()?.clear();
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.pending.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.pending.lock()?.is_empty())
    }
}

/// Result of one due-date scan.
#[derive(Debug, Default)]
pub struct DueDateScan {
    pub commands: Vec<Record>,
    /// Earliest due date not handled by this scan.
    pub next_due_date: Option<Timestamp>,
}

/// TRIGGER commands for timers due at `now`.
pub fn find_due_timers(
    state: &ProcessingState,
    cache: &ScheduledCommandCache,
    now: Timestamp,
    limit: usize,
) -> Result<DueDateScan> {
    let mut due = Vec::new();
    let next_due_date = state
        .timers
        .for_each_due(now, limit, |timer_key, timer| due.push((timer_key, timer)))?;

    let mut commands = Vec::with_capacity(due.len());
    for (timer_key, timer) in due {
        if cache.add(Intent::Timer(TimerIntent::Trigger), timer_key)? {
            commands.push(Record::command_with_key(timer_key, TimerIntent::Trigger, timer));
        }
    }
    Ok(DueDateScan {
        commands,
        next_due_date,
    })
}

/// TIME_OUT commands for activated jobs whose deadline passed at `now`.
pub fn find_timed_out_jobs(
    state: &ProcessingState,
    cache: &ScheduledCommandCache,
    now: Timestamp,
    limit: usize,
) -> Result<DueDateScan> {
    let mut timed_out = Vec::new();
    let next_due_date = state
        .jobs
        .for_each_timed_out(now, limit, |job_key, job| timed_out.push((job_key, job)))?;

    let mut commands = Vec::with_capacity(timed_out.len());
    for (job_key, job) in timed_out {
        if cache.add(Intent::Job(JobIntent::TimeOut), job_key)? {
            commands.push(Record::command_with_key(job_key, JobIntent::TimeOut, job));
        }
    }
    Ok(DueDateScan {
        commands,
        next_due_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::record::{JobRecord, TimerRecord};

    fn timer(element_instance_key: Key, due_date: Timestamp) -> TimerRecord {
        TimerRecord {
            element_instance_key,
            process_instance_key: 1,
            process_definition_key: 2,
            due_date,
            target_element_id: "wait".into(),
        }
    }

    #[test]
    fn test_due_timers_are_written_once_until_processed() {
        let state = ProcessingState::new(Db::in_memory().create_context(), 1);
        state.timers.put(10, &timer(5, 100)).unwrap();
        state.timers.put(11, &timer(6, 300)).unwrap();
        let cache = ScheduledCommandCache::new();

        let scan = find_due_timers(&state, &cache, 150, 10).unwrap();
        assert_eq!(scan.commands.len(), 1);
        assert_eq!(scan.commands[0].key, 10);
        assert_eq!(scan.next_due_date, Some(300));

        let again = find_due_timers(&state, &cache, 150, 10).unwrap();
        assert!(again.commands.is_empty());

        cache.remove(Intent::Timer(TimerIntent::Trigger), 10).unwrap();
        assert_eq!(find_due_timers(&state, &cache, 150, 10).unwrap().commands.len(), 1);
    }

    #[test]
    fn test_scan_limit_reports_remaining_due_date() {
        let state = ProcessingState::new(Db::in_memory().create_context(), 1);
        for key in 0..3 {
            state.timers.put(20 + key, &timer(key, 50 + key)).unwrap();
        }
        let scan = find_due_timers(&state, &ScheduledCommandCache::new(), 1_000, 2).unwrap();
        assert_eq!(scan.commands.len(), 2);
        assert_eq!(scan.next_due_date, Some(52));
    }

    #[test]
    fn test_timed_out_jobs() {
        let state = ProcessingState::new(Db::in_memory().create_context(), 1);
        let job = JobRecord {
            job_type: "pay".into(),
            retries: 3,
            ..Default::default()
        };
        state.jobs.create(7, &job).unwrap();
        state
            .jobs
            .activate(
                7,
                &JobRecord {
                    deadline: 500,
                    worker: "w".into(),
                    ..job
                },
            )
            .unwrap();

        let cache = ScheduledCommandCache::new();
        let early = find_timed_out_jobs(&state, &cache, 400, 10).unwrap();
        assert!(early.commands.is_empty());
        assert_eq!(early.next_due_date, Some(500));

        let late = find_timed_out_jobs(&state, &cache, 500, 10).unwrap();
        assert_eq!(late.commands.len(), 1);
        assert_eq!(late.commands[0].intent, Intent::Job(JobIntent::TimeOut));
        assert_eq!(late.next_due_date, None);
    }
}
