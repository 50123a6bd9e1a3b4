use super::clock::InstantSource;
use crate::core::{Result, Timestamp};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Work that can be scheduled for later on the partition's processing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScheduledTask {
    TriggerTimers,
    TimeOutJobs,
}

impl std::fmt::Display for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduledTask::TriggerTimers => write!(f, "trigger-timers"),
            ScheduledTask::TimeOutJobs => write!(f, "time-out-jobs"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskHandle {
    pub fn next() -> Self {
        TaskHandle(NEXT_TASK_ID.fetch_add(1, Ordering::SeqCst))
    }
}

/// Runs tasks after a delay. Scheduling never blocks; the task is delivered
/// back to the processing loop once the delay has passed.
pub trait ScheduleService: Send + Sync {
    fn run_delayed(&self, delay_ms: i64, task: ScheduledTask) -> Result<TaskHandle>;

    /// Best effort: a task that is already on its way may still be delivered.
    fn cancel(&self, handle: TaskHandle) -> Result<()>;
}

/// A scheduler driven by hand, for deterministic tests and embedding without a runtime.
#[derive(Clone)]
pub struct ManualScheduler {
    clock: Arc<dyn InstantSource>,
    pending: Arc<Mutex<BTreeMap<(Timestamp, TaskHandle), ScheduledTask>>>,
}

impl ManualScheduler {
    pub fn new(clock: Arc<dyn InstantSource>) -> Self {
        Self {
            clock,
            pending: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Removes and returns every task whose time has come, earliest first.
    pub fn due_tasks(&self) -> Result<Vec<(TaskHandle, ScheduledTask)>> {
        let now = self.clock.millis();
        let mut pending = self.pending.lock()?;
        let due: Vec<(Timestamp, TaskHandle)> = pending
            .keys()
            .take_while(|(due_at, _)| *due_at <= now)
            .copied()
            .collect();
        Ok(due
            .into_iter()
            .filter_map(|entry| pending.remove(&entry).map(|task| (entry.1, task)))
            .collect())
    }

    /// Pending tasks with the instant they are due at.
    pub fn pending(&self) -> Result<Vec<(Timestamp, ScheduledTask)>> {
        Ok(self
            .pending
            .lock()?
            .iter()
            .map(|((due_at, _), task)| (*due_at, *task))
            .collect())
    }
}

impl ScheduleService for ManualScheduler {
    fn run_delayed(&self, delay_ms: i64, task: ScheduledTask) -> Result<TaskHandle> {
        let handle = TaskHandle::next();
        let due_at = self.clock.millis().saturating_add(delay_ms.max(0));
        self.pending.lock()?.insert((due_at, handle), task);
        Ok(handle)
    }

    fn cancel(&self, handle: TaskHandle) -> Result<()> {
        self.pending.lock()?.retain(|(_, pending), _| *pending != handle);
        Ok(())
    }
}
