use super::clock::StreamClock;
use super::schedule_service::{ScheduleService, ScheduledTask, TaskHandle};
use crate::core::{Result, Timestamp};
use std::sync::Arc;
use tracing::{Level, event};

/// Single-flight checker for entities with a due date (timers, job deadlines).
///
/// At most one run is scheduled at any time. It targets the earliest known due
/// date, never sooner than `timer_resolution` from now. On firing, the caller
/// scans for due entities and hands back the next due date, which re-arms the
/// checker.
pub struct DueDateChecker {
    task: ScheduledTask,
    timer_resolution: i64,
    clock: StreamClock,
    scheduler: Option<Arc<dyn ScheduleService>>,
    scheduled: Option<TaskHandle>,
    next_due_date: Timestamp,
    should_reschedule: bool,
}

impl DueDateChecker {
    pub fn new(task: ScheduledTask, timer_resolution: i64, clock: StreamClock) -> Self {
        Self {
            task,
            timer_resolution: timer_resolution.max(1),
            clock,
            scheduler: None,
            scheduled: None,
            next_due_date: -1,
            should_reschedule: false,
        }
    }

    pub fn task(&self) -> ScheduledTask {
        self.task
    }

    pub fn is_checker_running(&self) -> bool {
        self.scheduled.is_some()
    }

    pub fn next_due_date(&self) -> Option<Timestamp> {
        self.scheduled.map(|_| self.next_due_date)
    }

    /// Registers a due date. Arms the checker if idle, and re-arms it when the
    /// new date is earlier than the targeted one by more than the resolution.
    pub fn schedule(&mut self, due_date: Timestamp) -> Result<()> {
        if !self.should_reschedule {
            return Ok(());
        }
        match self.scheduled {
            None => self.arm(due_date),
            Some(handle) if self.next_due_date - due_date > self.timer_resolution => {
                if let Some(scheduler) = &self.scheduler {
                    scheduler.cancel(handle)?;
                }
                self.arm(due_date)
            }
            Some(_) => Ok(()),
        }
    }

    fn arm(&mut self, due_date: Timestamp) -> Result<()> {
        let Some(scheduler) = &self.scheduler else {
            return Ok(());
        };
        let now = self.clock.millis()?;
        let delay = (due_date - now).max(self.timer_resolution);
        let handle = scheduler.run_delayed(delay, self.task)?;
        self.scheduled = Some(handle);
        self.next_due_date = due_date;
        event!(Level::TRACE, task = %self.task, due_date, delay, "due date checker armed");
        Ok(())
    }

    /// Runs a fired check. `trigger` processes everything due up to the given
    /// instant and returns the next due date, if any.
    ///
    /// A run that was superseded by an earlier one still scans; whatever it finds
    /// due is handled, and the re-arm below is a no-op while a newer run is pending.
    pub fn execute(
        &mut self,
        fired: TaskHandle,
        trigger: impl FnOnce(Timestamp) -> Result<Option<Timestamp>>,
    ) -> Result<()> {
        if self.scheduled == Some(fired) {
            self.scheduled = None;
        }
        let now = self.clock.millis()?;
        let next = trigger(now)?;
        event!(Level::DEBUG, task = %self.task, now, next = ?next, "due date check finished");
        if let Some(next) = next {
            self.schedule(next)?;
        }
        Ok(())
    }

    /// Starts checking after replay: arms an immediate check.
    pub fn on_recovered(&mut self, scheduler: Arc<dyn ScheduleService>) -> Result<()> {
        self.scheduler = Some(scheduler);
        self.should_reschedule = true;
        let now = self.clock.millis()?;
        self.schedule(now)
    }

    /// Stops re-arming and cancels the pending run.
    pub fn on_paused(&mut self) -> Result<()> {
        self.should_reschedule = false;
        if let (Some(handle), Some(scheduler)) = (self.scheduled.take(), &self.scheduler) {
            scheduler.cancel(handle)?;
        }
        Ok(())
    }

    pub fn on_resumed(&mut self) -> Result<()> {
        self.should_reschedule = true;
        if self.scheduled.is_none() {
            let now = self.clock.millis()?;
            self.schedule(now)?;
        }
        Ok(())
    }
}
