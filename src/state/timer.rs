use crate::core::{Key, Result, Timestamp};
use crate::db::{ColumnFamilies, ColumnFamily, DbNil, TransactionContext};
use crate::record::TimerRecord;
use std::sync::Arc;

pub struct TimerState {
    timers: ColumnFamily<(i64, i64), TimerRecord>,
    due_dates: ColumnFamily<(i64, i64, i64), DbNil>,
}

impl TimerState {
    pub fn new(context: Arc<TransactionContext>) -> Self {
        Self {
            timers: ColumnFamily::new(Arc::clone(&context), ColumnFamilies::Timers),
            due_dates: ColumnFamily::new(context, ColumnFamilies::TimerDueDates),
        }
    }

    pub fn put(&self, timer_key: Key, timer: &TimerRecord) -> Result<()> {
        self.timers.upsert(&(timer.element_instance_key, timer_key), timer)?;
        self.due_dates
            .upsert(&(timer.due_date, timer.element_instance_key, timer_key), &DbNil)
    }

    pub fn get(&self, element_instance_key: Key, timer_key: Key) -> Result<Option<TimerRecord>> {
        self.timers.get(&(element_instance_key, timer_key))
    }

    pub fn remove(&self, timer_key: Key, timer: &TimerRecord) -> Result<()> {
        self.timers.delete_if_exists(&(timer.element_instance_key, timer_key))?;
        self.due_dates
            .delete_if_exists(&(timer.due_date, timer.element_instance_key, timer_key))?;
        Ok(())
    }

    /// Timers waiting on an element instance, in timer key order.
    pub fn timers_of_element_instance(
        &self,
        element_instance_key: Key,
    ) -> Result<Vec<(Key, TimerRecord)>> {
        Ok(self
            .timers
            .entries_with_prefix(&element_instance_key)?
            .into_iter()
            .map(|((_, timer_key), timer)| (timer_key, timer))
            .collect())
    }

    /// Visits timers due at or before `now` in due-date order, at most `limit` of them.
    /// Returns the next due date after the visited ones, or `None` if there is none.
    pub fn for_each_due(
        &self,
        now: Timestamp,
        limit: usize,
        mut visitor: impl FnMut(Key, TimerRecord),
    ) -> Result<Option<Timestamp>> {
        let mut visited = 0;
        for ((due_date, element_instance_key, timer_key), _) in self.due_dates.entries()? {
            if due_date > now || visited >= limit {
                return Ok(Some(due_date));
            }
            if let Some(timer) = self.timers.get(&(element_instance_key, timer_key))? {
                visitor(timer_key, timer);
                visited += 1;
            }
        }
        Ok(None)
    }

    pub fn count(&self) -> Result<usize> {
        self.timers.count()
    }
}
