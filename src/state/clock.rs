use crate::core::{Position, Result, Timestamp};
use crate::db::{ColumnFamilies, ColumnFamily, TransactionContext};
use crate::scheduler::ClockModification;
use std::sync::Arc;

const CLOCK_KEY: u8 = 0;
const LAST_PROCESSED_KEY: u8 = 0;

/// The persisted clock modification, at most one at a time.
pub struct ClockState {
    modification: ColumnFamily<u8, ClockModification>,
}

impl ClockState {
    pub fn new(context: Arc<TransactionContext>) -> Self {
        Self {
            modification: ColumnFamily::new(context, ColumnFamilies::ClockModification),
        }
    }

    pub fn get_modification(&self) -> Result<ClockModification> {
        Ok(self.modification.get(&CLOCK_KEY)?.unwrap_or_default())
    }

    pub fn pin(&self, time: Timestamp) -> Result<()> {
        self.modification.upsert(&CLOCK_KEY, &ClockModification::Pin { time })
    }

    pub fn reset(&self) -> Result<()> {
        self.modification.delete_if_exists(&CLOCK_KEY)?;
        Ok(())
    }
}

pub struct LastProcessedPositionState {
    position: ColumnFamily<u8, i64>,
}

impl LastProcessedPositionState {
    pub fn new(context: Arc<TransactionContext>) -> Self {
        Self {
            position: ColumnFamily::new(context, ColumnFamilies::LastProcessedPosition),
        }
    }

    pub fn mark_as_processed(&self, position: Position) -> Result<()> {
        self.position.upsert(&LAST_PROCESSED_KEY, &position)
    }

    pub fn get_last_successful_processed_record_position(&self) -> Result<Position> {
        Ok(self
            .position
            .get(&LAST_PROCESSED_KEY)?
            .unwrap_or(crate::core::NO_POSITION))
    }
}
