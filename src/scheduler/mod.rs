//! Time and delayed work: the stream clock, schedule services and the due-date checker.

pub mod clock;
pub mod due_date;
pub mod schedule_service;

pub use clock::{ClockModification, InstantSource, ManualClock, StreamClock, SystemClock};
pub use due_date::DueDateChecker;
pub use schedule_service::{ManualScheduler, ScheduleService, ScheduledTask, TaskHandle};
