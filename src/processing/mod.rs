//! Command processing: processors, event appliers and BPMN element behavior.

pub mod appliers;
pub mod bpmn;
pub mod clock;
pub mod context;
pub mod creation;
pub mod deployment;
pub mod due_date;
pub mod error;
pub mod incident;
pub mod job;
pub mod process_instance;
pub mod registry;
pub mod signal;
pub mod timer;

pub use appliers::{EventApplier, EventAppliers};
pub use context::{ProcessingContext, ProcessingResultBuilder};
pub use due_date::{DueDateScan, ScheduledCommandCache, find_due_timers, find_timed_out_jobs};
pub use error::{ProcessingError, ProcessingResult};
pub use registry::{ProcessorRegistry, TypedRecordProcessor};
