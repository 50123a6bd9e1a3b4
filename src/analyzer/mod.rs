//! Read-only analysis over element instance and process state.

pub mod catch_event;

pub use catch_event::{CatchEventAnalyzer, CatchEventTuple};
