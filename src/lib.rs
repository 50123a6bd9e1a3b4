// ============================================================================
// procflow Library
// ============================================================================

//! Deterministic record processing for one partition of a process engine.
//!
//! Commands are appended to a partition log and processed one at a time, in
//! position order. Each command runs against a keyed transactional store and
//! produces follow-up events, rejections and client responses. The same log
//! replayed against a fresh store yields the same state.
//!
//! ```
//! use procflow::model::ProcessBuilder;
//! use procflow::record::{DeploymentIntent, DeploymentRecord, Record};
//! use procflow::scheduler::{ManualClock, ManualScheduler, StreamClock};
//! use procflow::{EngineConfig, StreamProcessor};
//! use std::sync::Arc;
//!
//! let clock = ManualClock::new(0);
//! let scheduler = Arc::new(ManualScheduler::new(Arc::new(clock.clone())));
//! let clock = StreamClock::new(Arc::new(clock));
//! let mut processor =
//!     StreamProcessor::open_from_config(EngineConfig::default(), clock, scheduler).unwrap();
//!
//! let process = ProcessBuilder::new("order")
//!     .start_event("start")
//!     .end_event("end")
//!     .build()
//!     .unwrap();
//! let deployment = DeploymentRecord { processes: vec![process], ..Default::default() };
//! processor
//!     .write_command(Record::command(DeploymentIntent::Create, deployment).with_request(1, 0))
//!     .unwrap();
//! processor.process_available().unwrap();
//!
//! assert_eq!(processor.query().latest_process("order").unwrap().unwrap().version, 1);
//! ```

pub mod analyzer;
pub mod config;
pub mod core;
pub mod db;
pub mod migration;
pub mod model;
pub mod processing;
pub mod record;
pub mod scheduler;
pub mod state;
pub mod stream;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use self::core::{EngineError, Key, Position, Result, Timestamp};
pub use db::{Db, DurabilityMode};
pub use record::{Intent, Record, RecordType, RejectionType, Response};
pub use stream::{
    LogStream, PartitionActor, PartitionHandle, ProcessingMetrics, QueryService, StreamProcessor,
};
