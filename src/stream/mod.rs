//! The partition log and everything that reads from or writes to it.

pub mod actor;
pub mod log;
pub mod metrics;
pub mod processor;
pub mod query;

pub use actor::{ActorScheduler, PartitionActor, PartitionHandle};
pub use self::log::{LOG_FILE_NAME, LogStream};
pub use metrics::ProcessingMetrics;
pub use processor::{Phase, StreamProcessor};
pub use query::QueryService;

use crate::config::EngineConfig;
use crate::core::Result;
use crate::db::Db;
use std::path::{Path, PathBuf};

/// Subdirectory of the data directory holding the state snapshot and WAL.
pub const STATE_DIR: &str = "state";
/// Subdirectory of the data directory holding the partition log.
pub const LOG_DIR: &str = "log";

pub fn state_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(STATE_DIR)
}

pub fn log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(LOG_DIR)
}

/// Opens the state store and the log of the configured partition, in memory
/// when no data directory is set.
pub fn open_storage(config: &EngineConfig) -> Result<(Db, LogStream)> {
    match &config.data_dir {
        Some(data_dir) => {
            let db = Db::open(state_dir(data_dir), config.durability, config.checkpoint_threshold)?;
            let log = LogStream::open(log_dir(data_dir), config.partition_id, config.durability)?;
            Ok((db, log))
        }
        None => Ok((Db::in_memory(), LogStream::in_memory(config.partition_id))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_storage_layout_below_data_dir() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::new(2).data_dir(dir.path());
        let (_db, log) = open_storage(&config).unwrap();

        assert_eq!(log.partition_id().unwrap(), 2);
        assert_eq!(log.path().unwrap(), Some(log_dir(dir.path()).join(LOG_FILE_NAME)));
    }
}
