use crate::core::{EngineError, PartitionId, Result};
use crate::db::DurabilityMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Partition engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Partition this engine processes; keys it generates carry this id
    pub partition_id: PartitionId,

    /// Upper bound of commands handled in one batch (the initial command included)
    pub max_commands_in_batch: usize,

    /// Minimal delay between two due-date checks, in milliseconds
    pub timer_resolution_ms: i64,

    /// Maximum number of due timers or jobs one check turns into commands
    pub due_date_scan_limit: usize,

    /// How state commits reach the disk
    pub durability: DurabilityMode,

    /// WAL entries written before the state is snapshotted
    pub checkpoint_threshold: usize,

    /// Directory for the state and the log; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
}

impl EngineConfig {
    pub fn new(partition_id: PartitionId) -> Self {
        Self {
            partition_id,
            max_commands_in_batch: 100,
            timer_resolution_ms: 100,
            due_date_scan_limit: 1000,
            durability: DurabilityMode::Sync,
            checkpoint_threshold: 1000,
            data_dir: None,
        }
    }

    /// Set the maximum batch size
    pub fn max_commands_in_batch(mut self, max: usize) -> Self {
        self.max_commands_in_batch = max;
        self
    }

    /// Set the timer resolution
    pub fn timer_resolution_ms(mut self, resolution: i64) -> Self {
        self.timer_resolution_ms = resolution;
        self
    }

    /// Set the due-date scan limit
    pub fn due_date_scan_limit(mut self, limit: usize) -> Self {
        self.due_date_scan_limit = limit;
        self
    }

    /// Set the durability mode
    pub fn durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    /// Set the checkpoint threshold
    pub fn checkpoint_threshold(mut self, threshold: usize) -> Self {
        self.checkpoint_threshold = threshold;
        self
    }

    /// Persist state and log below `dir`
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.data_dir.is_some() && self.durability != DurabilityMode::None
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_commands_in_batch == 0 {
            return Err(EngineError::Config("max_commands_in_batch must be > 0".to_string()));
        }
        if self.timer_resolution_ms <= 0 {
            return Err(EngineError::Config("timer_resolution_ms must be > 0".to_string()));
        }
        if self.due_date_scan_limit == 0 {
            return Err(EngineError::Config("due_date_scan_limit must be > 0".to_string()));
        }
        if self.checkpoint_threshold == 0 {
            return Err(EngineError::Config("checkpoint_threshold must be > 0".to_string()));
        }
        if self.partition_id as i64 >= 1 << (63 - crate::core::KEY_BITS) {
            return Err(EngineError::Config(format!(
                "partition_id {} does not fit into a key",
                self.partition_id
            )));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.partition_id, 1);
        assert_eq!(config.max_commands_in_batch, 100);
        assert_eq!(config.timer_resolution_ms, 100);
        assert_eq!(config.due_date_scan_limit, 1000);
        assert_eq!(config.checkpoint_threshold, 1000);
        assert!(!config.is_persistent());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = EngineConfig::new(3)
            .max_commands_in_batch(1)
            .timer_resolution_ms(10)
            .data_dir("/tmp/partition-3");

        assert_eq!(config.partition_id, 3);
        assert_eq!(config.max_commands_in_batch, 1);
        assert_eq!(config.timer_resolution_ms, 10);
        assert!(config.is_persistent());
    }

    #[test]
    fn test_validate() {
        assert!(EngineConfig::default().max_commands_in_batch(0).validate().is_err());
        assert!(EngineConfig::default().timer_resolution_ms(0).validate().is_err());
        assert!(EngineConfig::new(5000).validate().is_err());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"partition_id": 2, "timer_resolution_ms": 50}"#).unwrap();
        assert_eq!(config.partition_id, 2);
        assert_eq!(config.timer_resolution_ms, 50);
        assert_eq!(config.max_commands_in_batch, 100);
        assert_eq!(config.durability, DurabilityMode::Sync);
    }
}
