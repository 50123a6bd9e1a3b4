use serde::{Deserialize, Serialize};

/// In-memory counters of one partition's stream processor. Not persisted; the
/// banned-instance count is rebuilt from state when the processor opens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    /// Commands handed to a processor, follow-ups of a batch included
    pub processed_commands: u64,
    /// Commands dropped without a processor run (banned instance, no processor)
    pub skipped_commands: u64,
    /// Rejection records written
    pub rejections: u64,
    /// Commands whose processing failed with an unexpected error
    pub processing_errors: u64,
    pub banned_instances: u64,
    /// Batches committed, the initial command counts once
    pub batches: u64,
    pub replayed_events: u64,
}

impl ProcessingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_serialize_as_flat_object() {
        let metrics = ProcessingMetrics {
            processed_commands: 3,
            banned_instances: 1,
            ..Default::default()
        };
        let json: serde_json::Value = serde_json::from_str(&metrics.to_json().unwrap()).unwrap();
        assert_eq!(json["processed_commands"], 3);
        assert_eq!(json["banned_instances"], 1);
        assert_eq!(json["rejections"], 0);
    }
}
