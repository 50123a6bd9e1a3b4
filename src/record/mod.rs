//! Records of the partition log.

pub mod intent;
pub mod value;

pub use intent::{
    ClockIntent, DeploymentIntent, ErrorIntent, IncidentIntent, Intent, JobBatchIntent, JobIntent,
    ProcessInstanceCreationIntent, ProcessInstanceIntent, ProcessIntent, RecordType, RejectionType,
    SignalIntent, SignalSubscriptionIntent, TimerIntent, ValueType,
};
pub use value::{
    ClockRecord, DeploymentRecord, ErrorRecord, ErrorType, IncidentRecord, JobBatchRecord,
    JobRecord, ProcessInstanceCreationRecord, ProcessInstanceRecord, ProcessMetadata, ProcessRecord,
    RecordValue, SignalRecord, SignalSubscriptionRecord, TimerRecord,
};

use crate::core::{Key, NO_KEY, NO_POSITION, PartitionId, Position, Timestamp};
use serde::{Deserialize, Serialize};

/// Identifies the client request a command came from; only such commands get responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub request_id: i64,
    pub request_stream_id: i32,
}

/// Immutable envelope around a record value. Positions and timestamps are
/// assigned by the log when the record is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub position: Position,
    pub source_record_position: Position,
    pub key: Key,
    pub timestamp: Timestamp,
    pub partition_id: PartitionId,
    pub record_type: RecordType,
    pub intent: Intent,
    pub rejection_type: Option<RejectionType>,
    pub rejection_reason: String,
    pub request: Option<RequestMetadata>,
    /// Set on follow-up commands that were already processed in the batch that wrote them.
    pub processed: bool,
    pub value: RecordValue,
}

impl Record {
    fn unwritten(record_type: RecordType, key: Key, intent: Intent, value: RecordValue) -> Self {
        Self {
            position: NO_POSITION,
            source_record_position: NO_POSITION,
            key,
            timestamp: -1,
            partition_id: 0,
            record_type,
            intent,
            rejection_type: None,
            rejection_reason: String::new(),
            request: None,
            processed: false,
            value,
        }
    }

    pub fn command(intent: impl Into<Intent>, value: impl Into<RecordValue>) -> Self {
        Self::unwritten(RecordType::Command, NO_KEY, intent.into(), value.into())
    }

    pub fn command_with_key(
        key: Key,
        intent: impl Into<Intent>,
        value: impl Into<RecordValue>,
    ) -> Self {
        Self::unwritten(RecordType::Command, key, intent.into(), value.into())
    }

    pub fn event(key: Key, intent: impl Into<Intent>, value: impl Into<RecordValue>) -> Self {
        Self::unwritten(RecordType::Event, key, intent.into(), value.into())
    }

    pub fn rejection(
        command: &Record,
        rejection_type: RejectionType,
        reason: impl Into<String>,
    ) -> Self {
        let mut record = Self::unwritten(
            RecordType::CommandRejection,
            command.key,
            command.intent,
            command.value.clone(),
        );
        record.rejection_type = Some(rejection_type);
        record.rejection_reason = reason.into();
        record.request = command.request;
        record
    }

    pub fn with_request(mut self, request_id: i64, request_stream_id: i32) -> Self {
        self.request = Some(RequestMetadata {
            request_id,
            request_stream_id,
        });
        self
    }

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    pub fn is_command(&self) -> bool {
        self.record_type == RecordType::Command
    }

    pub fn is_event(&self) -> bool {
        self.record_type == RecordType::Event
    }

    pub fn is_rejection(&self) -> bool {
        self.record_type == RecordType::CommandRejection
    }

    pub fn has_request(&self) -> bool {
        self.request.is_some()
    }

    pub fn process_instance_key(&self) -> Option<Key> {
        self.value.process_instance_key()
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} key={} position={} source={}",
            self.record_type, self.intent, self.key, self.position, self.source_record_position
        )?;
        if let Some(rejection_type) = self.rejection_type {
            write!(f, " rejection={} '{}'", rejection_type, self.rejection_reason)?;
        }
        Ok(())
    }
}

/// Reply to the client that sent a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub request: RequestMetadata,
    pub key: Key,
    pub record_type: RecordType,
    pub intent: Intent,
    pub rejection_type: Option<RejectionType>,
    pub rejection_reason: String,
    pub value: RecordValue,
}
