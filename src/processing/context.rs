use super::appliers::EventAppliers;
use crate::core::{Key, Result, Timestamp};
use crate::record::{Intent, Record, RecordType, RecordValue, RejectionType, Response};
use crate::scheduler::ScheduledTask;
use crate::state::ProcessingState;

/// Everything one command produced, collected while it is processed.
#[derive(Debug, Default)]
pub struct ProcessingResultBuilder {
    pub records: Vec<Record>,
    pub response: Option<Response>,
    pub due_dates: Vec<(ScheduledTask, Timestamp)>,
}

/// What a processor sees while handling one command.
///
/// Events are applied to state the moment they are appended, so later steps of
/// the same processor observe them. Nothing reaches the log until the batch commits.
pub struct ProcessingContext<'a> {
    state: &'a ProcessingState,
    appliers: &'a EventAppliers,
    now: Timestamp,
    result: ProcessingResultBuilder,
}

impl<'a> ProcessingContext<'a> {
    pub fn new(state: &'a ProcessingState, appliers: &'a EventAppliers, now: Timestamp) -> Self {
        Self {
            state,
            appliers,
            now,
            result: ProcessingResultBuilder::default(),
        }
    }

    pub fn state(&self) -> &'a ProcessingState {
        self.state
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn next_key(&self) -> Result<Key> {
        self.state.key_generator.next_key()
    }

    pub fn append_event(
        &mut self,
        key: Key,
        intent: impl Into<Intent>,
        value: impl Into<RecordValue>,
    ) -> Result<()> {
        let mut record = Record::event(key, intent, value);
        record.timestamp = self.now;
        self.appliers.apply_state(self.state, key, record.intent, &record.value)?;
        self.result.records.push(record);
        Ok(())
    }

    /// Follow-up commands are processed later in the same batch, or by a later batch.
    pub fn append_command(
        &mut self,
        key: Key,
        intent: impl Into<Intent>,
        value: impl Into<RecordValue>,
    ) {
        let mut record = Record::command_with_key(key, intent, value);
        record.timestamp = self.now;
        self.result.records.push(record);
    }

    /// Writes a rejection for `command` and answers its request, if any.
    pub fn reject(
        &mut self,
        command: &Record,
        rejection_type: RejectionType,
        reason: impl Into<String>,
    ) {
        let mut rejection = Record::rejection(command, rejection_type, reason);
        rejection.timestamp = self.now;
        if let Some(request) = command.request {
            self.result.response = Some(Response {
                request,
                key: rejection.key,
                record_type: RecordType::CommandRejection,
                intent: rejection.intent,
                rejection_type: Some(rejection_type),
                rejection_reason: rejection.rejection_reason.clone(),
                value: rejection.value.clone(),
            });
        }
        self.result.records.push(rejection);
    }

    /// Answers the request of `command` with an event. Commands without a request get no response.
    pub fn respond(
        &mut self,
        command: &Record,
        key: Key,
        intent: impl Into<Intent>,
        value: impl Into<RecordValue>,
    ) {
        if let Some(request) = command.request {
            self.result.response = Some(Response {
                request,
                key,
                record_type: RecordType::Event,
                intent: intent.into(),
                rejection_type: None,
                rejection_reason: String::new(),
                value: value.into(),
            });
        }
    }

    /// Asks the matching due-date checker to look again at `due_date`.
    pub fn schedule_due_date(&mut self, task: ScheduledTask, due_date: Timestamp) {
        self.result.due_dates.push((task, due_date));
    }

    pub fn records(&self) -> &[Record] {
        &self.result.records
    }

    pub fn into_result(self) -> ProcessingResultBuilder {
        self.result
    }
}
