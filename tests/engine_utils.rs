#![allow(dead_code)]

use procflow::core::{Key, NO_KEY, Timestamp};
use procflow::model::{BpmnElementType, ExecutableProcess};
use procflow::record::{
    DeploymentIntent, DeploymentRecord, Intent, JobBatchIntent, JobBatchRecord, JobIntent,
    JobRecord, ProcessInstanceCreationIntent, ProcessInstanceCreationRecord, ProcessInstanceIntent,
    ProcessInstanceRecord, Record, RecordType, Response, SignalIntent, SignalRecord,
};
use procflow::scheduler::{ManualClock, ManualScheduler, StreamClock};
use procflow::stream::LogStream;
use procflow::{Db, EngineConfig, StreamProcessor};
use std::sync::Arc;

pub const START_TIME: Timestamp = 1_700_000_000_000;

/// A stream processor driven by hand: manual clock, manual scheduler, and a
/// counter for request ids.
pub struct TestEngine {
    pub clock: ManualClock,
    pub scheduler: ManualScheduler,
    pub processor: StreamProcessor,
    next_request_id: i64,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let log = LogStream::in_memory(config.partition_id);
        Self::open(config, Db::in_memory(), log, ManualClock::new(START_TIME))
    }

    pub fn open(config: EngineConfig, db: Db, log: LogStream, clock: ManualClock) -> Self {
        let scheduler = ManualScheduler::new(Arc::new(clock.clone()));
        let processor = StreamProcessor::open(
            config,
            db,
            log,
            StreamClock::new(Arc::new(clock.clone())),
            Arc::new(scheduler.clone()),
        )
        .unwrap();
        Self {
            clock,
            scheduler,
            processor,
            next_request_id: 1,
        }
    }

    /// Opens a second processor over the same log and a fresh, empty store.
    pub fn replay_into_fresh_store(&self) -> TestEngine {
        TestEngine::open(
            self.processor.config().clone(),
            Db::in_memory(),
            self.processor.log().clone(),
            ManualClock::new(self.clock_now()),
        )
    }

    pub fn clock_now(&self) -> Timestamp {
        use procflow::scheduler::InstantSource;
        self.clock.millis()
    }

    /// Writes the command as a client request, processes everything and returns its response.
    pub fn execute(&mut self, command: Record) -> Response {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.processor.write_command(command.with_request(request_id, 1)).unwrap();
        self.processor.process_available().unwrap();
        self.processor
            .take_responses()
            .into_iter()
            .find(|response| response.request.request_id == request_id)
            .expect("command got no response")
    }

    pub fn deploy(&mut self, process: ExecutableProcess) -> Response {
        let response = self.execute(Record::command(
            DeploymentIntent::Create,
            DeploymentRecord {
                processes: vec![process],
                ..Default::default()
            },
        ));
        assert_eq!(response.record_type, RecordType::Event, "{}", response.rejection_reason);
        response
    }

    /// Creates an instance of the latest version and returns the process instance key.
    pub fn create_instance(&mut self, bpmn_process_id: &str) -> Key {
        let response = self.execute(Record::command(
            ProcessInstanceCreationIntent::Create,
            ProcessInstanceCreationRecord {
                bpmn_process_id: bpmn_process_id.into(),
                ..Default::default()
            },
        ));
        assert_eq!(response.record_type, RecordType::Event, "{}", response.rejection_reason);
        response.key
    }

    pub fn cancel(&mut self, process_instance_key: Key) -> Response {
        self.execute(Record::command_with_key(
            process_instance_key,
            ProcessInstanceIntent::Cancel,
            process_record(process_instance_key),
        ))
    }

    pub fn activate_jobs(&mut self, job_type: &str, timeout: i64) -> JobBatchRecord {
        let response = self.execute(Record::command(
            JobBatchIntent::Activate,
            JobBatchRecord {
                job_type: job_type.into(),
                worker: "test-worker".into(),
                timeout,
                max_jobs_to_activate: 10,
                ..Default::default()
            },
        ));
        response.value.as_job_batch().cloned().expect("job batch response")
    }

    pub fn job_command(&mut self, job_key: Key, intent: JobIntent, job: JobRecord) -> Response {
        self.execute(Record::command_with_key(job_key, intent, job))
    }

    pub fn broadcast(&mut self, signal_name: &str) -> Response {
        self.execute(Record::command(
            SignalIntent::Broadcast,
            SignalRecord {
                signal_name: signal_name.into(),
            },
        ))
    }

    /// Moves the clock forward, runs every due-date check that became due and
    /// processes the commands they wrote.
    pub fn advance_time(&mut self, millis: i64) {
        self.clock.advance(millis);
        for (handle, task) in self.scheduler.due_tasks().unwrap() {
            self.processor.run_scheduled_task(task, handle).unwrap();
        }
        self.processor.process_available().unwrap();
    }

    pub fn records(&self) -> Vec<Record> {
        self.processor.log().records().unwrap()
    }

    pub fn events_with(&self, intent: impl Into<Intent>) -> Vec<Record> {
        let intent = intent.into();
        self.records()
            .into_iter()
            .filter(|record| record.is_event() && record.intent == intent)
            .collect()
    }

    /// Key of the first activation of `element_id` within the process instance.
    pub fn element_instance_key(&self, process_instance_key: Key, element_id: &str) -> Option<Key> {
        self.events_with(ProcessInstanceIntent::ElementActivated)
            .into_iter()
            .find(|record| {
                record
                    .value
                    .as_process_instance()
                    .is_some_and(|value| {
                        value.process_instance_key == process_instance_key
                            && value.element_id == element_id
                    })
            })
            .map(|record| record.key)
    }

    pub fn has_completed(&self, element_instance_key: Key) -> bool {
        self.events_with(ProcessInstanceIntent::ElementCompleted)
            .iter()
            .any(|record| record.key == element_instance_key)
    }

    pub fn has_terminated(&self, element_instance_key: Key) -> bool {
        self.events_with(ProcessInstanceIntent::ElementTerminated)
            .iter()
            .any(|record| record.key == element_instance_key)
    }
}

/// Value of a command addressed to the process instance itself.
pub fn process_record(process_instance_key: Key) -> ProcessInstanceRecord {
    ProcessInstanceRecord {
        bpmn_process_id: String::new(),
        version: -1,
        process_definition_key: NO_KEY,
        process_instance_key,
        element_id: String::new(),
        bpmn_element_type: BpmnElementType::Process,
        flow_scope_key: NO_KEY,
        parent_process_instance_key: NO_KEY,
        parent_element_instance_key: NO_KEY,
    }
}
