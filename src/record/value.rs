use super::intent::ValueType;
use crate::core::{Key, NO_KEY, Timestamp};
use crate::model::{BpmnElementType, ExecutableProcess};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInstanceRecord {
    pub bpmn_process_id: String,
    pub version: i32,
    pub process_definition_key: Key,
    pub process_instance_key: Key,
    pub element_id: String,
    pub bpmn_element_type: BpmnElementType,
    /// Key of the enclosing scope instance, `NO_KEY` for the process instance itself.
    pub flow_scope_key: Key,
    pub parent_process_instance_key: Key,
    pub parent_element_instance_key: Key,
}

impl ProcessInstanceRecord {
    pub fn is_process(&self) -> bool {
        self.bpmn_element_type == BpmnElementType::Process
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInstanceCreationRecord {
    pub bpmn_process_id: String,
    /// `-1` selects the latest version.
    pub version: i32,
    pub process_definition_key: Key,
    pub process_instance_key: Key,
}

impl Default for ProcessInstanceCreationRecord {
    fn default() -> Self {
        Self {
            bpmn_process_id: String::new(),
            version: -1,
            process_definition_key: NO_KEY,
            process_instance_key: NO_KEY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMetadata {
    pub bpmn_process_id: String,
    pub version: i32,
    pub process_definition_key: Key,
    pub is_duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub processes: Vec<ExecutableProcess>,
    pub process_metadata: Vec<ProcessMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub bpmn_process_id: String,
    pub version: i32,
    pub process_definition_key: Key,
    pub process: ExecutableProcess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_type: String,
    pub retries: i32,
    /// Activation deadline, `-1` while not activated.
    pub deadline: Timestamp,
    pub worker: String,
    pub error_code: String,
    pub error_message: String,
    pub bpmn_process_id: String,
    pub process_definition_key: Key,
    pub process_instance_key: Key,
    pub element_id: String,
    pub element_instance_key: Key,
}

impl Default for JobRecord {
    fn default() -> Self {
        Self {
            job_type: String::new(),
            retries: 0,
            deadline: -1,
            worker: String::new(),
            error_code: String::new(),
            error_message: String::new(),
            bpmn_process_id: String::new(),
            process_definition_key: NO_KEY,
            process_instance_key: NO_KEY,
            element_id: String::new(),
            element_instance_key: NO_KEY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobBatchRecord {
    pub job_type: String,
    pub worker: String,
    pub timeout: i64,
    pub max_jobs_to_activate: usize,
    pub job_keys: Vec<Key>,
    pub jobs: Vec<JobRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRecord {
    pub element_instance_key: Key,
    pub process_instance_key: Key,
    pub process_definition_key: Key,
    pub due_date: Timestamp,
    /// Catch event (intermediate or boundary) the timer belongs to.
    pub target_element_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalRecord {
    pub signal_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSubscriptionRecord {
    pub signal_name: String,
    pub process_definition_key: Key,
    pub bpmn_process_id: String,
    pub catch_event_id: String,
    /// Element instance that waits for the signal: the catch event, or the
    /// activity a boundary event is attached to.
    pub catch_event_instance_key: Key,
    pub process_instance_key: Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    JobNoRetries,
    UnhandledErrorEvent,
    CalledElementError,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorType::JobNoRetries => write!(f, "JOB_NO_RETRIES"),
            ErrorType::UnhandledErrorEvent => write!(f, "UNHANDLED_ERROR_EVENT"),
            ErrorType::CalledElementError => write!(f, "CALLED_ELEMENT_ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub error_type: ErrorType,
    pub error_message: String,
    pub bpmn_process_id: String,
    pub process_definition_key: Key,
    pub process_instance_key: Key,
    pub element_id: String,
    pub element_instance_key: Key,
    pub job_key: Key,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error_message: String,
    pub stacktrace: String,
    pub error_event_position: i64,
    pub process_instance_key: Key,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClockRecord {
    /// Pinned instant in epoch millis; ignored for a reset.
    pub time: Timestamp,
}

/// Typed payload of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordValue {
    ProcessInstance(ProcessInstanceRecord),
    ProcessInstanceCreation(ProcessInstanceCreationRecord),
    Deployment(DeploymentRecord),
    Process(ProcessRecord),
    Job(JobRecord),
    JobBatch(JobBatchRecord),
    Timer(TimerRecord),
    Signal(SignalRecord),
    SignalSubscription(SignalSubscriptionRecord),
    Incident(IncidentRecord),
    Error(ErrorRecord),
    Clock(ClockRecord),
}

impl RecordValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            RecordValue::ProcessInstance(_) => ValueType::ProcessInstance,
            RecordValue::ProcessInstanceCreation(_) => ValueType::ProcessInstanceCreation,
            RecordValue::Deployment(_) => ValueType::Deployment,
            RecordValue::Process(_) => ValueType::Process,
            RecordValue::Job(_) => ValueType::Job,
            RecordValue::JobBatch(_) => ValueType::JobBatch,
            RecordValue::Timer(_) => ValueType::Timer,
            RecordValue::Signal(_) => ValueType::Signal,
            RecordValue::SignalSubscription(_) => ValueType::SignalSubscription,
            RecordValue::Incident(_) => ValueType::Incident,
            RecordValue::Error(_) => ValueType::Error,
            RecordValue::Clock(_) => ValueType::Clock,
        }
    }

    /// Process instance the value belongs to, for process-instance-related values.
    pub fn process_instance_key(&self) -> Option<Key> {
        let key = match self {
            RecordValue::ProcessInstance(value) => value.process_instance_key,
            RecordValue::Job(value) => value.process_instance_key,
            RecordValue::Timer(value) => value.process_instance_key,
            RecordValue::SignalSubscription(value) => value.process_instance_key,
            RecordValue::Incident(value) => value.process_instance_key,
            RecordValue::Error(value) => value.process_instance_key,
            _ => return None,
        };
        (key != NO_KEY).then_some(key)
    }
}

macro_rules! record_value_accessors {
    ($($method:ident => $variant:ident($inner:ty)),* $(,)?) => {
        impl RecordValue {
            $(pub fn $method(&self) -> Option<&$inner> {
                match self {
                    RecordValue::$variant(value) => Some(value),
                    _ => None,
                }
            })*
        }

        $(impl From<$inner> for RecordValue {
            fn from(value: $inner) -> Self {
                RecordValue::$variant(value)
            }
        })*
    };
}

record_value_accessors!(
    as_process_instance => ProcessInstance(ProcessInstanceRecord),
    as_process_instance_creation => ProcessInstanceCreation(ProcessInstanceCreationRecord),
    as_deployment => Deployment(DeploymentRecord),
    as_process => Process(ProcessRecord),
    as_job => Job(JobRecord),
    as_job_batch => JobBatch(JobBatchRecord),
    as_timer => Timer(TimerRecord),
    as_signal => Signal(SignalRecord),
    as_signal_subscription => SignalSubscription(SignalSubscriptionRecord),
    as_incident => Incident(IncidentRecord),
    as_error => Error(ErrorRecord),
    as_clock => Clock(ClockRecord),
);
