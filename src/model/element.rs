use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BpmnElementType {
    Process,
    SubProcess,
    EventSubProcess,
    StartEvent,
    EndEvent,
    ServiceTask,
    CallActivity,
    IntermediateCatchEvent,
    BoundaryEvent,
    SequenceFlow,
}

impl BpmnElementType {
    /// Elements that contain other elements and complete once their content is done.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            BpmnElementType::Process
                | BpmnElementType::SubProcess
                | BpmnElementType::EventSubProcess
        )
    }

    /// Elements that may carry boundary events.
    pub fn is_activity(self) -> bool {
        matches!(
            self,
            BpmnElementType::SubProcess
                | BpmnElementType::ServiceTask
                | BpmnElementType::CallActivity
        )
    }
}

impl std::fmt::Display for BpmnElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BpmnElementType::Process => "PROCESS",
            BpmnElementType::SubProcess => "SUB_PROCESS",
            BpmnElementType::EventSubProcess => "EVENT_SUB_PROCESS",
            BpmnElementType::StartEvent => "START_EVENT",
            BpmnElementType::EndEvent => "END_EVENT",
            BpmnElementType::ServiceTask => "SERVICE_TASK",
            BpmnElementType::CallActivity => "CALL_ACTIVITY",
            BpmnElementType::IntermediateCatchEvent => "INTERMEDIATE_CATCH_EVENT",
            BpmnElementType::BoundaryEvent => "BOUNDARY_EVENT",
            BpmnElementType::SequenceFlow => "SEQUENCE_FLOW",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EventDefinition {
    #[default]
    None,
    /// An empty code catches every error.
    Error { code: String },
    Timer { duration_ms: i64 },
    Signal { name: String },
}

impl EventDefinition {
    pub fn is_none(&self) -> bool {
        matches!(self, EventDefinition::None)
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            EventDefinition::Error { code } => Some(code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableElement {
    pub id: String,
    pub element_type: BpmnElementType,
    /// Id of the enclosing container; `None` only for the process element itself.
    pub flow_scope: Option<String>,
    pub incoming: Vec<String>,
    pub outgoing: Vec<String>,
    pub event_definition: EventDefinition,
    /// Activity a boundary event is attached to.
    pub attached_to: Option<String>,
    pub interrupting: bool,
    pub job_type: Option<String>,
    pub job_retries: i32,
    pub called_process_id: Option<String>,
}

impl ExecutableElement {
    pub fn new(id: impl Into<String>, element_type: BpmnElementType) -> Self {
        Self {
            id: id.into(),
            element_type,
            flow_scope: None,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            event_definition: EventDefinition::None,
            attached_to: None,
            interrupting: true,
            job_type: None,
            job_retries: 3,
            called_process_id: None,
        }
    }

    pub fn is_none_start_event(&self) -> bool {
        self.element_type == BpmnElementType::StartEvent && self.event_definition.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFlow {
    pub id: String,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchEventKind {
    /// Boundary event attached to the scope's activity.
    Boundary,
    /// Start event of an event sub-process nested directly in the scope.
    EventSubProcessStart { event_sub_process: String },
}

/// An event that can intercept an error, timer or signal within a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableCatchEvent {
    pub id: String,
    pub kind: CatchEventKind,
    pub event_definition: EventDefinition,
    pub interrupting: bool,
}

impl ExecutableCatchEvent {
    pub fn is_error(&self) -> bool {
        self.event_definition.error_code().is_some()
    }

    pub fn is_catch_all_error(&self) -> bool {
        self.event_definition.error_code() == Some("")
    }

    pub fn catches_error(&self, code: &str) -> bool {
        self.event_definition.error_code() == Some(code)
    }

    /// Element activated when the event triggers.
    pub fn target_element_id(&self) -> &str {
        match &self.kind {
            CatchEventKind::Boundary => &self.id,
            CatchEventKind::EventSubProcessStart { event_sub_process } => event_sub_process,
        }
    }
}
