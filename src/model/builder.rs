use super::element::{BpmnElementType, EventDefinition, ExecutableElement, SequenceFlow};
use super::process::ExecutableProcess;
use crate::core::Result;

/// Fluent builder for process models.
///
/// Elements added one after another are connected with sequence flows. Boundary
/// events and event sub-processes start a new, unconnected path; `move_to` and
/// `connect_to` continue from or link to an existing element.
///
/// ```
/// use procflow::model::ProcessBuilder;
///
/// let process = ProcessBuilder::new("order")
///     .start_event("start")
///     .service_task("collect", "payment")
///     .end_event("end")
///     .build()
///     .unwrap();
/// assert_eq!(process.outgoing_flows("start").len(), 1);
/// ```
pub struct ProcessBuilder {
    process: ExecutableProcess,
    scope: String,
    last: Option<String>,
    flow_counter: usize,
}

impl ProcessBuilder {
    pub fn new(bpmn_process_id: impl Into<String>) -> Self {
        let process = ExecutableProcess::new(bpmn_process_id);
        let scope = process.bpmn_process_id.clone();
        Self {
            process,
            scope,
            last: None,
            flow_counter: 0,
        }
    }

    fn add(mut self, mut element: ExecutableElement, connect: bool) -> Self {
        element.flow_scope = Some(self.scope.clone());
        let id = element.id.clone();
        self.process.elements.insert(id.clone(), element);
        if connect {
            if let Some(source) = self.last.clone() {
                self = self.flow(&source, &id);
            }
        }
        self.last = Some(id);
        self
    }

    fn flow(mut self, source: &str, target: &str) -> Self {
        self.flow_counter += 1;
        let id = format!("flow_{}", self.flow_counter);
        if let Some(element) = self.process.elements.get_mut(source) {
            element.outgoing.push(id.clone());
        }
        if let Some(element) = self.process.elements.get_mut(target) {
            element.incoming.push(id.clone());
        }
        self.process.sequence_flows.insert(
            id.clone(),
            SequenceFlow {
                id,
                source: source.to_string(),
                target: target.to_string(),
            },
        );
        self
    }

    fn nested(
        mut self,
        id: &str,
        element_type: BpmnElementType,
        connect: bool,
        build: impl FnOnce(ProcessBuilder) -> ProcessBuilder,
    ) -> Self {
        let previous_last = self.last.clone();
        self = self.add(ExecutableElement::new(id, element_type), connect);
        let outer_scope = std::mem::replace(&mut self.scope, id.to_string());
        self.last = None;
        let mut built = build(self);
        built.scope = outer_scope;
        built.last = if connect { Some(id.to_string()) } else { previous_last };
        built
    }

    pub fn start_event(self, id: &str) -> Self {
        self.add(ExecutableElement::new(id, BpmnElementType::StartEvent), true)
    }

    /// Start event of an event sub-process, catching errors with `code` (empty catches all).
    pub fn error_start_event(self, id: &str, code: &str) -> Self {
        let mut element = ExecutableElement::new(id, BpmnElementType::StartEvent);
        element.event_definition = EventDefinition::Error { code: code.to_string() };
        self.add(element, false)
    }

    pub fn end_event(self, id: &str) -> Self {
        self.add(ExecutableElement::new(id, BpmnElementType::EndEvent), true)
    }

    pub fn error_end_event(self, id: &str, code: &str) -> Self {
        let mut element = ExecutableElement::new(id, BpmnElementType::EndEvent);
        element.event_definition = EventDefinition::Error { code: code.to_string() };
        self.add(element, true)
    }

    pub fn service_task(self, id: &str, job_type: &str) -> Self {
        self.service_task_with_retries(id, job_type, 3)
    }

    pub fn service_task_with_retries(self, id: &str, job_type: &str, retries: i32) -> Self {
        let mut element = ExecutableElement::new(id, BpmnElementType::ServiceTask);
        element.job_type = Some(job_type.to_string());
        element.job_retries = retries;
        self.add(element, true)
    }

    pub fn call_activity(self, id: &str, called_process_id: &str) -> Self {
        let mut element = ExecutableElement::new(id, BpmnElementType::CallActivity);
        element.called_process_id = Some(called_process_id.to_string());
        self.add(element, true)
    }

    pub fn timer_catch_event(self, id: &str, duration_ms: i64) -> Self {
        let mut element = ExecutableElement::new(id, BpmnElementType::IntermediateCatchEvent);
        element.event_definition = EventDefinition::Timer { duration_ms };
        self.add(element, true)
    }

    pub fn signal_catch_event(self, id: &str, signal_name: &str) -> Self {
        let mut element = ExecutableElement::new(id, BpmnElementType::IntermediateCatchEvent);
        element.event_definition = EventDefinition::Signal {
            name: signal_name.to_string(),
        };
        self.add(element, true)
    }

    pub fn sub_process(
        self,
        id: &str,
        build: impl FnOnce(ProcessBuilder) -> ProcessBuilder,
    ) -> Self {
        self.nested(id, BpmnElementType::SubProcess, true, build)
    }

    /// Adds an event sub-process to the current scope. The current path is left untouched.
    pub fn event_sub_process(
        self,
        id: &str,
        build: impl FnOnce(ProcessBuilder) -> ProcessBuilder,
    ) -> Self {
        self.nested(id, BpmnElementType::EventSubProcess, false, build)
    }

    fn boundary_event(mut self, id: &str, attached_to: &str, definition: EventDefinition) -> Self {
        let scope = self
            .process
            .elements
            .get(attached_to)
            .and_then(|element| element.flow_scope.clone())
            .unwrap_or_else(|| self.scope.clone());
        let mut element = ExecutableElement::new(id, BpmnElementType::BoundaryEvent);
        element.attached_to = Some(attached_to.to_string());
        element.event_definition = definition;
        let outer_scope = std::mem::replace(&mut self.scope, scope);
        let mut built = self.add(element, false);
        built.scope = outer_scope;
        built
    }

    pub fn boundary_error_event(self, id: &str, attached_to: &str, code: &str) -> Self {
        self.boundary_event(id, attached_to, EventDefinition::Error { code: code.to_string() })
    }

    pub fn boundary_timer_event(self, id: &str, attached_to: &str, duration_ms: i64) -> Self {
        self.boundary_event(id, attached_to, EventDefinition::Timer { duration_ms })
    }

    pub fn boundary_signal_event(self, id: &str, attached_to: &str, signal_name: &str) -> Self {
        self.boundary_event(
            id,
            attached_to,
            EventDefinition::Signal {
                name: signal_name.to_string(),
            },
        )
    }

    /// Continues the path from an existing element.
    pub fn move_to(mut self, id: &str) -> Self {
        self.last = Some(id.to_string());
        self
    }

    /// Connects the current element to an existing one and continues from there.
    pub fn connect_to(mut self, id: &str) -> Self {
        if let Some(source) = self.last.clone() {
            self = self.flow(&source, id);
        }
        self.last = Some(id.to_string());
        self
    }

    pub fn build(self) -> Result<ExecutableProcess> {
        self.process.validate()?;
        Ok(self.process)
    }
}
