use super::element::{
    BpmnElementType, CatchEventKind, EventDefinition, ExecutableCatchEvent, ExecutableElement,
    SequenceFlow,
};
use crate::core::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An already parsed, immutable process definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableProcess {
    pub bpmn_process_id: String,
    pub elements: BTreeMap<String, ExecutableElement>,
    pub sequence_flows: BTreeMap<String, SequenceFlow>,
}

impl ExecutableProcess {
    pub fn new(bpmn_process_id: impl Into<String>) -> Self {
        let bpmn_process_id = bpmn_process_id.into();
        let mut elements = BTreeMap::new();
        elements.insert(
            bpmn_process_id.clone(),
            ExecutableElement::new(bpmn_process_id.clone(), BpmnElementType::Process),
        );
        Self {
            bpmn_process_id,
            elements,
            sequence_flows: BTreeMap::new(),
        }
    }

    pub fn element(&self, id: &str) -> Option<&ExecutableElement> {
        self.elements.get(id)
    }

    /// Looks up an element that state refers to; a miss means corrupted state.
    pub fn element_by_id_and_type(
        &self,
        id: &str,
        element_type: BpmnElementType,
    ) -> Result<&ExecutableElement> {
        match self.elements.get(id) {
            Some(element) if element.element_type == element_type => Ok(element),
            Some(element) => Err(EngineError::illegal_state(format!(
                "Expected element '{}' of process '{}' to be of type {}, but it is {}",
                id, self.bpmn_process_id, element_type, element.element_type
            ))),
            None => Err(EngineError::illegal_state(format!(
                "Expected process '{}' to contain element '{}', but it does not",
                self.bpmn_process_id, id
            ))),
        }
    }

    pub fn sequence_flow(&self, id: &str) -> Option<&SequenceFlow> {
        self.sequence_flows.get(id)
    }

    pub fn outgoing_flows(&self, element_id: &str) -> Vec<&SequenceFlow> {
        self.elements
            .get(element_id)
            .map(|element| {
                element
                    .outgoing
                    .iter()
                    .filter_map(|flow_id| self.sequence_flows.get(flow_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Elements whose flow scope is `scope_id`, in id order.
    pub fn children_of<'a, 'b>(
        &'a self,
        scope_id: &'b str,
    ) -> impl Iterator<Item = &'a ExecutableElement> + 'b
    where
        'a: 'b,
    {
        self.elements
            .values()
            .filter(move |element| element.flow_scope.as_deref() == Some(scope_id))
    }

    pub fn none_start_event(&self, scope_id: &str) -> Option<&ExecutableElement> {
        self.children_of(scope_id)
            .find(|element| element.is_none_start_event())
    }

    /// The triggering start event of an event sub-process.
    pub fn event_sub_process_start(
        &self,
        event_sub_process_id: &str,
    ) -> Option<&ExecutableElement> {
        self.children_of(event_sub_process_id)
            .find(|element| element.element_type == BpmnElementType::StartEvent)
    }

    pub fn boundary_events(&self, activity_id: &str) -> Vec<&ExecutableElement> {
        self.elements
            .values()
            .filter(|element| {
                element.element_type == BpmnElementType::BoundaryEvent
                    && element.attached_to.as_deref() == Some(activity_id)
            })
            .collect()
    }

    /// Catch events of the scope entered by `element_id`: boundary events attached to
    /// it, then the start events of event sub-processes nested directly inside it.
    pub fn catch_events(&self, element_id: &str) -> Vec<ExecutableCatchEvent> {
        let mut events: Vec<ExecutableCatchEvent> = self
            .boundary_events(element_id)
            .into_iter()
            .map(|boundary| ExecutableCatchEvent {
                id: boundary.id.clone(),
                kind: CatchEventKind::Boundary,
                event_definition: boundary.event_definition.clone(),
                interrupting: boundary.interrupting,
            })
            .collect();

        let is_container = self
            .elements
            .get(element_id)
            .is_some_and(|element| element.element_type.is_container());
        if is_container {
            for event_sub_process in self
                .children_of(element_id)
                .filter(|child| child.element_type == BpmnElementType::EventSubProcess)
            {
                if let Some(start) = self.event_sub_process_start(&event_sub_process.id) {
                    events.push(ExecutableCatchEvent {
                        id: start.id.clone(),
                        kind: CatchEventKind::EventSubProcessStart {
                            event_sub_process: event_sub_process.id.clone(),
                        },
                        event_definition: start.event_definition.clone(),
                        interrupting: start.interrupting,
                    });
                }
            }
        }
        events
    }

    /// Error catch event of the scope for `code`. An exact code match wins over a catch-all.
    pub fn error_catch_event(&self, element_id: &str, code: &str) -> Option<ExecutableCatchEvent> {
        let events = self.catch_events(element_id);
        if let Some(exact) = events.iter().find(|event| event.catches_error(code)) {
            return Some(exact.clone());
        }
        events.into_iter().find(|event| event.is_catch_all_error())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| {
            EngineError::InvalidModel(format!("{}: {}", self.bpmn_process_id, message))
        };

        for flow in self.sequence_flows.values() {
            let source = self
                .elements
                .get(&flow.source)
                .ok_or_else(|| {
                    invalid(format!(
                        "sequence flow '{}' has unknown source '{}'",
                        flow.id, flow.source
                    ))
                })?;
            let target = self
                .elements
                .get(&flow.target)
                .ok_or_else(|| {
                    invalid(format!(
                        "sequence flow '{}' has unknown target '{}'",
                        flow.id, flow.target
                    ))
                })?;
            if source.flow_scope != target.flow_scope {
                return Err(invalid(format!(
                    "sequence flow '{}' connects elements of different scopes",
                    flow.id
                )));
            }
        }

        for element in self.elements.values() {
            match element.element_type {
                BpmnElementType::Process | BpmnElementType::SubProcess => {
                    let starts = self
                        .children_of(&element.id)
                        .filter(|child| child.is_none_start_event())
                        .count();
                    if starts != 1 {
                        return Err(invalid(format!(
                            "scope '{}' must have exactly one none start event, found {}",
                            element.id, starts
                        )));
                    }
                }
                BpmnElementType::EventSubProcess => {
                    let start = self.event_sub_process_start(&element.id).ok_or_else(|| {
                        invalid(format!("event sub-process '{}' has no start event", element.id))
                    })?;
                    if start.event_definition.error_code().is_none() {
                        return Err(invalid(format!(
                            "event sub-process '{}' must start with an error start event",
                            element.id
                        )));
                    }
                    if !element.incoming.is_empty() || !element.outgoing.is_empty() {
                        return Err(invalid(format!(
                            "event sub-process '{}' must not have sequence flows",
                            element.id
                        )));
                    }
                }
                BpmnElementType::ServiceTask => {
                    if element.job_type.as_deref().is_none_or(str::is_empty) {
                        let message = format!("service task '{}' has no job type", element.id);
                        return Err(invalid(message));
                    }
                }
                BpmnElementType::CallActivity => {
                    if element.called_process_id.as_deref().is_none_or(str::is_empty) {
                        let message =
                            format!("call activity '{}' has no called process", element.id);
                        return Err(invalid(message));
                    }
                }
                BpmnElementType::IntermediateCatchEvent => {
                    if !matches!(
                        element.event_definition,
                        EventDefinition::Timer { .. } | EventDefinition::Signal { .. }
                    ) {
                        return Err(invalid(format!(
                            "intermediate catch event '{}' needs a timer or signal definition",
                            element.id
                        )));
                    }
                }
                BpmnElementType::BoundaryEvent => {
                    let attached = element
                        .attached_to
                        .as_deref()
                        .and_then(|id| self.elements.get(id))
                        .ok_or_else(|| {
                            invalid(format!("boundary event '{}' is not attached", element.id))
                        })?;
                    if !attached.element_type.is_activity() {
                        return Err(invalid(format!(
                            "boundary event '{}' is attached to '{}' which is not an activity",
                            element.id, attached.id
                        )));
                    }
                    if element.event_definition.is_none() || !element.interrupting {
                        return Err(invalid(format!(
                            "boundary event '{}' must be an interrupting error, \
                             timer or signal event",
                            element.id
                        )));
                    }
                }
                BpmnElementType::StartEvent
                | BpmnElementType::EndEvent
                | BpmnElementType::SequenceFlow => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcessBuilder;

    fn process_with_handlers() -> ExecutableProcess {
        ProcessBuilder::new("order")
            .start_event("start")
            .sub_process("sub", |sub| {
                sub.start_event("sub_start")
                    .service_task("task", "pay")
                    .end_event("sub_end")
            })
            .end_event("end")
            .boundary_error_event("catch_all", "sub", "")
            .end_event("all_end")
            .boundary_error_event("catch_e1", "sub", "E1")
            .end_event("e1_end")
            .build()
            .unwrap()
    }

    #[test]
    fn test_exact_error_code_wins_over_catch_all() {
        let process = process_with_handlers();
        assert_eq!(process.error_catch_event("sub", "E1").unwrap().id, "catch_e1");
        assert_eq!(process.error_catch_event("sub", "E2").unwrap().id, "catch_all");
        assert!(process.error_catch_event("task", "E1").is_none());
    }

    #[test]
    fn test_event_sub_process_start_is_a_catch_event_of_its_container() {
        let process = ProcessBuilder::new("p")
            .start_event("start")
            .end_event("end")
            .event_sub_process("handler", |esp| {
                esp.error_start_event("on_error", "E1").end_event("handled")
            })
            .build()
            .unwrap();
        let event = process.error_catch_event("p", "E1").unwrap();
        assert_eq!(event.target_element_id(), "handler");
    }

    #[test]
    fn test_start_events_outlive_the_scope_id() {
        let process = process_with_handlers();
        let (start, inner_start) = {
            let process_id = String::from("order");
            let sub_id = String::from("sub");
            (process.none_start_event(&process_id), process.none_start_event(&sub_id))
        };
        assert_eq!(start.unwrap().id, "start");
        assert_eq!(inner_start.unwrap().id, "sub_start");
        assert_eq!(process.children_of("sub").count(), 3);
    }

    #[test]
    fn test_element_lookup_checks_type() {
        let process = process_with_handlers();
        assert!(process.element_by_id_and_type("task", BpmnElementType::ServiceTask).is_ok());
        assert!(matches!(
            process.element_by_id_and_type("task", BpmnElementType::SubProcess),
            Err(EngineError::IllegalState(_))
        ));
    }

    #[test]
    fn test_missing_start_event_is_invalid() {
        let result = ProcessBuilder::new("p").service_task("task", "x").build();
        assert!(matches!(result, Err(EngineError::InvalidModel(_))));
    }
}
