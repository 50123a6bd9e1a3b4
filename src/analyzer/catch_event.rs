use crate::core::{EngineError, Result};
use crate::model::ExecutableCatchEvent;
use crate::state::{DeployedProcess, ElementInstance, ElementInstanceLookup, ProcessLookup};

/// A catch event together with the scope instance it was found in.
#[derive(Debug, Clone)]
pub struct CatchEventTuple {
    /// The activity a boundary event is attached to, or the container of an event sub-process.
    pub element_instance: ElementInstance,
    pub catch_event: ExecutableCatchEvent,
    pub process: DeployedProcess,
}

/// Resolves which catch event handles an error thrown in a given element instance.
///
/// The lookup walks up the scope hierarchy of the process instance (inner
/// scopes first) and then continues in the calling process instance, rooted
/// at the call activity. It never mutates state.
pub struct CatchEventAnalyzer<'a, S> {
    state: &'a S,
}

impl<'a, S: ElementInstanceLookup + ProcessLookup> CatchEventAnalyzer<'a, S> {
    pub fn new(state: &'a S) -> Self {
        Self { state }
    }

    pub fn find_error_catch_event(
        &self,
        error_code: &str,
        element_instance: &ElementInstance,
    ) -> Result<Option<CatchEventTuple>> {
        let mut current = Some(element_instance.clone());
        while let Some(instance) = current.filter(ElementInstance::is_active) {
            if let Some(found) = self.find_in_process_instance(error_code, &instance)? {
                return Ok(Some(found));
            }
            current = self
                .state
                .element_instance(instance.value.parent_element_instance_key)?;
        }
        Ok(None)
    }

    fn find_in_process_instance(
        &self,
        error_code: &str,
        element_instance: &ElementInstance,
    ) -> Result<Option<CatchEventTuple>> {
        let mut current = Some(element_instance.clone());
        while let Some(instance) =
            current.filter(|instance| instance.is_active() && !instance.interrupted)
        {
            let process = self.require_process(&instance)?;
            let element = process
                .process
                .element_by_id_and_type(
                    &instance.value.element_id,
                    instance.value.bpmn_element_type,
                )?;
            if let Some(catch_event) = process.process.error_catch_event(&element.id, error_code) {
                return Ok(Some(CatchEventTuple {
                    element_instance: instance,
                    catch_event,
                    process,
                }));
            }
            current = self.state.element_instance(instance.parent_key)?;
        }
        Ok(None)
    }

    fn require_process(&self, instance: &ElementInstance) -> Result<DeployedProcess> {
        let key = instance.value.process_definition_key;
        self.state.deployed_process(key)?.ok_or_else(|| {
            EngineError::illegal_state(format!(
                "Expected process with key {} of element instance {} to be deployed, but it is not",
                key, instance.key
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Key, NO_KEY};
    use crate::db::Db;
    use crate::model::{BpmnElementType, CatchEventKind, ExecutableProcess, ProcessBuilder};
    use crate::record::{ProcessInstanceIntent, ProcessInstanceRecord};
    use crate::state::ProcessingState;

    struct Fixture {
        state: ProcessingState,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                state: ProcessingState::new(Db::in_memory().create_context(), 1),
            }
        }

        fn deploy(&self, key: Key, process: ExecutableProcess) {
            self.state
                .processes
                .put_process(&DeployedProcess {
                    bpmn_process_id: process.bpmn_process_id.clone(),
                    version: 1,
                    key,
                    process,
                })
                .unwrap();
        }

        #[allow(clippy::too_many_arguments)]
        fn instance(
            &self,
            key: Key,
            parent_key: Key,
            process_definition_key: Key,
            element_id: &str,
            element_type: BpmnElementType,
            process_instance_key: Key,
            parent_element_instance_key: Key,
        ) -> ElementInstance {
            let instance = ElementInstance::new(
                key,
                ProcessInstanceIntent::ElementActivated,
                ProcessInstanceRecord {
                    bpmn_process_id: String::new(),
                    version: 1,
                    process_definition_key,
                    process_instance_key,
                    element_id: element_id.into(),
                    bpmn_element_type: element_type,
                    flow_scope_key: parent_key,
                    parent_process_instance_key: NO_KEY,
                    parent_element_instance_key,
                },
            );
            self.state.element_instances.create_instance(&instance).unwrap();
            instance
        }
    }

    fn nested_process() -> ExecutableProcess {
        ProcessBuilder::new("outer")
            .start_event("start")
            .sub_process("sub", |sub| {
                sub.start_event("sub_start")
                    .service_task("task", "work")
                    .end_event("sub_end")
                    .boundary_error_event("inner_catch", "task", "E1")
                    .end_event("inner_end")
            })
            .end_event("end")
            .boundary_error_event("outer_catch", "sub", "E1")
            .end_event("outer_end")
            .boundary_error_event("outer_other", "sub", "E2")
            .end_event("other_end")
            .build()
            .unwrap()
    }

    #[test]
    fn test_inner_scope_takes_precedence() {
        let fixture = Fixture::new();
        fixture.deploy(1, nested_process());
        fixture.instance(10, NO_KEY, 1, "outer", BpmnElementType::Process, 10, NO_KEY);
        fixture.instance(11, 10, 1, "sub", BpmnElementType::SubProcess, 10, NO_KEY);
        let task = fixture.instance(12, 11, 1, "task", BpmnElementType::ServiceTask, 10, NO_KEY);

        let analyzer = CatchEventAnalyzer::new(&fixture.state);
        let found = analyzer.find_error_catch_event("E1", &task).unwrap().unwrap();
        assert_eq!(found.catch_event.id, "inner_catch");
        assert_eq!(found.element_instance.key, 12);

        let outer = analyzer.find_error_catch_event("E2", &task).unwrap().unwrap();
        assert_eq!(outer.catch_event.id, "outer_other");
        assert_eq!(outer.element_instance.key, 11);

        assert!(analyzer.find_error_catch_event("E3", &task).unwrap().is_none());
    }

    #[test]
    fn test_escalates_to_parent_process_instance() {
        let fixture = Fixture::new();
        let parent = ProcessBuilder::new("parent")
            .start_event("start")
            .call_activity("call", "child")
            .end_event("end")
            .boundary_error_event("parent_catch", "call", "E1")
            .end_event("caught")
            .build()
            .unwrap();
        let child = ProcessBuilder::new("child")
            .start_event("start")
            .service_task("task", "work")
            .end_event("end")
            .build()
            .unwrap();
        fixture.deploy(1, parent);
        fixture.deploy(2, child);

        fixture.instance(10, NO_KEY, 1, "parent", BpmnElementType::Process, 10, NO_KEY);
        fixture.instance(11, 10, 1, "call", BpmnElementType::CallActivity, 10, NO_KEY);
        fixture.instance(20, NO_KEY, 2, "child", BpmnElementType::Process, 20, 11);
        let task = fixture.instance(21, 20, 2, "task", BpmnElementType::ServiceTask, 20, 11);

        let found = CatchEventAnalyzer::new(&fixture.state)
            .find_error_catch_event("E1", &task)
            .unwrap()
            .unwrap();
        assert_eq!(found.catch_event.id, "parent_catch");
        assert_eq!(found.element_instance.key, 11);
        assert_eq!(found.process.key, 1);
    }

    #[test]
    fn test_event_sub_process_of_the_process_catches() {
        let fixture = Fixture::new();
        let process = ProcessBuilder::new("p")
            .start_event("start")
            .service_task("task", "work")
            .end_event("end")
            .event_sub_process("handler", |esp| {
                esp.error_start_event("on_error", "").end_event("handled")
            })
            .build()
            .unwrap();
        fixture.deploy(1, process);
        fixture.instance(10, NO_KEY, 1, "p", BpmnElementType::Process, 10, NO_KEY);
        let task = fixture.instance(11, 10, 1, "task", BpmnElementType::ServiceTask, 10, NO_KEY);

        let found = CatchEventAnalyzer::new(&fixture.state)
            .find_error_catch_event("ANY", &task)
            .unwrap()
            .unwrap();
        assert_eq!(found.element_instance.key, 10);
        assert_eq!(
            found.catch_event.kind,
            CatchEventKind::EventSubProcessStart {
                event_sub_process: "handler".into()
            }
        );
    }

    #[test]
    fn test_interrupted_scope_stops_the_walk() {
        let fixture = Fixture::new();
        fixture.deploy(1, nested_process());
        fixture.instance(10, NO_KEY, 1, "outer", BpmnElementType::Process, 10, NO_KEY);
        let mut sub = fixture.instance(11, 10, 1, "sub", BpmnElementType::SubProcess, 10, NO_KEY);
        let task = fixture.instance(12, 11, 1, "task", BpmnElementType::ServiceTask, 10, NO_KEY);
        sub = fixture.state.element_instances.require_instance(sub.key).unwrap();
        sub.interrupted = true;
        fixture.state.element_instances.update_instance(&sub).unwrap();

        let analyzer = CatchEventAnalyzer::new(&fixture.state);
        assert!(analyzer.find_error_catch_event("E2", &task).unwrap().is_none());
    }

    #[test]
    fn test_missing_process_is_illegal_state() {
        let fixture = Fixture::new();
        let task_type = BpmnElementType::ServiceTask;
        let task = fixture.instance(12, NO_KEY, 99, "task", task_type, 12, NO_KEY);
        let result = CatchEventAnalyzer::new(&fixture.state).find_error_catch_event("E1", &task);
        assert!(matches!(result, Err(EngineError::IllegalState(_))));
    }
}
