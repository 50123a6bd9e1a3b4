use super::bpmn;
use super::context::ProcessingContext;
use super::error::ProcessingResult;
use super::registry::TypedRecordProcessor;
use crate::core::{EngineError, NO_KEY};
use crate::model::BpmnElementType;
use crate::record::{Intent, ProcessInstanceIntent, ProcessInstanceRecord, Record, RejectionType};

/// Handles ACTIVATE_ELEMENT, COMPLETE_ELEMENT and CANCEL.
pub struct ProcessInstanceCommandProcessor;

fn process_instance_value(command: &Record) -> ProcessingResult<&ProcessInstanceRecord> {
    command.value.as_process_instance().ok_or_else(|| {
        let message = format!("Expected a process instance value for {}", command.intent);
        EngineError::illegal_state(message).into()
    })
}

impl ProcessInstanceCommandProcessor {
    fn activate(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        let record = process_instance_value(command)?;
        let elements = &context.state().element_instances;

        if record.flow_scope_key != NO_KEY {
            let scope = elements.get_instance(record.flow_scope_key)?;
            let may_enter = scope.is_some_and(|scope| {
                let enters_handler = record.bpmn_element_type == BpmnElementType::EventSubProcess;
                scope.is_active() && (!scope.interrupted || enters_handler)
            });
            if !may_enter {
                context.reject(
                    command,
                    RejectionType::InvalidState,
                    format!(
                        "Expected flow scope instance with key '{}' to be active, but it is not",
                        record.flow_scope_key
                    ),
                );
                return Ok(());
            }
        } else if record.parent_element_instance_key != NO_KEY {
            let caller_active = elements
                .get_instance(record.parent_element_instance_key)?
                .is_some_and(|caller| caller.is_active());
            if !caller_active {
                context.reject(
                    command,
                    RejectionType::InvalidState,
                    format!(
                        "Expected calling element instance with key '{}' to be active, but it is \
                         not",
                        record.parent_element_instance_key
                    ),
                );
                return Ok(());
            }
        }

        bpmn::activate_element(context, command.key, record)?;
        Ok(())
    }

    fn complete(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        let Some(instance) = context.state().element_instances.get_instance(command.key)? else {
            context.reject(
                command,
                RejectionType::NotFound,
                format!(
                    "Expected to complete element instance with key '{}', but no such instance was \
                     found",
                    command.key
                ),
            );
            return Ok(());
        };

        let ready = instance.state == ProcessInstanceIntent::ElementActivated
            && (!instance.value.bpmn_element_type.is_container() || instance.can_complete_scope());
        if !ready {
            context.reject(
                command,
                RejectionType::InvalidState,
                format!(
                    "Expected element instance with key '{}' to be activated and done, but it is \
                     in state {}",
                    command.key, instance.state
                ),
            );
            return Ok(());
        }

        bpmn::complete_element(context, instance.key, &instance.value)?;
        Ok(())
    }

    fn cancel(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        let instance = context
            .state()
            .element_instances
            .get_instance(command.key)?
            .filter(|instance| instance.value.is_process());
        let Some(instance) = instance else {
            context.reject(
                command,
                RejectionType::NotFound,
                format!(
                    "Expected to cancel a process instance with key '{}', but no such process was \
                     found",
                    command.key
                ),
            );
            return Ok(());
        };

        if instance.value.parent_process_instance_key != NO_KEY {
            context.reject(
                command,
                RejectionType::InvalidState,
                format!(
                    "Expected to cancel a process instance with key '{}', but it is created by a \
                     parent process instance. Cancel the root process instance '{}' instead.",
                    command.key, instance.value.parent_process_instance_key
                ),
            );
            return Ok(());
        }
        if !instance.is_active() {
            context.reject(
                command,
                RejectionType::InvalidState,
                format!(
                    "Expected to cancel a process instance with key '{}', but it is in state {}",
                    command.key, instance.state
                ),
            );
            return Ok(());
        }

        bpmn::terminate_element(context, instance.key)?;
        context.respond(
            command,
            instance.key,
            ProcessInstanceIntent::ElementTerminated,
            instance.value,
        );
        Ok(())
    }
}

impl TypedRecordProcessor for ProcessInstanceCommandProcessor {
    fn name(&self) -> &'static str {
        "ProcessInstanceCommandProcessor"
    }

    fn can_handle(&self, intent: Intent) -> bool {
        matches!(
            intent,
            Intent::ProcessInstance(
                ProcessInstanceIntent::ActivateElement
                    | ProcessInstanceIntent::CompleteElement
                    | ProcessInstanceIntent::Cancel
            )
        )
    }

    fn process_record(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        match command.intent {
            Intent::ProcessInstance(ProcessInstanceIntent::ActivateElement) => {
                self.activate(command, context)
            }
            Intent::ProcessInstance(ProcessInstanceIntent::CompleteElement) => {
                self.complete(command, context)
            }
            Intent::ProcessInstance(ProcessInstanceIntent::Cancel) => self.cancel(command, context),
            other => {
                let message = format!("{} cannot handle {}", self.name(), other);
                Err(EngineError::illegal_state(message).into())
            }
        }
    }
}
