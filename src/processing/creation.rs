use super::context::ProcessingContext;
use super::error::{ProcessingError, ProcessingResult};
use super::registry::TypedRecordProcessor;
use crate::core::{EngineError, NO_KEY};
use crate::model::BpmnElementType;
use crate::record::{
    Intent, ProcessInstanceCreationIntent, ProcessInstanceCreationRecord, ProcessInstanceIntent,
    ProcessInstanceRecord, Record, RejectionType,
};

/// Handles PROCESS_INSTANCE_CREATION:CREATE.
pub struct CreateProcessInstanceProcessor;

impl TypedRecordProcessor for CreateProcessInstanceProcessor {
    fn name(&self) -> &'static str {
        "CreateProcessInstanceProcessor"
    }

    fn can_handle(&self, intent: Intent) -> bool {
        intent == Intent::ProcessInstanceCreation(ProcessInstanceCreationIntent::Create)
    }

    fn process_record(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        let creation = command
            .value
            .as_process_instance_creation()
            .ok_or_else(|| {
                EngineError::illegal_state("Expected a process instance creation value")
            })?;
        let processes = &context.state().processes;

        let process = if creation.process_definition_key != NO_KEY {
            processes.get_process_by_key(creation.process_definition_key)?
        } else if !creation.bpmn_process_id.is_empty() {
            if creation.version < 0 {
                processes.get_latest_process(&creation.bpmn_process_id)?
            } else {
                processes
                    .get_process_by_id_and_version(&creation.bpmn_process_id, creation.version)?
            }
        } else {
            return Err(ProcessingError::failure(
                RejectionType::InvalidArgument,
                "Expected at least a bpmnProcessId or a key greater than -1, but none given",
            ));
        };

        let Some(process) = process else {
            return Err(ProcessingError::failure(
                RejectionType::NotFound,
                format!(
                    "Expected to find process definition with process ID '{}' and key '{}', but \
                     none found",
                    creation.bpmn_process_id, creation.process_definition_key
                ),
            ));
        };

        let process_instance_key = context.next_key()?;
        let created = ProcessInstanceCreationRecord {
            bpmn_process_id: process.bpmn_process_id.clone(),
            version: process.version,
            process_definition_key: process.key,
            process_instance_key,
        };
        let intent = ProcessInstanceCreationIntent::Created;
        context.append_event(process_instance_key, intent, created.clone())?;
        context.respond(command, process_instance_key, intent, created);

        context.append_command(
            process_instance_key,
            ProcessInstanceIntent::ActivateElement,
            ProcessInstanceRecord {
                bpmn_process_id: process.bpmn_process_id.clone(),
                version: process.version,
                process_definition_key: process.key,
                process_instance_key,
                element_id: process.bpmn_process_id,
                bpmn_element_type: BpmnElementType::Process,
                flow_scope_key: NO_KEY,
                parent_process_instance_key: NO_KEY,
                parent_element_instance_key: NO_KEY,
            },
        );
        Ok(())
    }
}
