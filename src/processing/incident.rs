use super::bpmn;
use super::context::ProcessingContext;
use super::error::{ProcessingError, ProcessingResult};
use super::registry::TypedRecordProcessor;
use crate::core::{EngineError, NO_KEY};
use crate::model::BpmnElementType;
use crate::record::{ErrorType, IncidentIntent, Intent, Record, RejectionType};

/// Handles INCIDENT:RESOLVE.
///
/// A job incident can only be resolved once the job has retries again. A
/// called-element incident retries the call activity.
pub struct ResolveIncidentProcessor;

impl TypedRecordProcessor for ResolveIncidentProcessor {
    fn name(&self) -> &'static str {
        "ResolveIncidentProcessor"
    }

    fn can_handle(&self, intent: Intent) -> bool {
        intent == Intent::Incident(IncidentIntent::Resolve)
    }

    fn process_record(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        let state = context.state();
        let Some(incident) = state.incidents.get(command.key)? else {
            return Err(ProcessingError::failure(
                RejectionType::NotFound,
                format!(
                    "Expected to resolve incident with key '{}', but no such incident was found",
                    command.key
                ),
            ));
        };

        if incident.job_key != NO_KEY && incident.error_type == ErrorType::JobNoRetries {
            let retries = state.jobs.get_job(incident.job_key)?.map_or(0, |job| job.retries);
            if retries <= 0 {
                return Err(ProcessingError::failure(
                    RejectionType::InvalidState,
                    format!(
                        "Expected to resolve incident with key '{}', but job with key '{}' has no \
                         retries left",
                        command.key, incident.job_key
                    ),
                ));
            }
        }

        context.append_event(command.key, IncidentIntent::Resolved, incident.clone())?;
        context.respond(command, command.key, IncidentIntent::Resolved, incident.clone());

        if incident.error_type == ErrorType::CalledElementError {
            let instance = state
                .element_instances
                .get_instance(incident.element_instance_key)?
                .filter(|instance| instance.is_active());
            if let Some(instance) = instance {
                let process = state
                    .processes
                    .require_process(instance.value.process_definition_key)?
                    .process;
                let element = process.element_by_id_and_type(
                    &instance.value.element_id,
                    BpmnElementType::CallActivity,
                )?;
                bpmn::call_process(context, instance.key, &instance.value, element)?;
            }
        }
        Ok(())
    }
}
