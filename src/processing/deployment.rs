use super::context::ProcessingContext;
use super::error::{ProcessingError, ProcessingResult};
use super::registry::TypedRecordProcessor;
use crate::core::EngineError;
use crate::record::{
    DeploymentIntent, DeploymentRecord, Intent, ProcessIntent, ProcessMetadata, ProcessRecord,
    Record, RejectionType,
};
use std::collections::BTreeSet;
use tracing::{Level, event};

/// Handles DEPLOYMENT:CREATE. Each process gets a new version unless it is
/// identical to the latest deployed version of the same id.
pub struct DeploymentCreateProcessor;

impl TypedRecordProcessor for DeploymentCreateProcessor {
    fn name(&self) -> &'static str {
        "DeploymentCreateProcessor"
    }

    fn can_handle(&self, intent: Intent) -> bool {
        intent == Intent::Deployment(DeploymentIntent::Create)
    }

    fn process_record(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        let deployment = command
            .value
            .as_deployment()
            .ok_or_else(|| EngineError::illegal_state("Expected a deployment value"))?;

        if deployment.processes.is_empty() {
            return Err(ProcessingError::failure(
                RejectionType::InvalidArgument,
                "Expected to deploy at least one process, but none given",
            ));
        }
        let mut ids = BTreeSet::new();
        for process in &deployment.processes {
            if !ids.insert(process.bpmn_process_id.as_str()) {
                return Err(ProcessingError::failure(
                    RejectionType::InvalidArgument,
                    format!(
                        "Expected process ids to be unique within a deployment, but '{}' is given \
                         twice",
                        process.bpmn_process_id
                    ),
                ));
            }
            process
                .validate()
                .map_err(|err| {
                    ProcessingError::failure(RejectionType::InvalidArgument, err.to_string())
                })?;
        }

        let deployment_key = context.next_key()?;
        let mut process_metadata = Vec::with_capacity(deployment.processes.len());
        for process in &deployment.processes {
            let latest = context.state().processes.get_latest_process(&process.bpmn_process_id)?;
            match latest {
                Some(latest) if latest.process == *process => {
                    process_metadata.push(ProcessMetadata {
                        bpmn_process_id: latest.bpmn_process_id,
                        version: latest.version,
                        process_definition_key: latest.key,
                        is_duplicate: true,
                    });
                }
                latest => {
                    let version = latest.map_or(1, |latest| latest.version + 1);
                    let key = context.next_key()?;
                    context.append_event(
                        key,
                        ProcessIntent::Created,
                        ProcessRecord {
                            bpmn_process_id: process.bpmn_process_id.clone(),
                            version,
                            process_definition_key: key,
                            process: process.clone(),
                        },
                    )?;
                    event!(
                        Level::DEBUG,
                        bpmn_process_id = %process.bpmn_process_id,
                        version,
                        key,
                        "deployed process"
                    );
                    process_metadata.push(ProcessMetadata {
                        bpmn_process_id: process.bpmn_process_id.clone(),
                        version,
                        process_definition_key: key,
                        is_duplicate: false,
                    });
                }
            }
        }

        let record = DeploymentRecord {
            processes: deployment.processes.clone(),
            process_metadata,
        };
        context.append_event(deployment_key, DeploymentIntent::Created, record.clone())?;
        context.respond(command, deployment_key, DeploymentIntent::Created, record);
        Ok(())
    }
}
