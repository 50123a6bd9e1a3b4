//! BPMN element behavior: how elements are entered, left and torn down.
//!
//! Every function here writes events through the processing context, so state
//! changes happen through the appliers only. Follow-up work that belongs to a
//! different element is written as a command.

use super::context::ProcessingContext;
use crate::analyzer::{CatchEventAnalyzer, CatchEventTuple};
use crate::core::{EngineError, Key, NO_KEY, Result};
use crate::model::{
    BpmnElementType, CatchEventKind, EventDefinition, ExecutableElement, ExecutableProcess,
};
use crate::record::{
    ErrorType, IncidentIntent, IncidentRecord, JobIntent, JobRecord, ProcessInstanceIntent,
    ProcessInstanceRecord, SignalSubscriptionIntent, SignalSubscriptionRecord, TimerIntent,
    TimerRecord,
};
use crate::scheduler::ScheduledTask;
use crate::state::ElementInstance;
use tracing::{Level, event};

/// Record of `element` inside the scope instance `flow_scope_key`, inheriting
/// the process and parent keys of `origin`.
fn record_for(
    origin: &ProcessInstanceRecord,
    flow_scope_key: Key,
    element: &ExecutableElement,
) -> ProcessInstanceRecord {
    ProcessInstanceRecord {
        element_id: element.id.clone(),
        bpmn_element_type: element.element_type,
        flow_scope_key,
        ..origin.clone()
    }
}

pub fn activate_element(
    context: &mut ProcessingContext<'_>,
    key: Key,
    record: &ProcessInstanceRecord,
) -> Result<()> {
    let process = context
        .state()
        .processes
        .require_process(record.process_definition_key)?
        .process;
    let element = process
        .element_by_id_and_type(&record.element_id, record.bpmn_element_type)?
        .clone();

    context.append_event(key, ProcessInstanceIntent::ElementActivating, record.clone())?;

    match element.element_type {
        BpmnElementType::Process
        | BpmnElementType::SubProcess
        | BpmnElementType::EventSubProcess => {
            context.append_event(key, ProcessInstanceIntent::ElementActivated, record.clone())?;
            subscribe_boundary_events(context, key, record, &process)?;
            let start = if element.element_type == BpmnElementType::EventSubProcess {
                process.event_sub_process_start(&element.id)
            } else {
                process.none_start_event(&element.id)
            }
            .ok_or_else(|| {
                EngineError::illegal_state(format!(
                    "Expected scope '{}' to contain a start event, but it has none",
                    element.id
                ))
            })?;
            let start_key = context.next_key()?;
            context.append_command(
                start_key,
                ProcessInstanceIntent::ActivateElement,
                record_for(record, key, start),
            );
        }
        BpmnElementType::StartEvent | BpmnElementType::BoundaryEvent => {
            context.append_event(key, ProcessInstanceIntent::ElementActivated, record.clone())?;
            complete_element(context, key, record)?;
        }
        BpmnElementType::EndEvent => {
            context.append_event(key, ProcessInstanceIntent::ElementActivated, record.clone())?;
            match element.event_definition.error_code() {
                Some(code) => throw_error(context, key, code, "", NO_KEY)?,
                None => complete_element(context, key, record)?,
            }
        }
        BpmnElementType::ServiceTask => {
            context.append_event(key, ProcessInstanceIntent::ElementActivated, record.clone())?;
            subscribe_boundary_events(context, key, record, &process)?;
            create_job(context, key, record, &element)?;
        }
        BpmnElementType::CallActivity => {
            context.append_event(key, ProcessInstanceIntent::ElementActivated, record.clone())?;
            subscribe_boundary_events(context, key, record, &process)?;
            call_process(context, key, record, &element)?;
        }
        BpmnElementType::IntermediateCatchEvent => {
            context.append_event(key, ProcessInstanceIntent::ElementActivated, record.clone())?;
            subscribe(context, key, record, &element.event_definition, &element.id)?;
        }
        BpmnElementType::SequenceFlow => {
            return Err(EngineError::illegal_state(format!(
                "Expected to activate an element, but '{}' is a sequence flow",
                element.id
            )));
        }
    }
    Ok(())
}

/// Leaves an element and continues the flow: take the outgoing sequence flows,
/// or complete the enclosing scope once nothing is left in it.
pub fn complete_element(
    context: &mut ProcessingContext<'_>,
    key: Key,
    record: &ProcessInstanceRecord,
) -> Result<()> {
    context.append_event(key, ProcessInstanceIntent::ElementCompleting, record.clone())?;
    unsubscribe(context, key)?;
    context.append_event(key, ProcessInstanceIntent::ElementCompleted, record.clone())?;

    let process = context
        .state()
        .processes
        .require_process(record.process_definition_key)?
        .process;
    let outgoing = process.outgoing_flows(&record.element_id);
    if !outgoing.is_empty() {
        for flow in outgoing {
            let target = process.element(&flow.target).ok_or_else(|| {
                EngineError::illegal_state(format!(
                    "Expected target '{}' of sequence flow '{}' to exist, but it does not",
                    flow.target, flow.id
                ))
            })?;
            let flow_record = ProcessInstanceRecord {
                element_id: flow.id.clone(),
                bpmn_element_type: BpmnElementType::SequenceFlow,
                ..record.clone()
            };
            let flow_key = context.next_key()?;
            context.append_event(flow_key, ProcessInstanceIntent::SequenceFlowTaken, flow_record)?;

            let target_key = context.next_key()?;
            context.append_command(
                target_key,
                ProcessInstanceIntent::ActivateElement,
                record_for(record, record.flow_scope_key, target),
            );
        }
        return Ok(());
    }

    let elements = &context.state().element_instances;
    if record.flow_scope_key != NO_KEY {
        if let Some(scope) = elements.get_instance(record.flow_scope_key)? {
            let activated = scope.state == ProcessInstanceIntent::ElementActivated;
            if activated && scope.can_complete_scope() {
                let intent = ProcessInstanceIntent::CompleteElement;
                context.append_command(scope.key, intent, scope.value);
            }
        }
    } else if record.is_process() && record.parent_element_instance_key != NO_KEY {
        if let Some(caller) = elements.get_instance(record.parent_element_instance_key)? {
            if caller.state == ProcessInstanceIntent::ElementActivated {
                let intent = ProcessInstanceIntent::CompleteElement;
                context.append_command(caller.key, intent, caller.value);
            }
        }
    }
    Ok(())
}

/// Terminates an element instance and everything below it, children first.
pub fn terminate_element(context: &mut ProcessingContext<'_>, key: Key) -> Result<()> {
    let state = context.state();
    let Some(instance) = state.element_instances.get_instance(key)? else {
        return Ok(());
    };
    if instance.is_terminating() {
        return Ok(());
    }

    context.append_event(key, ProcessInstanceIntent::ElementTerminating, instance.value.clone())?;

    for child in state.element_instances.get_children(key)? {
        terminate_element(context, child.key)?;
    }
    if instance.called_child_instance_key != NO_KEY {
        terminate_element(context, instance.called_child_instance_key)?;
    }

    unsubscribe(context, key)?;
    if let Some(incident_key) = state.incidents.incident_for_element_instance(key)? {
        resolve_incident(context, incident_key)?;
    }
    if instance.job_key != NO_KEY {
        if let Some(incident_key) = state.incidents.incident_for_job(instance.job_key)? {
            resolve_incident(context, incident_key)?;
        }
        if let Some(job) = state.jobs.get_job(instance.job_key)? {
            context.append_event(instance.job_key, JobIntent::Canceled, job)?;
        }
    }

    context.append_event(key, ProcessInstanceIntent::ElementTerminated, instance.value)?;
    Ok(())
}

/// Throws an error from element instance `key`. The nearest catch event takes
/// over; without one an incident is raised on the throwing element (or its job).
pub fn throw_error(
    context: &mut ProcessingContext<'_>,
    key: Key,
    error_code: &str,
    error_message: &str,
    job_key: Key,
) -> Result<()> {
    let instance = context.state().element_instances.require_instance(key)?;
    let found =
        CatchEventAnalyzer::new(context.state()).find_error_catch_event(error_code, &instance)?;
    match found {
        Some(catch_event) => activate_error_catch_event(context, catch_event),
        None => {
            event!(Level::DEBUG, key, error_code, "error was not caught, raising incident");
            let message = if error_message.is_empty() {
                format!(
                    "Expected to throw an error event with the code '{}', but it was not caught. \
                     No error events are available in the scope.",
                    error_code
                )
            } else {
                format!(
                    "Expected to throw an error event with the code '{}' with message '{}', but it \
                     was not caught. No error events are available in the scope.",
                    error_code, error_message
                )
            };
            raise_incident(context, ErrorType::UnhandledErrorEvent, message, &instance, job_key)
        }
    }
}

fn activate_error_catch_event(
    context: &mut ProcessingContext<'_>,
    catch_event: CatchEventTuple,
) -> Result<()> {
    let CatchEventTuple {
        element_instance,
        catch_event,
        process,
    } = catch_event;

    match catch_event.kind {
        CatchEventKind::Boundary => {
            activate_boundary_event(context, &element_instance, &catch_event.id)
        }
        CatchEventKind::EventSubProcessStart { event_sub_process } => {
            for child in context.state().element_instances.get_children(element_instance.key)? {
                terminate_element(context, child.key)?;
            }
            let element = process
                .process
                .element_by_id_and_type(&event_sub_process, BpmnElementType::EventSubProcess)?;
            let record = record_for(&element_instance.value, element_instance.key, element);
            let key = context.next_key()?;
            activate_element(context, key, &record)
        }
    }
}

/// A timer or signal arrived for `instance`: either the instance is the catch
/// event itself, or `catch_element_id` is a boundary event attached to it.
pub fn trigger_catch_event(
    context: &mut ProcessingContext<'_>,
    instance: &ElementInstance,
    catch_element_id: &str,
) -> Result<()> {
    if instance.value.element_id == catch_element_id {
        complete_element(context, instance.key, &instance.value)
    } else {
        activate_boundary_event(context, instance, catch_element_id)
    }
}

fn activate_boundary_event(
    context: &mut ProcessingContext<'_>,
    activity: &ElementInstance,
    boundary_id: &str,
) -> Result<()> {
    let process = context
        .state()
        .processes
        .require_process(activity.value.process_definition_key)?
        .process;
    let boundary = process.element_by_id_and_type(boundary_id, BpmnElementType::BoundaryEvent)?;
    let record = record_for(&activity.value, activity.parent_key, boundary);

    terminate_element(context, activity.key)?;
    let key = context.next_key()?;
    activate_element(context, key, &record)
}

/// Starts the latest version of the called process, or raises an incident if
/// it is not deployed. Also used to retry after such an incident was resolved.
pub fn call_process(
    context: &mut ProcessingContext<'_>,
    key: Key,
    record: &ProcessInstanceRecord,
    element: &ExecutableElement,
) -> Result<()> {
    let called_id = element.called_process_id.as_deref().unwrap_or_default();
    match context.state().processes.get_latest_process(called_id)? {
        Some(called) => {
            let child_key = context.next_key()?;
            let child = ProcessInstanceRecord {
                bpmn_process_id: called.bpmn_process_id.clone(),
                version: called.version,
                process_definition_key: called.key,
                process_instance_key: child_key,
                element_id: called.bpmn_process_id,
                bpmn_element_type: BpmnElementType::Process,
                flow_scope_key: NO_KEY,
                parent_process_instance_key: record.process_instance_key,
                parent_element_instance_key: key,
            };
            context.append_command(child_key, ProcessInstanceIntent::ActivateElement, child);
            Ok(())
        }
        None => {
            let instance = context.state().element_instances.require_instance(key)?;
            raise_incident(
                context,
                ErrorType::CalledElementError,
                format!(
                    "Expected process with BPMN process id '{}' to be deployed, but not found.",
                    called_id
                ),
                &instance,
                NO_KEY,
            )
        }
    }
}

pub fn raise_incident(
    context: &mut ProcessingContext<'_>,
    error_type: ErrorType,
    error_message: String,
    instance: &ElementInstance,
    job_key: Key,
) -> Result<()> {
    let incident = IncidentRecord {
        error_type,
        error_message,
        bpmn_process_id: instance.value.bpmn_process_id.clone(),
        process_definition_key: instance.value.process_definition_key,
        process_instance_key: instance.value.process_instance_key,
        element_id: instance.value.element_id.clone(),
        element_instance_key: instance.key,
        job_key,
    };
    let key = context.next_key()?;
    context.append_event(key, IncidentIntent::Created, incident)
}

fn resolve_incident(context: &mut ProcessingContext<'_>, incident_key: Key) -> Result<()> {
    if let Some(incident) = context.state().incidents.get(incident_key)? {
        context.append_event(incident_key, IncidentIntent::Resolved, incident)?;
    }
    Ok(())
}

fn create_job(
    context: &mut ProcessingContext<'_>,
    key: Key,
    record: &ProcessInstanceRecord,
    element: &ExecutableElement,
) -> Result<()> {
    let job = JobRecord {
        job_type: element.job_type.clone().unwrap_or_default(),
        retries: element.job_retries,
        bpmn_process_id: record.bpmn_process_id.clone(),
        process_definition_key: record.process_definition_key,
        process_instance_key: record.process_instance_key,
        element_id: record.element_id.clone(),
        element_instance_key: key,
        ..Default::default()
    };
    let job_key = context.next_key()?;
    context.append_event(job_key, JobIntent::Created, job)
}

fn subscribe_boundary_events(
    context: &mut ProcessingContext<'_>,
    key: Key,
    record: &ProcessInstanceRecord,
    process: &ExecutableProcess,
) -> Result<()> {
    for boundary in process.boundary_events(&record.element_id) {
        subscribe(context, key, record, &boundary.event_definition, &boundary.id)?;
    }
    Ok(())
}

/// Opens a timer or signal subscription for element instance `key` on behalf
/// of catch event `catch_event_id`. Errors need no subscription.
fn subscribe(
    context: &mut ProcessingContext<'_>,
    key: Key,
    record: &ProcessInstanceRecord,
    definition: &EventDefinition,
    catch_event_id: &str,
) -> Result<()> {
    match definition {
        EventDefinition::Timer { duration_ms } => {
            let due_date = context.now().saturating_add(*duration_ms);
            let timer = TimerRecord {
                element_instance_key: key,
                process_instance_key: record.process_instance_key,
                process_definition_key: record.process_definition_key,
                due_date,
                target_element_id: catch_event_id.to_string(),
            };
            let timer_key = context.next_key()?;
            context.append_event(timer_key, TimerIntent::Created, timer)?;
            context.schedule_due_date(ScheduledTask::TriggerTimers, due_date);
        }
        EventDefinition::Signal { name } => {
            let subscription = SignalSubscriptionRecord {
                signal_name: name.clone(),
                process_definition_key: record.process_definition_key,
                bpmn_process_id: record.bpmn_process_id.clone(),
                catch_event_id: catch_event_id.to_string(),
                catch_event_instance_key: key,
                process_instance_key: record.process_instance_key,
            };
            context.append_event(key, SignalSubscriptionIntent::Created, subscription)?;
        }
        EventDefinition::None | EventDefinition::Error { .. } => {}
    }
    Ok(())
}

fn unsubscribe(context: &mut ProcessingContext<'_>, key: Key) -> Result<()> {
    let state = context.state();
    for (timer_key, timer) in state.timers.timers_of_element_instance(key)? {
        context.append_event(timer_key, TimerIntent::Canceled, timer)?;
    }
    for subscription in state.signal_subscriptions.subscriptions_by_key(key)? {
        context.append_event(key, SignalSubscriptionIntent::Deleted, subscription)?;
    }
    Ok(())
}
