//! Event appliers: the only place where events change state.
//!
//! The same appliers run while processing a command and while replaying the
//! log, which is what keeps replayed state identical to processed state.

use crate::core::{Key, NO_KEY, Result};
use crate::record::{
    ClockIntent, ErrorIntent, IncidentIntent, Intent, JobBatchIntent, JobIntent,
    ProcessInstanceIntent, ProcessIntent, RecordValue, SignalSubscriptionIntent, TimerIntent,
};
use crate::model::{BpmnElementType, ExecutableProcess};
use crate::scheduler::StreamClock;
use crate::state::{DeployedProcess, ElementInstance, ProcessingState};
use std::collections::HashMap;
use tracing::{Level, event};

pub trait EventApplier: Send + Sync {
    fn apply(&self, state: &ProcessingState, key: Key, value: &RecordValue) -> Result<()>;
}

impl<F> EventApplier for F
where
    F: Fn(&ProcessingState, Key, &RecordValue) -> Result<()> + Send + Sync,
{
    fn apply(&self, state: &ProcessingState, key: Key, value: &RecordValue) -> Result<()> {
        self(state, key, value)
    }
}

pub struct EventAppliers {
    appliers: HashMap<Intent, Box<dyn EventApplier>>,
}

impl EventAppliers {
    pub fn new() -> Self {
        Self {
            appliers: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, intent: impl Into<Intent>, applier: F)
    where
        F: Fn(&ProcessingState, Key, &RecordValue) -> Result<()> + Send + Sync + 'static,
    {
        self.appliers.insert(intent.into(), Box::new(applier));
    }

    /// Events without a registered applier do not change state.
    pub fn apply_state(
        &self,
        state: &ProcessingState,
        key: Key,
        intent: Intent,
        value: &RecordValue,
    ) -> Result<()> {
        match self.appliers.get(&intent) {
            Some(applier) => applier.apply(state, key, value),
            None => {
                event!(Level::TRACE, %intent, key, "no applier registered, state unchanged");
                Ok(())
            }
        }
    }

    pub fn has_applier(&self, intent: Intent) -> bool {
        self.appliers.contains_key(&intent)
    }

    pub fn with_default_appliers(clock: StreamClock) -> Self {
        let mut appliers = Self::new();
        register_process_appliers(&mut appliers);
        register_process_instance_appliers(&mut appliers);
        register_job_appliers(&mut appliers);
        register_timer_and_signal_appliers(&mut appliers);
        register_incident_appliers(&mut appliers);
        register_clock_appliers(&mut appliers, clock);
        appliers
    }
}

impl Default for EventAppliers {
    fn default() -> Self {
        Self::new()
    }
}

fn register_process_appliers(appliers: &mut EventAppliers) {
    appliers.register(ProcessIntent::Created, |state, key, value| {
        if let Some(process) = value.as_process() {
            state.processes.put_process(&DeployedProcess {
                bpmn_process_id: process.bpmn_process_id.clone(),
                version: process.version,
                key,
                process: process.process.clone(),
            })?;
        }
        Ok(())
    });
}

fn entered_by_sequence_flow(process: &ExecutableProcess, element_id: &str) -> bool {
    process
        .element(element_id)
        .is_some_and(|element| !element.incoming.is_empty())
}

fn register_process_instance_appliers(appliers: &mut EventAppliers) {
    appliers.register(
        ProcessInstanceIntent::ElementActivating,
        |state, key, value| {
            let Some(record) = value.as_process_instance() else {
                return Ok(());
            };
            state.element_instances.create_instance(&ElementInstance::new(
                key,
                ProcessInstanceIntent::ElementActivating,
                record.clone(),
            ))?;

            if record.flow_scope_key != NO_KEY {
                let process = state.processes.require_process(record.process_definition_key)?;
                if entered_by_sequence_flow(&process.process, &record.element_id) {
                    state
                        .element_instances
                        .decrement_active_sequence_flows(record.flow_scope_key)?;
                }
                if record.bpmn_element_type == BpmnElementType::EventSubProcess {
                    let mut scope =
                        state.element_instances.require_instance(record.flow_scope_key)?;
                    scope.interrupted = true;
                    scope.active_sequence_flows = 0;
                    state.element_instances.update_instance(&scope)?;
                }
            }

            if record.is_process() && record.parent_element_instance_key != NO_KEY {
                if let Some(mut caller) = state
                    .element_instances
                    .get_instance(record.parent_element_instance_key)?
                {
                    caller.called_child_instance_key = key;
                    state.element_instances.update_instance(&caller)?;
                }
            }
            Ok(())
        },
    );

    for intent in [
        ProcessInstanceIntent::ElementActivated,
        ProcessInstanceIntent::ElementCompleting,
        ProcessInstanceIntent::ElementTerminating,
    ] {
        appliers.register(intent, move |state, key, _| {
            state.element_instances.update_state(key, intent)
        });
    }

    for intent in [
        ProcessInstanceIntent::ElementCompleted,
        ProcessInstanceIntent::ElementTerminated,
    ] {
        appliers.register(intent, |state, key, value| {
            state.element_instances.remove_instance(key)?;
            if let Some(record) = value.as_process_instance() {
                if record.is_process() && record.parent_element_instance_key != NO_KEY {
                    if let Some(mut caller) = state
                        .element_instances
                        .get_instance(record.parent_element_instance_key)?
                    {
                        caller.called_child_instance_key = NO_KEY;
                        state.element_instances.update_instance(&caller)?;
                    }
                }
            }
            Ok(())
        });
    }

    appliers.register(
        ProcessInstanceIntent::SequenceFlowTaken,
        |state, _, value| {
            if let Some(record) = value.as_process_instance() {
                state
                    .element_instances
                    .increment_active_sequence_flows(record.flow_scope_key)?;
            }
            Ok(())
        },
    );
}

fn register_job_appliers(appliers: &mut EventAppliers) {
    appliers.register(JobIntent::Created, |state, key, value| {
        let Some(job) = value.as_job() else {
            return Ok(());
        };
        state.jobs.create(key, job)?;
        let instance = state.element_instances.get_instance(job.element_instance_key)?;
        if let Some(mut instance) = instance {
            instance.job_key = key;
            state.element_instances.update_instance(&instance)?;
        }
        Ok(())
    });
    appliers.register(JobIntent::Completed, |state, key, _| {
        state.jobs.delete(key)
    });
    appliers.register(JobIntent::Canceled, |state, key, _| {
        state.jobs.delete(key)
    });
    appliers.register(JobIntent::Failed, |state, key, value| {
        match value.as_job() {
            Some(job) => state.jobs.fail(key, job),
            None => Ok(()),
        }
    });
    appliers.register(JobIntent::ErrorThrown, |state, key, value| {
        match value.as_job() {
            Some(job) => state.jobs.error_thrown(key, job),
            None => Ok(()),
        }
    });
    appliers.register(JobIntent::TimedOut, |state, key, value| {
        match value.as_job() {
            Some(job) => state.jobs.timeout(key, job),
            None => Ok(()),
        }
    });
    appliers.register(JobIntent::RetriesUpdated, |state, key, value| {
        match value.as_job() {
            Some(job) => state.jobs.update_retries(key, job.retries),
            None => Ok(()),
        }
    });
    appliers.register(JobBatchIntent::Activated, |state, _, value| {
        if let Some(batch) = value.as_job_batch() {
            for (job_key, job) in batch.job_keys.iter().zip(&batch.jobs) {
                state.jobs.activate(*job_key, job)?;
            }
        }
        Ok(())
    });
}

fn register_timer_and_signal_appliers(appliers: &mut EventAppliers) {
    appliers.register(TimerIntent::Created, |state, key, value| {
        match value.as_timer() {
            Some(timer) => state.timers.put(key, timer),
            None => Ok(()),
        }
    });
    for intent in [TimerIntent::Triggered, TimerIntent::Canceled] {
        appliers.register(intent, |state, key, value| {
            match value.as_timer() {
                Some(timer) => state.timers.remove(key, timer),
                None => Ok(()),
            }
        });
    }

    appliers.register(
        SignalSubscriptionIntent::Created,
        |state, _, value| match value.as_signal_subscription() {
            Some(subscription) => state.signal_subscriptions.put(subscription),
            None => Ok(()),
        },
    );
    appliers.register(
        SignalSubscriptionIntent::Deleted,
        |state, _, value| match value.as_signal_subscription() {
            Some(subscription) => state
                .signal_subscriptions
                .remove(subscription.catch_event_instance_key, &subscription.signal_name),
            None => Ok(()),
        },
    );
}

fn register_incident_appliers(appliers: &mut EventAppliers) {
    appliers.register(IncidentIntent::Created, |state, key, value| {
        match value.as_incident() {
            Some(incident) => state.incidents.create(key, incident),
            None => Ok(()),
        }
    });
    appliers.register(IncidentIntent::Resolved, |state, key, value| {
        state.incidents.delete(key)?;
        if let Some(incident) = value.as_incident() {
            if incident.job_key != NO_KEY {
                state.jobs.resolve(incident.job_key)?;
            }
        }
        Ok(())
    });
    appliers.register(ErrorIntent::Created, |state, _, value| {
        match value.as_error() {
            Some(error) => state.banned_instances.ban_instance(error.process_instance_key),
            None => Ok(()),
        }
    });
}

fn register_clock_appliers(appliers: &mut EventAppliers, clock: StreamClock) {
    let pinned_clock = clock.clone();
    appliers.register(ClockIntent::Pinned, move |state, _, value| {
        if let Some(record) = value.as_clock() {
            state.clock.pin(record.time)?;
            pinned_clock.pin_at(record.time)?;
        }
        Ok(())
    });
    appliers.register(ClockIntent::Resetted, move |state, _, _| {
        state.clock.reset()?;
        clock.reset()
    });
}
