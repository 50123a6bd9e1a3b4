use super::bpmn;
use super::context::ProcessingContext;
use super::error::{ProcessingError, ProcessingResult};
use super::registry::TypedRecordProcessor;
use crate::core::EngineError;
use crate::record::{Intent, Record, RejectionType, TimerIntent};

/// Handles TIMER:TRIGGER, written by the timer due-date checker.
pub struct TriggerTimerProcessor;

impl TypedRecordProcessor for TriggerTimerProcessor {
    fn name(&self) -> &'static str {
        "TriggerTimerProcessor"
    }

    fn can_handle(&self, intent: Intent) -> bool {
        intent == Intent::Timer(TimerIntent::Trigger)
    }

    fn process_record(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        let value = command
            .value
            .as_timer()
            .ok_or_else(|| EngineError::illegal_state("Expected a timer value"))?;
        let state = context.state();

        let Some(timer) = state.timers.get(value.element_instance_key, command.key)? else {
            return Err(ProcessingError::failure(
                RejectionType::NotFound,
                format!(
                    "Expected to trigger timer with key '{}', but no such timer was found",
                    command.key
                ),
            ));
        };
        let instance = state
            .element_instances
            .get_instance(timer.element_instance_key)?
            .filter(|instance| instance.is_active());
        let Some(instance) = instance else {
            return Err(ProcessingError::failure(
                RejectionType::InvalidState,
                format!(
                    "Expected to trigger timer with key '{}', but its element instance '{}' is not \
                     active",
                    command.key, timer.element_instance_key
                ),
            ));
        };

        context.append_event(command.key, TimerIntent::Triggered, timer.clone())?;
        bpmn::trigger_catch_event(context, &instance, &timer.target_element_id)?;
        Ok(())
    }
}
