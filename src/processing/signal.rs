use super::bpmn;
use super::context::ProcessingContext;
use super::error::{ProcessingError, ProcessingResult};
use super::registry::TypedRecordProcessor;
use crate::core::EngineError;
use crate::record::{Intent, Record, RejectionType, SignalIntent};
use tracing::{Level, event};

/// Handles SIGNAL:BROADCAST: triggers every catch event subscribed to the signal name.
pub struct BroadcastSignalProcessor;

impl TypedRecordProcessor for BroadcastSignalProcessor {
    fn name(&self) -> &'static str {
        "BroadcastSignalProcessor"
    }

    fn can_handle(&self, intent: Intent) -> bool {
        intent == Intent::Signal(SignalIntent::Broadcast)
    }

    fn process_record(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        let signal = command
            .value
            .as_signal()
            .ok_or_else(|| EngineError::illegal_state("Expected a signal value"))?;
        if signal.signal_name.is_empty() {
            return Err(ProcessingError::failure(
                RejectionType::InvalidArgument,
                "Expected to broadcast a signal with a name, but the name was empty",
            ));
        }

        let key = context.next_key()?;
        context.append_event(key, SignalIntent::Broadcasted, signal.clone())?;
        context.respond(command, key, SignalIntent::Broadcasted, signal.clone());

        let state = context.state();
        for subscription in state.signal_subscriptions.subscriptions_by_name(&signal.signal_name)? {
            // an earlier trigger may have torn this one down
            if !state
                .signal_subscriptions
                .exists(subscription.catch_event_instance_key, &signal.signal_name)?
            {
                continue;
            }
            if state.banned_instances.is_banned_key(subscription.process_instance_key)? {
                event!(
                    Level::DEBUG,
                    process_instance_key = subscription.process_instance_key,
                    "skipping signal subscription of banned instance"
                );
                continue;
            }
            let instance = state
                .element_instances
                .get_instance(subscription.catch_event_instance_key)?
                .filter(|instance| instance.is_active());
            if let Some(instance) = instance {
                bpmn::trigger_catch_event(context, &instance, &subscription.catch_event_id)?;
            }
        }
        Ok(())
    }
}
