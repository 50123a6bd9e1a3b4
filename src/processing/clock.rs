use super::context::ProcessingContext;
use super::error::{ProcessingError, ProcessingResult};
use super::registry::TypedRecordProcessor;
use crate::core::EngineError;
use crate::record::{ClockIntent, ClockRecord, Intent, Record, RejectionType};

/// Handles CLOCK:PIN and CLOCK:RESET.
pub struct ClockProcessor;

impl TypedRecordProcessor for ClockProcessor {
    fn name(&self) -> &'static str {
        "ClockProcessor"
    }

    fn can_handle(&self, intent: Intent) -> bool {
        matches!(intent, Intent::Clock(ClockIntent::Pin | ClockIntent::Reset))
    }

    fn process_record(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        let value = command
            .value
            .as_clock()
            .ok_or_else(|| EngineError::illegal_state("Expected a clock value"))?;
        let key = context.next_key()?;

        match command.intent {
            Intent::Clock(ClockIntent::Pin) => {
                if value.time < 0 {
                    return Err(ProcessingError::failure(
                        RejectionType::InvalidArgument,
                        format!(
                            "Expected to pin the clock to a non-negative time, but got {}",
                            value.time
                        ),
                    ));
                }
                let record = ClockRecord { time: value.time };
                context.append_event(key, ClockIntent::Pinned, record.clone())?;
                context.respond(command, key, ClockIntent::Pinned, record);
            }
            _ => {
                let record = ClockRecord { time: context.now() };
                context.append_event(key, ClockIntent::Resetted, record.clone())?;
                context.respond(command, key, ClockIntent::Resetted, record);
            }
        }
        Ok(())
    }
}
