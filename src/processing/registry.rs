use super::context::ProcessingContext;
use super::error::ProcessingResult;
use crate::record::{Intent, Record};

/// Handles commands of one or more intents.
pub trait TypedRecordProcessor: Send + Sync {
    /// Name for logs and diagnostics.
    fn name(&self) -> &'static str;

    fn can_handle(&self, intent: Intent) -> bool;

    fn process_record(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()>;
}

/// Processors of a partition, looked up by command intent.
pub struct ProcessorRegistry {
    processors: Vec<Box<dyn TypedRecordProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self {
            processors: Vec::new(),
        }
    }

    pub fn register(&mut self, processor: Box<dyn TypedRecordProcessor>) {
        self.processors.push(processor);
    }

    /// Registers every built-in processor.
    pub fn with_default_processors() -> Self {
        use super::clock::ClockProcessor;
        use super::creation::CreateProcessInstanceProcessor;
        use super::deployment::DeploymentCreateProcessor;
        use super::incident::ResolveIncidentProcessor;
        use super::job::{ActivateJobsProcessor, JobCommandProcessor};
        use super::process_instance::ProcessInstanceCommandProcessor;
        use super::signal::BroadcastSignalProcessor;
        use super::timer::TriggerTimerProcessor;

        let mut registry = Self::new();
        registry.register(Box::new(ProcessInstanceCommandProcessor));
        registry.register(Box::new(DeploymentCreateProcessor));
        registry.register(Box::new(CreateProcessInstanceProcessor));
        registry.register(Box::new(JobCommandProcessor));
        registry.register(Box::new(ActivateJobsProcessor));
        registry.register(Box::new(TriggerTimerProcessor));
        registry.register(Box::new(BroadcastSignalProcessor));
        registry.register(Box::new(ResolveIncidentProcessor));
        registry.register(Box::new(ClockProcessor));
        registry
    }

    pub fn find(&self, intent: Intent) -> Option<&dyn TypedRecordProcessor> {
        self.processors
            .iter()
            .find(|processor| processor.can_handle(intent))
            .map(|processor| processor.as_ref())
    }

    pub fn list_processors(&self) -> Vec<&str> {
        self.processors.iter().map(|processor| processor.name()).collect()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
