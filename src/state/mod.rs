//! Partition state, split into per-entity stores over one shared transaction context.

pub mod banned_instance;
pub mod clock;
pub mod element_instance;
pub mod incident;
pub mod job;
pub mod key_generator;
pub mod process;
pub mod signal_subscription;
pub mod timer;

pub use banned_instance::BannedInstanceState;
pub use clock::{ClockState, LastProcessedPositionState};
pub use element_instance::{ElementInstance, ElementInstanceState};
pub use incident::IncidentState;
pub use job::{JobState, JobStore};
pub use key_generator::KeyGenerator;
pub use process::{DeployedProcess, ProcessState};
pub use signal_subscription::SignalSubscriptionState;
pub use timer::TimerState;

use crate::core::{Key, PartitionId, Result};
use crate::db::TransactionContext;
use std::sync::Arc;

/// Read access to element instances.
pub trait ElementInstanceLookup {
    fn element_instance(&self, key: Key) -> Result<Option<ElementInstance>>;
}

/// Read access to deployed processes.
pub trait ProcessLookup {
    fn deployed_process(&self, process_definition_key: Key) -> Result<Option<DeployedProcess>>;
}

impl ElementInstanceLookup for ElementInstanceState {
    fn element_instance(&self, key: Key) -> Result<Option<ElementInstance>> {
        self.get_instance(key)
    }
}

impl ProcessLookup for ProcessState {
    fn deployed_process(&self, process_definition_key: Key) -> Result<Option<DeployedProcess>> {
        self.get_process_by_key(process_definition_key)
    }
}

/// All stores of one partition, bound to the same transaction context.
pub struct ProcessingState {
    context: Arc<TransactionContext>,
    pub key_generator: KeyGenerator,
    pub element_instances: ElementInstanceState,
    pub processes: ProcessState,
    pub jobs: JobStore,
    pub timers: TimerState,
    pub signal_subscriptions: SignalSubscriptionState,
    pub incidents: IncidentState,
    pub banned_instances: BannedInstanceState,
    pub clock: ClockState,
    pub last_processed_position: LastProcessedPositionState,
}

impl ProcessingState {
    pub fn new(context: Arc<TransactionContext>, partition_id: PartitionId) -> Self {
        Self {
            key_generator: KeyGenerator::new(Arc::clone(&context), partition_id),
            element_instances: ElementInstanceState::new(Arc::clone(&context)),
            processes: ProcessState::new(Arc::clone(&context)),
            jobs: JobStore::new(Arc::clone(&context)),
            timers: TimerState::new(Arc::clone(&context)),
            signal_subscriptions: SignalSubscriptionState::new(Arc::clone(&context)),
            incidents: IncidentState::new(Arc::clone(&context)),
            banned_instances: BannedInstanceState::new(Arc::clone(&context)),
            clock: ClockState::new(Arc::clone(&context)),
            last_processed_position: LastProcessedPositionState::new(Arc::clone(&context)),
            context,
        }
    }

    pub fn context(&self) -> &Arc<TransactionContext> {
        &self.context
    }

    pub fn partition_id(&self) -> PartitionId {
        self.key_generator.partition_id()
    }
}

impl ElementInstanceLookup for ProcessingState {
    fn element_instance(&self, key: Key) -> Result<Option<ElementInstance>> {
        self.element_instances.get_instance(key)
    }
}

impl ProcessLookup for ProcessingState {
    fn deployed_process(&self, process_definition_key: Key) -> Result<Option<DeployedProcess>> {
        self.processes.get_process_by_key(process_definition_key)
    }
}
