//! State migrations, run in a fixed order when a store is opened and before
//! any record is replayed or processed.
//!
//! A task is only invoked while `needs_to_run` holds; after one successful run
//! the predicate must turn false.

pub mod banned_instances;
pub mod job_deadlines;
pub mod parent_child;
pub mod process_cache;

pub use banned_instances::BannedInstancesMigration;
pub use job_deadlines::JobDeadlineIndexMigration;
pub use parent_child::ParentChildIndexMigration;
pub use process_cache::{LegacyProcess, ProcessCacheMigration};

use crate::core::{EngineError, Result};
use crate::state::ProcessingState;
use tracing::{Level, event, info_span};

pub trait MigrationTask: Send + Sync {
    fn identifier(&self) -> &'static str;

    fn needs_to_run(&self, state: &ProcessingState) -> Result<bool>;

    fn run_migration(&self, state: &ProcessingState) -> Result<()>;
}

/// Runs the registered migrations in registration order, each in its own transaction.
pub struct DbMigrator {
    tasks: Vec<Box<dyn MigrationTask>>,
}

impl DbMigrator {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn with_default_tasks() -> Self {
        let mut migrator = Self::new();
        migrator.register(Box::new(BannedInstancesMigration));
        migrator.register(Box::new(ProcessCacheMigration));
        migrator.register(Box::new(ParentChildIndexMigration));
        migrator.register(Box::new(JobDeadlineIndexMigration));
        migrator
    }

    pub fn register(&mut self, task: Box<dyn MigrationTask>) {
        self.tasks.push(task);
    }

    pub fn identifiers(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|task| task.identifier()).collect()
    }

    /// Returns the identifiers of the migrations that ran.
    pub fn run_migrations(&self, state: &ProcessingState) -> Result<Vec<&'static str>> {
        let mut executed = Vec::new();
        for task in &self.tasks {
            let span = info_span!("migration", task = task.identifier());
            let _guard = span.enter();

            if !task.needs_to_run(state)? {
                event!(Level::DEBUG, "migration not needed");
                continue;
            }
            event!(Level::INFO, "running migration");
            state
                .context()
                .run_in_transaction(|| task.run_migration(state))
                .map_err(|err| EngineError::Migration {
                    task: task.identifier().to_string(),
                    reason: err.to_string(),
                })?;
            executed.push(task.identifier());
        }
        Ok(executed)
    }
}

impl Default for DbMigrator {
    fn default() -> Self {
        Self::with_default_tasks()
    }
}
