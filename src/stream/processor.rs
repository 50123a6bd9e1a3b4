//! The stream processor of one partition.
//!
//! On open it runs the migrations, restores the clock and replays the log into
//! state. Afterwards it reads commands in position order and processes each one
//! in its own transaction, together with the follow-up commands it wrote, up to
//! the configured batch size. Due-date checkers turn due timers and timed-out
//! jobs into commands on the same log.

use super::log::LogStream;
use super::metrics::ProcessingMetrics;
use super::query::QueryService;
use crate::config::EngineConfig;
use crate::core::{EngineError, NO_POSITION, Position, Result, Timestamp};
use crate::db::Db;
use crate::migration::DbMigrator;
use crate::processing::{
    DueDateScan, EventAppliers, ProcessingContext, ProcessingError, ProcessingResult,
    ProcessingResultBuilder, ProcessorRegistry, ScheduledCommandCache, find_due_timers,
    find_timed_out_jobs,
};
use crate::record::{
    ErrorIntent, ErrorRecord, Intent, JobIntent, Record, RejectionType, Response, TimerIntent,
};
use crate::scheduler::{DueDateChecker, ScheduleService, ScheduledTask, StreamClock, TaskHandle};
use crate::state::ProcessingState;
use std::sync::Arc;
use tracing::{Level, event, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Processing,
    Paused,
    /// Writing to the log or committing state failed; nothing is processed anymore.
    Failed,
}

/// Records, responses and due dates of one initial command and the follow-ups
/// processed with it.
#[derive(Debug, Default)]
struct Batch {
    records: Vec<Record>,
    responses: Vec<Response>,
    due_dates: Vec<(ScheduledTask, Timestamp)>,
    processed: u64,
    skipped: u64,
}

impl Batch {
    fn absorb(&mut self, outcome: CommandOutcome) {
        match outcome {
            CommandOutcome::Processed(result) => {
                self.processed += 1;
                self.add(result);
            }
            CommandOutcome::Refused(result) => {
                self.skipped += 1;
                self.add(result);
            }
            CommandOutcome::Skipped => self.skipped += 1,
        }
    }

    fn add(&mut self, result: ProcessingResultBuilder) {
        self.records.extend(result.records);
        self.responses.extend(result.response);
        self.due_dates.extend(result.due_dates);
    }
}

enum CommandOutcome {
    Processed(ProcessingResultBuilder),
    /// Rejected without a processor run.
    Refused(ProcessingResultBuilder),
    Skipped,
}

pub struct StreamProcessor {
    config: EngineConfig,
    db: Db,
    state: ProcessingState,
    appliers: EventAppliers,
    registry: ProcessorRegistry,
    log: LogStream,
    clock: StreamClock,
    timer_checker: DueDateChecker,
    job_checker: DueDateChecker,
    command_cache: ScheduledCommandCache,
    metrics: ProcessingMetrics,
    responses: Vec<Response>,
    phase: Phase,
    next_read_position: Position,
}

impl StreamProcessor {
    pub fn open(
        config: EngineConfig,
        db: Db,
        log: LogStream,
        clock: StreamClock,
        scheduler: Arc<dyn ScheduleService>,
    ) -> Result<Self> {
        let registry = ProcessorRegistry::with_default_processors();
        Self::open_with_registry(config, db, log, clock, scheduler, registry)
    }

    /// Opens storage as configured (in memory or below `data_dir`) and the processor on top of it.
    pub fn open_from_config(
        config: EngineConfig,
        clock: StreamClock,
        scheduler: Arc<dyn ScheduleService>,
    ) -> Result<Self> {
        let (db, log) = super::open_storage(&config)?;
        Self::open(config, db, log, clock, scheduler)
    }

    pub fn open_with_registry(
        config: EngineConfig,
        db: Db,
        log: LogStream,
        clock: StreamClock,
        scheduler: Arc<dyn ScheduleService>,
        registry: ProcessorRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let log_partition = log.partition_id()?;
        if log_partition != config.partition_id {
            return Err(EngineError::Config(format!(
                "Expected a log of partition {}, but got one of partition {}",
                config.partition_id, log_partition
            )));
        }

        let state = ProcessingState::new(db.create_context(), config.partition_id);
        let migrated = DbMigrator::with_default_tasks().run_migrations(&state)?;
        clock.apply_modification(state.clock.get_modification()?)?;

        let resolution = config.timer_resolution_ms;
        let mut processor = Self {
            appliers: EventAppliers::with_default_appliers(clock.clone()),
            timer_checker: DueDateChecker::new(
                ScheduledTask::TriggerTimers,
                resolution,
                clock.clone(),
            ),
            job_checker: DueDateChecker::new(ScheduledTask::TimeOutJobs, resolution, clock.clone()),
            command_cache: ScheduledCommandCache::new(),
            metrics: ProcessingMetrics::new(),
            responses: Vec::new(),
            phase: Phase::Processing,
            next_read_position: 1,
            config,
            db,
            state,
            registry,
            log,
            clock,
        };
        processor.replay()?;

        processor.timer_checker.on_recovered(Arc::clone(&scheduler))?;
        processor.job_checker.on_recovered(scheduler)?;
        processor.metrics.banned_instances = processor
            .state
            .banned_instances
            .get_banned_process_instance_keys()?
            .len() as u64;

        event!(
            Level::INFO,
            partition_id = processor.config.partition_id,
            migrations = ?migrated,
            next_position = processor.next_read_position,
            banned_instances = processor.metrics.banned_instances,
            "stream processor opened"
        );
        Ok(processor)
    }

    /// Re-applies the events the committed state has not seen yet and restores
    /// the key generator and the last processed position from the log.
    fn replay(&mut self) -> Result<()> {
        let span = info_span!("replay", partition_id = self.config.partition_id);
        let _entered = span.enter();

        let snapshot_position = self
            .state
            .last_processed_position
            .get_last_successful_processed_record_position()?;
        // earlier records are covered by the recovered state, their keys included
        let records = self.log.read_from(snapshot_position.max(0) + 1)?;
        let mut last_processed = snapshot_position;
        let mut replayed = 0u64;

        let context = Arc::clone(self.state.context());
        context.run_in_transaction(|| -> Result<()> {
            for record in &records {
                self.state.key_generator.set_key_if_higher(record.key)?;
                if record.is_command() || record.source_record_position <= snapshot_position {
                    continue;
                }
                if record.is_event() {
                    self.appliers
                        .apply_state(&self.state, record.key, record.intent, &record.value)?;
                    replayed += 1;
                }
                last_processed = last_processed.max(record.source_record_position);
            }
            if last_processed > snapshot_position {
                self.state.last_processed_position.mark_as_processed(last_processed)?;
            }
            Ok(())
        })?;

        // Due-date commands that are still waiting in the log must not be written twice.
        for record in records.iter().filter(|record| {
            record.is_command() && !record.processed && record.position > last_processed
        }) {
            if is_scheduled_command(record.intent) {
                self.command_cache.add(record.intent, record.key)?;
            }
        }

        self.next_read_position = last_processed.max(0) + 1;
        self.metrics.replayed_events += replayed;
        event!(
            Level::INFO,
            replayed,
            last_processed,
            log_length = records.len(),
            "replay finished"
        );
        Ok(())
    }

    /// Appends a command to the log. It is processed by a later `process_next`.
    pub fn write_command(&mut self, command: Record) -> Result<Position> {
        if !command.is_command() {
            return Err(EngineError::illegal_state(format!(
                "Expected to write a command, but got {}",
                command.record_type
            )));
        }
        let mut command = command;
        command.timestamp = self.clock.millis()?;
        command.source_record_position = NO_POSITION;
        command.processed = false;
        let written = self.log.append(vec![command])?;
        written
            .first()
            .map(|record| record.position)
            .ok_or_else(|| EngineError::illegal_state("Log append returned no record"))
    }

    /// Processes the next unprocessed command. Returns `false` if there was none
    /// or the processor is paused.
    pub fn process_next(&mut self) -> Result<bool> {
        match self.phase {
            Phase::Paused => return Ok(false),
            Phase::Failed => {
                return Err(EngineError::illegal_state(
                    "Stream processor failed earlier and does not process commands",
                ));
            }
            Phase::Processing => {}
        }
        let Some(command) = self.next_command()? else {
            return Ok(false);
        };
        if let Err(err) = self.process_command(command) {
            self.phase = Phase::Failed;
            event!(Level::ERROR, error = %err, "stream processor failed");
            return Err(err);
        }
        Ok(true)
    }

    /// Processes commands until none is left. Returns how many initial commands were handled.
    pub fn process_available(&mut self) -> Result<usize> {
        let mut count = 0;
        while self.process_next()? {
            count += 1;
        }
        Ok(count)
    }

    fn next_command(&mut self) -> Result<Option<Record>> {
        while let Some(record) = self.log.record(self.next_read_position)? {
            self.next_read_position += 1;
            if record.is_command() && !record.processed {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn process_command(&mut self, command: Record) -> Result<()> {
        let span = info_span!(
            "process_command",
            position = command.position,
            intent = %command.intent,
            key = command.key
        );
        let _entered = span.enter();

        self.command_cache.remove(command.intent, command.key)?;
        let now = self.clock.millis()?;
        let max = self.config.max_commands_in_batch;

        let mut result = self.process_batch(&command, max, now);
        if max > 1 {
            if let Err(err) = &result {
                event!(Level::DEBUG, error = %err, "batch failed, processing the command alone");
                result = self.process_batch(&command, 1, now);
            }
        }

        match result {
            Ok(batch) => self.commit_batch(batch),
            Err(ProcessingError::Failure { rejection_type, reason }) => {
                event!(Level::DEBUG, %rejection_type, %reason, "command failed");
                self.write_in_new_transaction(&command, now, |context| {
                    context.reject(&command, rejection_type, reason);
                    Ok(())
                })
            }
            Err(ProcessingError::Engine(error)) => self.on_processing_error(&command, error, now),
        }
    }

    /// Runs the command and its follow-ups in one transaction that is left open
    /// on success and rolled back on error.
    fn process_batch(
        &self,
        command: &Record,
        max: usize,
        now: Timestamp,
    ) -> ProcessingResult<Batch> {
        self.state.context().begin()?;
        match self.run_batch(command, max, now) {
            Ok(batch) => Ok(batch),
            Err(err) => {
                self.roll_back()?;
                Err(err)
            }
        }
    }

    /// Rolls back the open transaction. Clock appliers change the stream clock
    /// right away, so it is put back to the modification that stays persisted.
    fn roll_back(&self) -> Result<()> {
        self.state.context().rollback()?;
        self.clock.apply_modification(self.state.clock.get_modification()?)
    }

    fn run_batch(&self, command: &Record, max: usize, now: Timestamp) -> ProcessingResult<Batch> {
        let mut batch = Batch::default();
        batch.absorb(self.process_single(command, now)?);

        let mut commands_in_batch = 1;
        let mut cursor = 0;
        while commands_in_batch < max {
            let Some(index) =
                (cursor..batch.records.len()).find(|&index| batch.records[index].is_command())
            else {
                break;
            };
            cursor = index + 1;
            batch.records[index].processed = true;
            let follow_up = batch.records[index].clone();
            batch.absorb(self.process_single(&follow_up, now)?);
            commands_in_batch += 1;
        }

        self.seal_batch(command, &mut batch)?;
        Ok(batch)
    }

    fn process_single(&self, command: &Record, now: Timestamp) -> ProcessingResult<CommandOutcome> {
        let mut context = ProcessingContext::new(&self.state, &self.appliers, now);

        if self.state.banned_instances.is_banned(command)? {
            if !command.has_request() {
                event!(
                    Level::DEBUG,
                    position = command.position,
                    "skipped command of banned instance"
                );
                return Ok(CommandOutcome::Skipped);
            }
            let process_instance_key = command.process_instance_key().unwrap_or_default();
            context.reject(
                command,
                RejectionType::InvalidState,
                format!(
                    "Expected to process command for process instance '{}', \
                     but the instance is banned",
                    process_instance_key
                ),
            );
            return Ok(CommandOutcome::Refused(context.into_result()));
        }

        match self.registry.find(command.intent) {
            Some(processor) => {
                event!(Level::TRACE, processor = processor.name(), "processing command");
                processor.process_record(command, &mut context)?;
                Ok(CommandOutcome::Processed(context.into_result()))
            }
            None if command.has_request() => {
                context.reject(
                    command,
                    RejectionType::InvalidArgument,
                    format!(
                        "Expected a command that can be processed, but no processor handles {}",
                        command.intent
                    ),
                );
                Ok(CommandOutcome::Refused(context.into_result()))
            }
            None => {
                event!(Level::DEBUG, intent = %command.intent, "no processor for command");
                Ok(CommandOutcome::Skipped)
            }
        }
    }

    /// Every record of a batch descends from the initial command, which becomes
    /// the last processed position once the batch commits.
    fn seal_batch(&self, command: &Record, batch: &mut Batch) -> Result<()> {
        for record in &mut batch.records {
            record.source_record_position = command.position;
        }
        self.state.last_processed_position.mark_as_processed(command.position)
    }

    /// Writes the batch to the log, then commits the open transaction.
    fn commit_batch(&mut self, batch: Batch) -> Result<()> {
        let written = match self.log.append(batch.records) {
            Ok(written) => written,
            Err(err) => {
                self.roll_back()?;
                return Err(err);
            }
        };
        self.state.context().commit()?;

        self.metrics.batches += 1;
        self.metrics.processed_commands += batch.processed;
        self.metrics.skipped_commands += batch.skipped;
        let rejections = written.iter().filter(|record| record.is_rejection()).count();
        self.metrics.rejections += rejections as u64;
        self.responses.extend(batch.responses);
        for (task, due_date) in batch.due_dates {
            self.checker_mut(task).schedule(due_date)?;
        }
        event!(Level::DEBUG, records = written.len(), "batch committed");
        Ok(())
    }

    /// Writes what `build` appends in a transaction of its own. Used after the
    /// processing transaction was rolled back.
    fn write_in_new_transaction<T>(
        &mut self,
        command: &Record,
        now: Timestamp,
        build: impl FnOnce(&mut ProcessingContext<'_>) -> Result<T>,
    ) -> Result<T> {
        self.state.context().begin()?;
        let built: Result<(T, Batch)> = (|| {
            let mut processing = ProcessingContext::new(&self.state, &self.appliers, now);
            let value = build(&mut processing)?;
            let mut batch = Batch::default();
            batch.add(processing.into_result());
            self.seal_batch(command, &mut batch)?;
            Ok((value, batch))
        })();
        match built {
            Ok((value, batch)) => {
                self.commit_batch(batch)?;
                Ok(value)
            }
            Err(err) => {
                self.roll_back()?;
                Err(err)
            }
        }
    }

    /// Bans the instance of a command that failed unexpectedly, if its intent asks
    /// for it, and rejects the command towards its client.
    fn on_processing_error(
        &mut self,
        command: &Record,
        error: EngineError,
        now: Timestamp,
    ) -> Result<()> {
        event!(
            Level::ERROR,
            position = command.position,
            intent = %command.intent,
            error = %error,
            "unexpected error while processing command"
        );
        self.metrics.processing_errors += 1;

        let message = format!(
            "Expected to process command '{} {}' without errors, but an error occurred: {}",
            command.value_type(),
            command.intent,
            error
        );
        let stacktrace = format!("{:?}", error);
        let banned = self.write_in_new_transaction(command, now, |context| {
            let state = context.state();
            let banned = state
                .banned_instances
                .try_to_ban_instance(command, |process_instance_key| {
                    context.append_event(
                        command.key,
                        ErrorIntent::Created,
                        ErrorRecord {
                            error_message: message.clone(),
                            stacktrace,
                            error_event_position: command.position,
                            process_instance_key,
                        },
                    )
                })?;
            if command.has_request() {
                context.reject(command, RejectionType::ProcessingError, message.clone());
            }
            Ok(banned)
        })?;
        if banned {
            self.metrics.banned_instances += 1;
        }
        Ok(())
    }

    /// Runs a due-date check that was scheduled earlier. Due entities become
    /// commands on the log; the checker re-arms for the next due date.
    pub fn run_scheduled_task(&mut self, task: ScheduledTask, handle: TaskHandle) -> Result<()> {
        if self.phase == Phase::Failed {
            return Ok(());
        }
        let span = info_span!("due_date_check", %task);
        let _entered = span.enter();

        let limit = self.config.due_date_scan_limit;
        let state = &self.state;
        let log = &self.log;
        let command_cache = &self.command_cache;
        let checker = match task {
            ScheduledTask::TriggerTimers => &mut self.timer_checker,
            ScheduledTask::TimeOutJobs => &mut self.job_checker,
        };
        checker.execute(handle, |now| {
            let DueDateScan {
                commands,
                next_due_date,
            } = match task {
                ScheduledTask::TriggerTimers => find_due_timers(state, command_cache, now, limit)?,
                ScheduledTask::TimeOutJobs => {
                    find_timed_out_jobs(state, command_cache, now, limit)?
                }
            };
            if !commands.is_empty() {
                let commands: Vec<Record> = commands
                    .into_iter()
                    .map(|mut command| {
                        command.timestamp = now;
                        command
                    })
                    .collect();
                event!(Level::DEBUG, count = commands.len(), "writing due commands");
                log.append(commands)?;
            }
            Ok(next_due_date)
        })
    }

    fn checker_mut(&mut self, task: ScheduledTask) -> &mut DueDateChecker {
        match task {
            ScheduledTask::TriggerTimers => &mut self.timer_checker,
            ScheduledTask::TimeOutJobs => &mut self.job_checker,
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.phase == Phase::Processing {
            self.phase = Phase::Paused;
            self.timer_checker.on_paused()?;
            self.job_checker.on_paused()?;
            event!(Level::INFO, "stream processor paused");
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.phase == Phase::Paused {
            self.phase = Phase::Processing;
            self.timer_checker.on_resumed()?;
            self.job_checker.on_resumed()?;
            event!(Level::INFO, "stream processor resumed");
        }
        Ok(())
    }

    /// Responses collected since the last call.
    pub fn take_responses(&mut self) -> Vec<Response> {
        std::mem::take(&mut self.responses)
    }

    pub fn query(&self) -> QueryService {
        QueryService::new(&self.db, self.config.partition_id)
    }

    /// Writes a state snapshot, then releases the log records it covers from memory.
    pub fn checkpoint(&self) -> Result<()> {
        self.db.checkpoint()?;
        let released = self.log.release_through(self.last_processed_position()?)?;
        event!(Level::DEBUG, released, "log records released after checkpoint");
        Ok(())
    }

    pub fn metrics(&self) -> &ProcessingMetrics {
        &self.metrics
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn log(&self) -> &LogStream {
        &self.log
    }

    pub fn clock(&self) -> &StreamClock {
        &self.clock
    }

    pub fn last_processed_position(&self) -> Result<Position> {
        self.state
            .last_processed_position
            .get_last_successful_processed_record_position()
    }

    pub fn command_cache(&self) -> &ScheduledCommandCache {
        &self.command_cache
    }

    pub fn timer_checker(&self) -> &DueDateChecker {
        &self.timer_checker
    }

    pub fn job_checker(&self) -> &DueDateChecker {
        &self.job_checker
    }
}

fn is_scheduled_command(intent: Intent) -> bool {
    matches!(intent, Intent::Timer(TimerIntent::Trigger) | Intent::Job(JobIntent::TimeOut))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Key;
    use crate::model::ProcessBuilder;
    use crate::processing::TypedRecordProcessor;
    use crate::record::{
        ClockIntent, ClockRecord, DeploymentIntent, DeploymentRecord, JobRecord,
        ProcessInstanceCreationIntent, ProcessInstanceCreationRecord, RecordType,
    };
    use crate::scheduler::{ClockModification, ManualClock, ManualScheduler};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn open(config: EngineConfig, registry: ProcessorRegistry) -> StreamProcessor {
        let clock = ManualClock::new(1_000);
        let scheduler = ManualScheduler::new(Arc::new(clock.clone()));
        StreamProcessor::open_with_registry(
            config.clone(),
            Db::in_memory(),
            LogStream::in_memory(config.partition_id),
            StreamClock::new(Arc::new(clock)),
            Arc::new(scheduler),
            registry,
        )
        .unwrap()
    }

    fn deploy_and_create(processor: &mut StreamProcessor) -> Position {
        let process = ProcessBuilder::new("straight")
            .start_event("start")
            .end_event("end")
            .build()
            .unwrap();
        processor
            .write_command(
                Record::command(
                    DeploymentIntent::Create,
                    DeploymentRecord {
                        processes: vec![process],
                        ..Default::default()
                    },
                )
                .with_request(1, 0),
            )
            .unwrap();
        processor
            .write_command(
                Record::command(
                    ProcessInstanceCreationIntent::Create,
                    ProcessInstanceCreationRecord {
                        bpmn_process_id: "straight".into(),
                        ..Default::default()
                    },
                )
                .with_request(2, 0),
            )
            .unwrap()
    }

    struct FailingJobProcessor {
        calls: Arc<AtomicUsize>,
    }

    impl TypedRecordProcessor for FailingJobProcessor {
        fn name(&self) -> &'static str {
            "failing-job"
        }

        fn can_handle(&self, intent: Intent) -> bool {
            matches!(intent, Intent::Job(_))
        }

        fn process_record(
            &self,
            _command: &Record,
            _context: &mut ProcessingContext<'_>,
        ) -> ProcessingResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::illegal_state("job state is corrupted").into())
        }
    }

    fn complete_job_of(process_instance_key: Key) -> Record {
        Record::command_with_key(
            5,
            JobIntent::Complete,
            JobRecord {
                process_instance_key,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_follow_up_commands_are_processed_in_one_batch() {
        let registry = ProcessorRegistry::with_default_processors();
        let mut processor = open(EngineConfig::default(), registry);
        let create_position = deploy_and_create(&mut processor);

        assert_eq!(processor.process_available().unwrap(), 2);
        assert_eq!(processor.last_processed_position().unwrap(), create_position);
        assert_eq!(processor.query().element_instance_count().unwrap(), 0);

        // both commands were written up front, so the deployment's batch comes first
        let (created, deployed): (Vec<Record>, Vec<Record>) = processor
            .log()
            .read_from(create_position + 1)
            .unwrap()
            .into_iter()
            .partition(|record| record.source_record_position == create_position);
        assert!(deployed.iter().all(|record| record.source_record_position == create_position - 1));
        assert!(created.iter().any(|record| record.is_command()));
        assert!(
            created
                .iter()
                .filter(|record| record.is_command())
                .all(|record| record.processed)
        );
        let first_created = create_position + 1 + deployed.len() as Position;
        let first_created = processor.log().record(first_created).unwrap().unwrap();
        assert_eq!(first_created.source_record_position, create_position);
        assert_eq!(processor.take_responses().len(), 2);
    }

    #[test]
    fn test_batch_of_one_leaves_follow_ups_to_later_reads() {
        let config = EngineConfig::default().max_commands_in_batch(1);
        let mut processor = open(config, ProcessorRegistry::with_default_processors());
        deploy_and_create(&mut processor);

        assert!(processor.process_next().unwrap());
        assert!(processor.process_next().unwrap());
        assert!(processor.query().element_instance_count().unwrap() == 0);
        assert!(processor.process_available().unwrap() > 0);
        assert_eq!(processor.query().element_instance_count().unwrap(), 0);
        assert!(
            processor
                .log()
                .records()
                .unwrap()
                .iter()
                .filter(|record| record.is_command())
                .all(|record| !record.processed)
        );
    }

    #[test]
    fn test_unexpected_error_bans_instance_and_skips_its_later_commands() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ProcessorRegistry::new();
        registry.register(Box::new(FailingJobProcessor {
            calls: Arc::clone(&calls),
        }));
        let mut processor = open(EngineConfig::default(), registry);

        let failed = processor.write_command(complete_job_of(77).with_request(9, 0)).unwrap();
        processor.process_available().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(processor.query().is_banned(77).unwrap());
        assert_eq!(processor.metrics().banned_instances, 1);
        let written = processor.log().read_from(failed + 1).unwrap();
        assert_eq!(written[0].intent, Intent::Error(ErrorIntent::Created));
        assert_eq!(written[1].rejection_type, Some(RejectionType::ProcessingError));
        assert_eq!(processor.last_processed_position().unwrap(), failed);

        processor.write_command(complete_job_of(77).with_request(10, 0)).unwrap();
        processor.write_command(complete_job_of(77)).unwrap();
        processor.process_available().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let responses = processor.take_responses();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1].record_type, RecordType::CommandRejection);
        assert_eq!(responses[1].rejection_type, Some(RejectionType::InvalidState));
        assert_eq!(processor.metrics().skipped_commands, 2);
    }

    #[test]
    fn test_command_without_processor_is_rejected_only_with_request() {
        let mut processor = open(EngineConfig::default(), ProcessorRegistry::new());
        processor.write_command(complete_job_of(1)).unwrap();
        processor.write_command(complete_job_of(1).with_request(4, 0)).unwrap();
        processor.process_available().unwrap();

        let responses = processor.take_responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].rejection_type, Some(RejectionType::InvalidArgument));
        assert_eq!(processor.metrics().rejections, 1);
    }

    /// Pins the clock, then fails before the batch can commit.
    struct PinThenFailProcessor;

    impl TypedRecordProcessor for PinThenFailProcessor {
        fn name(&self) -> &'static str {
            "pin-then-fail"
        }

        fn can_handle(&self, intent: Intent) -> bool {
            intent == Intent::from(ClockIntent::Pin)
        }

        fn process_record(
            &self,
            command: &Record,
            context: &mut ProcessingContext<'_>,
        ) -> ProcessingResult<()> {
            let time = command.value.as_clock().map(|value| value.time).unwrap_or_default();
            context.append_event(1, ClockIntent::Pinned, ClockRecord { time })?;
            Err(EngineError::illegal_state("clock store is unavailable").into())
        }
    }

    #[test]
    fn test_rolled_back_pin_leaves_the_clock_alone() {
        let mut registry = ProcessorRegistry::new();
        registry.register(Box::new(PinThenFailProcessor));
        let mut processor = open(EngineConfig::default(), registry);

        let pin = Record::command(ClockIntent::Pin, ClockRecord { time: 42 }).with_request(3, 0);
        processor.write_command(pin).unwrap();
        processor.process_available().unwrap();

        let responses = processor.take_responses();
        assert_eq!(responses[0].rejection_type, Some(RejectionType::ProcessingError));
        assert_eq!(processor.state.clock.get_modification().unwrap(), ClockModification::None);
        assert_eq!(processor.clock().modification().unwrap(), ClockModification::None);
        assert_eq!(processor.clock().millis().unwrap(), 1_000);
    }

    #[test]
    fn test_paused_processor_reads_nothing() {
        let registry = ProcessorRegistry::with_default_processors();
        let mut processor = open(EngineConfig::default(), registry);
        deploy_and_create(&mut processor);
        processor.pause().unwrap();
        assert_eq!(processor.process_available().unwrap(), 0);
        assert_eq!(processor.phase(), Phase::Paused);

        processor.resume().unwrap();
        assert_eq!(processor.process_available().unwrap(), 2);
    }

    #[test]
    fn test_only_commands_can_be_written() {
        let mut processor = open(EngineConfig::default(), ProcessorRegistry::new());
        let event = Record::event(
            1,
            ErrorIntent::Created,
            ErrorRecord {
                error_message: "boom".into(),
                stacktrace: String::new(),
                error_event_position: 1,
                process_instance_key: 2,
            },
        );
        assert!(processor.write_command(event).is_err());
    }
}
