#[path = "engine_utils.rs"]
mod engine_utils;

use engine_utils::{START_TIME, TestEngine, process_record};
use procflow::core::{EngineError, Key};
use procflow::model::ProcessBuilder;
use procflow::processing::clock::ClockProcessor;
use procflow::processing::creation::CreateProcessInstanceProcessor;
use procflow::processing::deployment::DeploymentCreateProcessor;
use procflow::processing::incident::ResolveIncidentProcessor;
use procflow::processing::job::{ActivateJobsProcessor, JobCommandProcessor};
use procflow::processing::process_instance::ProcessInstanceCommandProcessor;
use procflow::processing::signal::BroadcastSignalProcessor;
use procflow::processing::timer::TriggerTimerProcessor;
use procflow::processing::{
    ProcessingContext, ProcessingResult, ProcessorRegistry, TypedRecordProcessor,
};
use procflow::record::{
    DeploymentIntent, DeploymentRecord, ErrorIntent, Intent, JobIntent, JobRecord,
    ProcessInstanceCreationIntent, ProcessInstanceCreationRecord, ProcessInstanceIntent, Record,
    RejectionType, TimerIntent,
};
use procflow::scheduler::{ManualClock, ManualScheduler, StreamClock};
use procflow::stream::open_storage;
use procflow::{EngineConfig, StreamProcessor};
use std::sync::Arc;
use tempfile::tempdir;

fn deploy_models(engine: &mut TestEngine) {
    engine.deploy(
        ProcessBuilder::new("order")
            .start_event("start")
            .service_task("pack", "packing")
            .timer_catch_event("cool_down", 2_000)
            .signal_catch_event("wait_for_pickup", "pickup")
            .end_event("end")
            .build()
            .unwrap(),
    );
    engine.deploy(
        ProcessBuilder::new("refund")
            .start_event("start")
            .service_task_with_retries("pay_back", "refunding", 1)
            .end_event("end")
            .build()
            .unwrap(),
    );
}

/// Exercises jobs, incidents, timers, signals and rejections.
fn run_scenario(engine: &mut TestEngine) -> Vec<Key> {
    deploy_models(engine);
    let first = engine.create_instance("order");
    let second = engine.create_instance("order");
    let refund = engine.create_instance("refund");

    let packing = engine.activate_jobs("packing", 5_000).job_keys;
    engine.job_command(packing[0], JobIntent::Complete, JobRecord::default());

    let refunding = engine.activate_jobs("refunding", 5_000).job_keys;
    engine.job_command(
        refunding[0],
        JobIntent::Fail,
        JobRecord {
            retries: 0,
            error_message: "bank offline".into(),
            ..Default::default()
        },
    );
    engine.job_command(9_999, JobIntent::Complete, JobRecord::default());

    // the second packing job times out, the first instance's timer fires
    engine.advance_time(6_000);
    engine.cancel(second);
    engine.broadcast("pickup");
    vec![first, second, refund]
}

#[test]
fn test_same_commands_produce_same_state_and_records() {
    let mut left = TestEngine::new();
    let mut right = TestEngine::new();
    let left_keys = run_scenario(&mut left);
    let right_keys = run_scenario(&mut right);

    assert_eq!(left_keys, right_keys);
    assert_eq!(left.records(), right.records());
    assert_eq!(left.processor.db().contents().unwrap(), right.processor.db().contents().unwrap());
}

#[test]
fn test_scenario_reaches_expected_end_state() {
    let mut engine = TestEngine::new();
    let keys = run_scenario(&mut engine);

    assert!(engine.has_completed(keys[0]));
    assert!(engine.has_terminated(keys[1]));
    assert!(!engine.has_completed(keys[2]));
    assert_eq!(engine.events_with(JobIntent::TimedOut).len(), 1);
    assert_eq!(engine.events_with(TimerIntent::Triggered).len(), 1);

    let query = engine.processor.query();
    assert_eq!(query.incident_count().unwrap(), 1);
    assert_eq!(query.element_instances_of(keys[2]).unwrap().len(), 2);
}

#[test]
fn test_replaying_the_log_into_a_fresh_store_restores_the_state() {
    let mut engine = TestEngine::new();
    run_scenario(&mut engine);
    let expected = engine.processor.db().contents().unwrap();
    let highest_key = engine.records().iter().map(|record| record.key).max().unwrap();

    let mut replayed = engine.replay_into_fresh_store();
    assert_eq!(replayed.processor.db().contents().unwrap(), expected);
    assert!(replayed.processor.metrics().replayed_events > 0);
    assert_eq!(
        replayed.processor.last_processed_position().unwrap(),
        engine.processor.last_processed_position().unwrap()
    );

    // nothing is processed twice, and new keys continue after the replayed ones
    let records_before = replayed.records().len();
    assert_eq!(replayed.processor.process_available().unwrap(), 0);
    assert_eq!(replayed.records().len(), records_before);
    let next = replayed.create_instance("refund");
    assert!(next > highest_key);
}

#[test]
fn test_restart_from_data_dir_continues_processing() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::default().data_dir(dir.path()).checkpoint_threshold(5);

    let (first, job_key) = {
        let (db, log) = open_storage(&config).unwrap();
        let mut engine = TestEngine::open(config.clone(), db, log, ManualClock::new(START_TIME));
        deploy_models(&mut engine);
        let first = engine.create_instance("order");
        let job_key = engine.activate_jobs("packing", 60_000).job_keys[0];
        engine.processor.checkpoint().unwrap();
        engine.job_command(job_key, JobIntent::Complete, JobRecord::default());
        (first, job_key)
    };

    let (db, log) = open_storage(&config).unwrap();
    let mut engine = TestEngine::open(config, db, log, ManualClock::new(START_TIME));
    let query = engine.processor.query();
    assert_eq!(query.process_count().unwrap(), 2);
    assert!(query.job(job_key).unwrap().is_none());
    assert_eq!(query.timer_count().unwrap(), 1);

    // the timer created before the restart still fires
    engine.advance_time(2_000);
    assert_eq!(engine.events_with(TimerIntent::Triggered).len(), 1);
    engine.broadcast("pickup");
    assert!(engine.has_completed(first));
}

/// Fails every cancel with an unexpected error.
struct BrokenCancelProcessor;

impl TypedRecordProcessor for BrokenCancelProcessor {
    fn name(&self) -> &'static str {
        "BrokenCancelProcessor"
    }

    fn can_handle(&self, intent: Intent) -> bool {
        intent == Intent::from(ProcessInstanceIntent::Cancel)
    }

    fn process_record(
        &self,
        _command: &Record,
        _context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        Err(EngineError::illegal_state("cancel is broken").into())
    }
}

fn registry_with_broken_cancel() -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();
    registry.register(Box::new(BrokenCancelProcessor));
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

#[test]
fn test_banned_instance_stays_banned_after_restart() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::default().data_dir(dir.path());
    let clock = ManualClock::new(START_TIME);

    let banned = {
        let (db, log) = open_storage(&config).unwrap();
        let scheduler = ManualScheduler::new(Arc::new(clock.clone()));
        let mut processor = StreamProcessor::open_with_registry(
            config.clone(),
            db,
            log,
            StreamClock::new(Arc::new(clock.clone())),
            Arc::new(scheduler),
            registry_with_broken_cancel(),
        )
        .unwrap();

        let model = ProcessBuilder::new("order")
            .start_event("start")
            .service_task("pack", "packing")
            .end_event("end")
            .build()
            .unwrap();
        processor
            .write_command(
                Record::command(
                    DeploymentIntent::Create,
                    DeploymentRecord {
                        processes: vec![model],
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
                        bpmn_process_id: "order".into(),
                        ..Default::default()
                    },
                )
                .with_request(2, 0),
            )
            .unwrap();
        processor.process_available().unwrap();
        let pik = processor.take_responses()[1].key;

        processor
            .write_command(
                Record::command_with_key(pik, ProcessInstanceIntent::Cancel, process_record(pik))
                    .with_request(3, 0),
            )
            .unwrap();
        processor.process_available().unwrap();

        let response = processor.take_responses().pop().unwrap();
        assert_eq!(response.rejection_type, Some(RejectionType::ProcessingError));
        assert!(processor.query().is_banned(pik).unwrap());
        assert_eq!(processor.metrics().banned_instances, 1);
        pik
    };

    let (db, log) = open_storage(&config).unwrap();
    let mut engine = TestEngine::open(config, db, log, clock);
    assert!(engine.processor.query().is_banned(banned).unwrap());
    assert_eq!(engine.processor.metrics().banned_instances, 1);
    assert_eq!(engine.events_with(ErrorIntent::Created).len(), 1);

    // jobs of the banned instance are not handed out, commands for it are refused
    assert!(engine.activate_jobs("packing", 5_000).job_keys.is_empty());
    let refused = engine.cancel(banned);
    assert_eq!(refused.rejection_type, Some(RejectionType::InvalidState));

    // other instances are unaffected
    let other = engine.create_instance("order");
    assert!(!engine.processor.query().is_banned(other).unwrap());
    assert_eq!(engine.activate_jobs("packing", 5_000).job_keys.len(), 1);
}
