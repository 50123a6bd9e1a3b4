#[path = "engine_utils.rs"]
mod engine_utils;

use engine_utils::TestEngine;
use procflow::model::ProcessBuilder;
use procflow::record::{
    ErrorType, IncidentIntent, Intent, JobBatchIntent, JobBatchRecord, JobIntent, JobRecord, Record,
    RecordType, RejectionType,
};
use procflow::state::JobState;

fn deploy_single_task(engine: &mut TestEngine, retries: i32) {
    engine.deploy(
        ProcessBuilder::new("payment")
            .start_event("start")
            .service_task_with_retries("charge", "charge-card", retries)
            .end_event("end")
            .build()
            .unwrap(),
    );
}

#[test]
fn test_completing_the_job_completes_the_instance() {
    let mut engine = TestEngine::new();
    deploy_single_task(&mut engine, 3);
    let pik = engine.create_instance("payment");

    let batch = engine.activate_jobs("charge-card", 30_000);
    assert_eq!(batch.job_keys.len(), 1);
    let job = &batch.jobs[0];
    assert_eq!(job.retries, 3);
    assert_eq!(job.worker, "test-worker");
    assert_eq!(job.deadline, engine.clock_now() + 30_000);
    assert_eq!(job.process_instance_key, pik);

    let response = engine.job_command(batch.job_keys[0], JobIntent::Complete, JobRecord::default());
    assert_eq!(response.intent, Intent::from(JobIntent::Completed));
    assert!(engine.has_completed(pik));
    assert_eq!(engine.processor.query().job_count().unwrap(), 0);
}

#[test]
fn test_activated_job_is_not_handed_out_twice() {
    let mut engine = TestEngine::new();
    deploy_single_task(&mut engine, 3);
    engine.create_instance("payment");

    assert_eq!(engine.activate_jobs("charge-card", 30_000).job_keys.len(), 1);
    assert!(engine.activate_jobs("charge-card", 30_000).job_keys.is_empty());
    assert!(engine.activate_jobs("other-type", 30_000).job_keys.is_empty());
}

#[test]
fn test_invalid_activation_is_rejected() {
    let mut engine = TestEngine::new();
    let response = engine.execute(Record::command(
        JobBatchIntent::Activate,
        JobBatchRecord {
            job_type: "charge-card".into(),
            timeout: 0,
            max_jobs_to_activate: 1,
            ..Default::default()
        },
    ));
    assert_eq!(response.record_type, RecordType::CommandRejection);
    assert_eq!(response.rejection_type, Some(RejectionType::InvalidArgument));
}

#[test]
fn test_completing_unknown_job_is_rejected() {
    let mut engine = TestEngine::new();
    let response = engine.job_command(12345, JobIntent::Complete, JobRecord::default());
    assert_eq!(response.record_type, RecordType::CommandRejection);
    assert_eq!(response.rejection_type, Some(RejectionType::NotFound));
}

#[test]
fn test_failed_job_with_retries_left_is_activatable_again() {
    let mut engine = TestEngine::new();
    deploy_single_task(&mut engine, 3);
    engine.create_instance("payment");

    let job_key = engine.activate_jobs("charge-card", 30_000).job_keys[0];
    let response = engine.job_command(
        job_key,
        JobIntent::Fail,
        JobRecord {
            retries: 2,
            error_message: "card declined".into(),
            ..Default::default()
        },
    );
    assert_eq!(response.intent, Intent::from(JobIntent::Failed));

    let (state, job) = engine.processor.query().job(job_key).unwrap().unwrap();
    assert_eq!(state, JobState::Activatable);
    assert_eq!(job.retries, 2);
    assert_eq!(engine.activate_jobs("charge-card", 30_000).job_keys, vec![job_key]);
    assert!(engine.events_with(IncidentIntent::Created).is_empty());
}

#[test]
fn test_job_without_retries_raises_incident_until_retries_are_updated() {
    let mut engine = TestEngine::new();
    deploy_single_task(&mut engine, 1);
    let pik = engine.create_instance("payment");

    let job_key = engine.activate_jobs("charge-card", 30_000).job_keys[0];
    engine.job_command(
        job_key,
        JobIntent::Fail,
        JobRecord {
            retries: 0,
            error_message: "card declined".into(),
            ..Default::default()
        },
    );

    let incidents = engine.events_with(IncidentIntent::Created);
    assert_eq!(incidents.len(), 1);
    let incident_key = incidents[0].key;
    let incident = incidents[0].value.as_incident().unwrap().clone();
    assert_eq!(incident.error_type, ErrorType::JobNoRetries);
    assert_eq!(incident.job_key, job_key);
    assert_eq!(incident.error_message, "card declined");
    assert_eq!(incident.process_instance_key, pik);
    assert!(engine.activate_jobs("charge-card", 30_000).job_keys.is_empty());

    let resolve = Record::command_with_key(incident_key, IncidentIntent::Resolve, incident.clone());
    let rejected = engine.execute(resolve.clone());
    assert_eq!(rejected.rejection_type, Some(RejectionType::InvalidState));

    let updated = engine.job_command(
        job_key,
        JobIntent::UpdateRetries,
        JobRecord {
            retries: 2,
            ..Default::default()
        },
    );
    assert_eq!(updated.intent, Intent::from(JobIntent::RetriesUpdated));

    let resolved = engine.execute(resolve);
    assert_eq!(resolved.intent, Intent::from(IncidentIntent::Resolved));
    assert_eq!(engine.processor.query().incident_count().unwrap(), 0);

    let job_key_again = engine.activate_jobs("charge-card", 30_000).job_keys[0];
    assert_eq!(job_key_again, job_key);
    engine.job_command(job_key, JobIntent::Complete, JobRecord::default());
    assert!(engine.has_completed(pik));
}

#[test]
fn test_update_retries_requires_positive_amount() {
    let mut engine = TestEngine::new();
    deploy_single_task(&mut engine, 3);
    engine.create_instance("payment");
    let job_key = engine.activate_jobs("charge-card", 30_000).job_keys[0];

    let response = engine.job_command(
        job_key,
        JobIntent::UpdateRetries,
        JobRecord {
            retries: 0,
            ..Default::default()
        },
    );
    assert_eq!(response.rejection_type, Some(RejectionType::InvalidArgument));
}

#[test]
fn test_expired_activation_times_out_the_job() {
    let mut engine = TestEngine::new();
    deploy_single_task(&mut engine, 3);
    engine.create_instance("payment");

    let job_key = engine.activate_jobs("charge-card", 1_000).job_keys[0];
    assert!(engine.processor.job_checker().is_checker_running());

    engine.advance_time(500);
    assert!(engine.events_with(JobIntent::TimedOut).is_empty());

    engine.advance_time(600);
    let timed_out = engine.events_with(JobIntent::TimedOut);
    assert_eq!(timed_out.len(), 1);
    assert_eq!(timed_out[0].key, job_key);

    let (state, job) = engine.processor.query().job(job_key).unwrap().unwrap();
    assert_eq!(state, JobState::Activatable);
    assert_eq!(job.deadline, -1);
    assert!(engine.processor.command_cache().is_empty().unwrap());

    // another worker picks it up
    assert_eq!(engine.activate_jobs("charge-card", 1_000).job_keys, vec![job_key]);
}

#[test]
fn test_completed_job_does_not_time_out() {
    let mut engine = TestEngine::new();
    deploy_single_task(&mut engine, 3);
    engine.create_instance("payment");

    let job_key = engine.activate_jobs("charge-card", 1_000).job_keys[0];
    engine.job_command(job_key, JobIntent::Complete, JobRecord::default());

    engine.advance_time(5_000);
    assert!(engine.events_with(JobIntent::TimedOut).is_empty());
    assert!(
        engine
            .records()
            .iter()
            .all(|record| record.intent != Intent::from(JobIntent::TimeOut))
    );
}
