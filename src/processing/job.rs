use super::bpmn;
use super::context::ProcessingContext;
use super::error::{ProcessingError, ProcessingResult};
use super::registry::TypedRecordProcessor;
use crate::core::{EngineError, Key};
use crate::record::{
    ErrorType, Intent, JobBatchIntent, JobBatchRecord, JobIntent, JobRecord, ProcessInstanceIntent,
    Record, RejectionType,
};
use crate::scheduler::ScheduledTask;
use crate::state::JobState;

/// Handles the commands a worker (or the job time-out checker) sends for a single job.
pub struct JobCommandProcessor;

fn job_value(command: &Record) -> ProcessingResult<&JobRecord> {
    command
        .value
        .as_job()
        .ok_or_else(|| {
            let message = format!("Expected a job value for {}", command.intent);
            EngineError::illegal_state(message).into()
        })
}

impl JobCommandProcessor {
    fn require_job(
        context: &ProcessingContext<'_>,
        key: Key,
        action: &str,
    ) -> ProcessingResult<(JobRecord, JobState)> {
        let jobs = &context.state().jobs;
        match (jobs.get_job(key)?, jobs.get_state(key)?) {
            (Some(job), Some(state)) => Ok((job, state)),
            _ => Err(ProcessingError::failure(
                RejectionType::NotFound,
                format!("Expected to {} job with key '{}', but no such job was found", action, key),
            )),
        }
    }

    fn invalid_state(action: &str, key: Key, state: JobState) -> ProcessingError {
        ProcessingError::failure(
            RejectionType::InvalidState,
            format!(
                "Expected to {} job with key '{}', but it is in state {:?}",
                action, key, state
            ),
        )
    }

    fn complete(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        let (job, state) = Self::require_job(context, command.key, "complete")?;
        if !matches!(state, JobState::Activatable | JobState::Activated) {
            return Err(Self::invalid_state("complete", command.key, state));
        }

        context.append_event(command.key, JobIntent::Completed, job.clone())?;
        context.respond(command, command.key, JobIntent::Completed, job.clone());

        let instance = context
            .state()
            .element_instances
            .get_instance(job.element_instance_key)?;
        if let Some(instance) = instance {
            context.append_command(
                instance.key,
                ProcessInstanceIntent::CompleteElement,
                instance.value,
            );
        }
        Ok(())
    }

    fn fail(&self, command: &Record, context: &mut ProcessingContext<'_>) -> ProcessingResult<()> {
        let (mut job, state) = Self::require_job(context, command.key, "fail")?;
        if state != JobState::Activated {
            return Err(Self::invalid_state("fail", command.key, state));
        }
        let value = job_value(command)?;
        job.retries = value.retries;
        job.error_message = value.error_message.clone();

        context.append_event(command.key, JobIntent::Failed, job.clone())?;
        context.respond(command, command.key, JobIntent::Failed, job.clone());

        if job.retries <= 0 {
            let instance = context
                .state()
                .element_instances
                .require_instance(job.element_instance_key)?;
            let message = if job.error_message.is_empty() {
                "No more retries left.".to_string()
            } else {
                job.error_message.clone()
            };
            let error_type = ErrorType::JobNoRetries;
            bpmn::raise_incident(context, error_type, message, &instance, command.key)?;
        }
        Ok(())
    }

    fn throw_error(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        let (mut job, state) = Self::require_job(context, command.key, "throw an error for")?;
        if !matches!(state, JobState::Activatable | JobState::Activated) {
            return Err(Self::invalid_state("throw an error for", command.key, state));
        }
        let value = job_value(command)?;
        job.error_code = value.error_code.clone();
        job.error_message = value.error_message.clone();

        context.append_event(command.key, JobIntent::ErrorThrown, job.clone())?;
        context.respond(command, command.key, JobIntent::ErrorThrown, job.clone());

        bpmn::throw_error(
            context,
            job.element_instance_key,
            &job.error_code,
            &job.error_message,
            command.key,
        )?;
        Ok(())
    }

    fn time_out(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        let (job, state) = Self::require_job(context, command.key, "time out")?;
        let value = job_value(command)?;
        if state != JobState::Activated || job.deadline != value.deadline {
            return Err(ProcessingError::failure(
                RejectionType::InvalidState,
                format!(
                    "Expected to time out activated job with key '{}' and deadline {}, \
                     but it is no longer activated with that deadline",
                    command.key, value.deadline
                ),
            ));
        }
        context.append_event(command.key, JobIntent::TimedOut, job)?;
        Ok(())
    }

    fn update_retries(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        let value = job_value(command)?;
        if value.retries <= 0 {
            return Err(ProcessingError::failure(
                RejectionType::InvalidArgument,
                format!(
                    "Expected to update retries of job with key '{}' \
                     with a positive amount of retries, but got {}",
                    command.key, value.retries
                ),
            ));
        }
        let (mut job, _) = Self::require_job(context, command.key, "update retries of")?;
        job.retries = value.retries;
        context.append_event(command.key, JobIntent::RetriesUpdated, job.clone())?;
        context.respond(command, command.key, JobIntent::RetriesUpdated, job);
        Ok(())
    }
}

impl TypedRecordProcessor for JobCommandProcessor {
    fn name(&self) -> &'static str {
        "JobCommandProcessor"
    }

    fn can_handle(&self, intent: Intent) -> bool {
        matches!(
            intent,
            Intent::Job(
                JobIntent::Complete
                    | JobIntent::Fail
                    | JobIntent::ThrowError
                    | JobIntent::TimeOut
                    | JobIntent::UpdateRetries
            )
        )
    }

    fn process_record(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        match command.intent {
            Intent::Job(JobIntent::Complete) => self.complete(command, context),
            Intent::Job(JobIntent::Fail) => self.fail(command, context),
            Intent::Job(JobIntent::ThrowError) => self.throw_error(command, context),
            Intent::Job(JobIntent::TimeOut) => self.time_out(command, context),
            Intent::Job(JobIntent::UpdateRetries) => self.update_retries(command, context),
            other => {
                let message = format!("{} cannot handle {}", self.name(), other);
                Err(EngineError::illegal_state(message).into())
            }
        }
    }
}

/// Handles JOB_BATCH:ACTIVATE: hands out activatable jobs of one type to a worker.
pub struct ActivateJobsProcessor;

impl TypedRecordProcessor for ActivateJobsProcessor {
    fn name(&self) -> &'static str {
        "ActivateJobsProcessor"
    }

    fn can_handle(&self, intent: Intent) -> bool {
        intent == Intent::JobBatch(JobBatchIntent::Activate)
    }

    fn process_record(
        &self,
        command: &Record,
        context: &mut ProcessingContext<'_>,
    ) -> ProcessingResult<()> {
        let batch = command
            .value
            .as_job_batch()
            .ok_or_else(|| EngineError::illegal_state("Expected a job batch value"))?;

        if batch.job_type.is_empty() {
            return Err(ProcessingError::failure(
                RejectionType::InvalidArgument,
                "Expected to activate jobs with a non-empty type, but it was empty",
            ));
        }
        if batch.timeout <= 0 {
            return Err(ProcessingError::failure(
                RejectionType::InvalidArgument,
                format!(
                    "Expected to activate jobs with a positive timeout, but got {}",
                    batch.timeout
                ),
            ));
        }
        if batch.max_jobs_to_activate < 1 {
            return Err(ProcessingError::failure(
                RejectionType::InvalidArgument,
                "Expected to activate at least one job, but max jobs to activate is 0",
            ));
        }

        let state = context.state();
        let mut candidates = Vec::new();
        state.jobs.for_each_activatable(&batch.job_type, |key, job| {
            candidates.push((key, job));
            true
        })?;

        let deadline = context.now().saturating_add(batch.timeout);
        let mut job_keys = Vec::new();
        let mut jobs = Vec::new();
        for (key, mut job) in candidates {
            if jobs.len() >= batch.max_jobs_to_activate {
                break;
            }
            if state.banned_instances.is_banned_key(job.process_instance_key)? {
                continue;
            }
            job.deadline = deadline;
            job.worker = batch.worker.clone();
            job_keys.push(key);
            jobs.push(job);
        }

        let activated = JobBatchRecord {
            job_type: batch.job_type.clone(),
            worker: batch.worker.clone(),
            timeout: batch.timeout,
            max_jobs_to_activate: batch.max_jobs_to_activate,
            job_keys,
            jobs,
        };
        let key = context.next_key()?;
        if !activated.jobs.is_empty() {
            context.schedule_due_date(ScheduledTask::TimeOutJobs, deadline);
        }
        context.append_event(key, JobBatchIntent::Activated, activated.clone())?;
        context.respond(command, key, JobBatchIntent::Activated, activated);
        Ok(())
    }
}
