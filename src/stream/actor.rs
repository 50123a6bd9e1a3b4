//! Runs a stream processor as a single tokio task.
//!
//! Commands, due-date checks and control requests all arrive through one
//! inbox, so the processor and its state are only ever touched by that task.

use super::log::LogStream;
use super::metrics::ProcessingMetrics;
use super::processor::StreamProcessor;
use super::query::QueryService;
use crate::config::EngineConfig;
use crate::core::{EngineError, PartitionId, Position, Result};
use crate::db::Db;
use crate::record::{Record, Response};
use crate::scheduler::{ScheduleService, ScheduledTask, StreamClock, TaskHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Duration as TokioDuration, sleep};
use tracing::{Level, event};

/// Request stream id the actor puts on commands it executes for callers.
const REQUEST_STREAM_ID: i32 = 0;

enum PartitionMessage {
    Execute {
        command: Record,
        reply: oneshot::Sender<Result<Response>>,
    },
    Write {
        command: Record,
        reply: oneshot::Sender<Result<Position>>,
    },
    RunScheduled {
        task: ScheduledTask,
        handle: TaskHandle,
    },
    Pause(oneshot::Sender<Result<()>>),
    Resume(oneshot::Sender<Result<()>>),
    Metrics(oneshot::Sender<ProcessingMetrics>),
    Shutdown,
}

/// Schedule service of the actor: a delayed task is a spawned sleep that posts
/// the task back into the inbox.
pub struct ActorScheduler {
    inbox: mpsc::UnboundedSender<PartitionMessage>,
    runtime: Handle,
    pending: Mutex<HashMap<TaskHandle, AbortHandle>>,
}

impl ActorScheduler {
    fn new(inbox: mpsc::UnboundedSender<PartitionMessage>, runtime: Handle) -> Self {
        Self {
            inbox,
            runtime,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn finished(&self, handle: TaskHandle) -> Result<()> {
        self.pending.lock()?.remove(&handle);
        Ok(())
    }

    fn cancel_all(&self) -> Result<()> {
        for (_, abort) in self.pending.lock()?.drain() {
            abort.abort();
        }
        Ok(())
    }

    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.pending.lock()?.len())
    }
}

impl ScheduleService for ActorScheduler {
    fn run_delayed(&self, delay_ms: i64, task: ScheduledTask) -> Result<TaskHandle> {
        let handle = TaskHandle::next();
        let inbox = self.inbox.clone();
        let delay = TokioDuration::from_millis(delay_ms.max(0) as u64);
        let join_handle = self.runtime.spawn(async move {
            sleep(delay).await;
            let _ = inbox.send(PartitionMessage::RunScheduled { task, handle });
        });
        self.pending.lock()?.insert(handle, join_handle.abort_handle());
        Ok(handle)
    }

    fn cancel(&self, handle: TaskHandle) -> Result<()> {
        if let Some(abort) = self.pending.lock()?.remove(&handle) {
            abort.abort();
        }
        Ok(())
    }
}

/// Cloneable access to a running partition.
#[derive(Clone)]
pub struct PartitionHandle {
    sender: mpsc::UnboundedSender<PartitionMessage>,
    db: Db,
    partition_id: PartitionId,
}

impl PartitionHandle {
    /// Writes the command with fresh request metadata and waits for its response.
    pub async fn execute(&self, command: Record) -> Result<Response> {
        self.request(|reply| PartitionMessage::Execute { command, reply })
            .await?
    }

    /// Writes the command without waiting for it to be processed.
    pub async fn write(&self, command: Record) -> Result<Position> {
        self.request(|reply| PartitionMessage::Write { command, reply })
            .await?
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(PartitionMessage::Pause).await?
    }

    pub async fn resume(&self) -> Result<()> {
        self.request(PartitionMessage::Resume).await?
    }

    pub async fn metrics(&self) -> Result<ProcessingMetrics> {
        self.request(PartitionMessage::Metrics).await
    }

    /// Queries run on a read-only snapshot, outside the actor.
    pub fn query(&self) -> QueryService {
        QueryService::new(&self.db, self.partition_id)
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> PartitionMessage,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(message(reply))
            .map_err(|_| EngineError::ActorClosed)?;
        response.await.map_err(|_| EngineError::ActorClosed)
    }
}

/// A partition running on the current tokio runtime.
pub struct PartitionActor {
    handle: PartitionHandle,
    join_handle: Option<JoinHandle<()>>,
}

impl PartitionActor {
    /// Opens storage as configured and starts processing. Must be called from
    /// within a tokio runtime.
    pub fn start(config: EngineConfig, clock: StreamClock) -> Result<Self> {
        let (db, log) = super::open_storage(&config)?;
        Self::start_with(config, db, log, clock)
    }

    pub fn start_with(
        config: EngineConfig,
        db: Db,
        log: LogStream,
        clock: StreamClock,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|err| {
            EngineError::illegal_state(format!(
                "Expected to start the partition inside a tokio runtime: {}",
                err
            ))
        })?;
        let (sender, inbox) = mpsc::unbounded_channel();
        let scheduler = Arc::new(ActorScheduler::new(sender.clone(), runtime.clone()));
        let partition_id = config.partition_id;
        let processor = StreamProcessor::open(config, db.clone(), log, clock, scheduler.clone())?;

        let join_handle = runtime.spawn(run(processor, scheduler, inbox));
        Ok(Self {
            handle: PartitionHandle {
                sender,
                db,
                partition_id,
            },
            join_handle: Some(join_handle),
        })
    }

    pub fn handle(&self) -> PartitionHandle {
        self.handle.clone()
    }

    /// Stops the actor after the messages already in its inbox and waits for it.
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.handle.sender.send(PartitionMessage::Shutdown);
        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| {
                    EngineError::illegal_state(format!("partition actor join: {}", err))
                })?;
        }
        Ok(())
    }
}

impl Drop for PartitionActor {
    fn drop(&mut self) {
        if let Some(join_handle) = self.join_handle.take() {
            let _ = self.handle.sender.send(PartitionMessage::Shutdown);
            join_handle.abort();
        }
    }
}

async fn run(
    mut processor: StreamProcessor,
    scheduler: Arc<ActorScheduler>,
    mut inbox: mpsc::UnboundedReceiver<PartitionMessage>,
) {
    let partition_id = processor.config().partition_id;
    let mut waiters: HashMap<i64, oneshot::Sender<Result<Response>>> = HashMap::new();
    let mut next_request_id: i64 = 1;
    event!(Level::INFO, partition_id, "partition actor started");

    while let Some(message) = inbox.recv().await {
        match message {
            PartitionMessage::Execute { command, reply } => {
                let request_id = next_request_id;
                next_request_id += 1;
                match processor.write_command(command.with_request(request_id, REQUEST_STREAM_ID)) {
                    Ok(_) => {
                        waiters.insert(request_id, reply);
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
            }
            PartitionMessage::Write { command, reply } => {
                let _ = reply.send(processor.write_command(command));
            }
            PartitionMessage::RunScheduled { task, handle } => {
                let result = scheduler
                    .finished(handle)
                    .and_then(|_| processor.run_scheduled_task(task, handle));
                if let Err(err) = result {
                    event!(
                        Level::ERROR,
                        partition_id,
                        %task,
                        error = %err,
                        "due date check failed"
                    );
                }
            }
            PartitionMessage::Pause(reply) => {
                let _ = reply.send(processor.pause());
            }
            PartitionMessage::Resume(reply) => {
                let _ = reply.send(processor.resume());
            }
            PartitionMessage::Metrics(reply) => {
                let _ = reply.send(processor.metrics().clone());
            }
            PartitionMessage::Shutdown => break,
        }

        if let Err(err) = processor.process_available() {
            event!(
                Level::ERROR,
                partition_id,
                error = %err,
                "partition actor stops after processing failure"
            );
            break;
        }
        for response in processor.take_responses() {
            if let Some(waiter) = waiters.remove(&response.request.request_id) {
                let _ = waiter.send(Ok(response));
            }
        }
    }

    if let Err(err) = scheduler.cancel_all() {
        event!(Level::WARN, partition_id, error = %err, "failed to cancel scheduled tasks");
    }
    if let Err(err) = processor.checkpoint() {
        event!(Level::WARN, partition_id, error = %err, "final checkpoint failed");
    }
    event!(Level::INFO, partition_id, "partition actor stopped");
}
