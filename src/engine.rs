//! The in-process search engine.
//!
//! A single controller thread owns the task queue, the worker pool and the
//! result sink. Callers talk to it over a command channel and read pool
//! status from an atomically swapped snapshot, so a status read never waits
//! on a race.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use crossbeam_channel::{after, bounded, never, select, tick, unbounded, Receiver, Sender};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::crypto::{Ed25519Generator, KeyGenerator};
use crate::error::{Result, VanityError};
use crate::matcher::{ComplexityEstimator, Pattern, Position};
use crate::sink::ResultSink;
use crate::worker::{
    default_probe, Alert, CpuSummary, GenerationRequest, GenerationResult, GenerationTask,
    PoolStatus, RaceOutcome, SystemLoadProbe, TaskQueue, WorkerPoolManager, WorkerSummary,
};

/// Options for a single generation.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub case_sensitive: bool,
    pub position: Position,
    /// Deadline for the race; the engine default when `None`
    pub timeout: Option<Duration>,
    pub metadata: BTreeMap<String, String>,
}

/// Acknowledgement of a queued batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admission {
    /// 1-based position, counting the task in flight
    pub queue_position: usize,
    /// Expected time to finish every generation of the batch
    pub estimated_time: Duration,
}

enum Command {
    Enqueue {
        task: GenerationTask,
        reply: Sender<Result<usize>>,
    },
    CancelCurrent,
    Shutdown,
}

/// Handle to a running engine.
///
/// Every method takes `&self`; share the engine across threads with `Arc`.
/// Dropping the engine shuts it down.
pub struct Engine {
    config: EngineConfig,
    estimator: ComplexityEstimator,
    commands: Sender<Command>,
    status: Arc<ArcSwap<PoolStatus>>,
    controller: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Starts an engine with ed25519 keys and this platform's load probe.
    pub fn start(config: EngineConfig, sink: impl ResultSink + 'static) -> Result<Self> {
        Self::with_parts(
            config,
            Arc::new(Ed25519Generator),
            default_probe(),
            Box::new(sink),
        )
    }

    /// Starts an engine from explicit parts.
    pub fn with_parts(
        config: EngineConfig,
        generator: Arc<dyn KeyGenerator>,
        probe: Box<dyn SystemLoadProbe>,
        sink: Box<dyn ResultSink>,
    ) -> Result<Self> {
        config.validate()?;

        let pool = WorkerPoolManager::new(&config, generator, probe);
        let (commands_tx, commands_rx) = unbounded();
        let status = Arc::new(ArcSwap::from_pointee(PoolStatus::default()));

        let controller = Controller {
            pool,
            queue: TaskQueue::new(config.queue_capacity),
            sink,
            status: status.clone(),
            commands: commands_rx,
            check_interval: config.check_interval,
            queue_alert_depth: config.queue_alert_depth,
        };
        controller.publish();

        info!(
            max_workers = controller.pool.max_workers(),
            workers = controller.pool.current_worker_count(),
            target_utilization = config.target_utilization,
            "Starting search engine"
        );

        let handle = thread::Builder::new()
            .name("vanity-controller".into())
            .spawn(move || controller.run())
            .map_err(|e| {
                warn!(error = %e, "Failed to spawn engine controller");
                VanityError::EngineStopped
            })?;

        Ok(Self {
            estimator: ComplexityEstimator::new(config.per_core_rate, config.max_expected_attempts),
            config,
            commands: commands_tx,
            status,
            controller: Mutex::new(Some(handle)),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn estimator(&self) -> &ComplexityEstimator {
        &self.estimator
    }

    /// Generates one address and waits for it.
    ///
    /// Validation and complexity errors are returned before anything is
    /// queued. The request then waits its turn behind earlier tasks.
    pub fn submit_generation(
        &self,
        pattern: &str,
        identifier: impl Into<String>,
        options: SubmitOptions,
    ) -> Result<GenerationResult> {
        let pattern = Pattern::new(pattern, options.position, options.case_sensitive)?;
        self.estimator.check(&pattern)?;

        let timeout = options.timeout.unwrap_or(self.config.default_timeout);
        let request = GenerationRequest::new(pattern, identifier, timeout).with_metadata(options.metadata);

        let (reply_tx, reply_rx) = bounded(1);
        self.enqueue(GenerationTask::single(request, reply_tx))?;
        reply_rx.recv().map_err(|_| VanityError::EngineStopped)?
    }

    /// Queues `count` generations whose results go to the result sink.
    pub fn enqueue_batch(
        &self,
        pattern: &str,
        count: usize,
        position: Position,
        case_sensitive: bool,
    ) -> Result<Admission> {
        let pattern = Pattern::new(pattern, position, case_sensitive)?;
        self.estimator.check(&pattern)?;

        let workers = self.status.load().workers.current;
        let per_generation = self.estimator.estimate(&pattern, workers).expected_seconds;
        let estimated_time = Duration::try_from_secs_f64(per_generation * count as f64)
            .unwrap_or(Duration::MAX);

        let request = GenerationRequest::new(pattern, "batch", self.config.default_timeout);
        let queue_position = self.enqueue(GenerationTask::batch(request, count))?;

        Ok(Admission {
            queue_position,
            estimated_time,
        })
    }

    /// Latest pool status snapshot.
    pub fn pool_status(&self) -> Arc<PoolStatus> {
        self.status.load_full()
    }

    /// Alerts of the latest status snapshot.
    pub fn pool_alerts(&self) -> Vec<Alert> {
        self.status.load().alerts.clone()
    }

    /// Cancels the generation in flight. Queued work is unaffected.
    pub fn cancel_current(&self) {
        let _ = self.commands.send(Command::CancelCurrent);
    }

    /// Stops the engine and waits for every worker to exit.
    ///
    /// The generation in flight fails with `Cancelled`; queued single
    /// submissions fail with `EngineStopped`. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        let handle = match self.controller.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Engine controller panicked");
            }
        }
    }

    fn enqueue(&self, task: GenerationTask) -> Result<usize> {
        let (reply_tx, reply_rx) = bounded(1);
        self.commands
            .send(Command::Enqueue { task, reply: reply_tx })
            .map_err(|_| VanityError::EngineStopped)?;
        reply_rx.recv().map_err(|_| VanityError::EngineStopped)?
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Controller {
    pool: WorkerPoolManager,
    queue: TaskQueue,
    sink: Box<dyn ResultSink>,
    status: Arc<ArcSwap<PoolStatus>>,
    commands: Receiver<Command>,
    check_interval: Duration,
    queue_alert_depth: usize,
}

impl Controller {
    fn run(mut self) {
        let commands = self.commands.clone();
        let ticker = tick(self.check_interval);

        loop {
            self.drain();
            self.publish();

            let events = self.pool.events().unwrap_or_else(never);
            let deadline = match self.pool.deadline() {
                Some(deadline) => after(deadline.saturating_duration_since(Instant::now())),
                None => never(),
            };

            select! {
                recv(commands) -> command => match command {
                    Ok(Command::Enqueue { task, reply }) => {
                        let admitted = self.queue.push(task);
                        if let Err(err) = &admitted {
                            warn!(error = %err, queue_length = self.queue.len(), "Task rejected");
                        }
                        let _ = reply.send(admitted);
                    }
                    Ok(Command::CancelCurrent) => {
                        if let Some(outcome) = self.pool.cancel() {
                            self.complete(outcome);
                        }
                    }
                    Ok(Command::Shutdown) | Err(_) => break,
                },
                recv(events) -> message => {
                    if let Some(outcome) = message.ok().and_then(|m| self.pool.handle_message(m)) {
                        self.complete(outcome);
                    }
                }
                recv(deadline) -> _ => {
                    if let Some(outcome) = self.pool.expire() {
                        self.complete(outcome);
                    }
                }
                recv(ticker) -> _ => self.pool.maintain(),
            }
        }

        self.stop();
    }

    /// Starts the next generation of the head task when the pool is idle.
    fn drain(&mut self) {
        while !self.pool.is_racing() {
            let Some(task) = self.queue.front() else {
                return;
            };
            let request = task.next_request();
            let first_generation = task.completed() == 0;
            debug!(task_id = task.id(), identifier = %request.identifier, "Dispatching generation");

            // Worker count is re-evaluated once per task, not per generation.
            if first_generation {
                self.pool.optimal_worker_count();
            }

            if let Err(err) = self.pool.start_race(request.clone()) {
                self.complete(RaceOutcome {
                    request,
                    result: Err(err),
                });
            }
        }
    }

    /// Records a finished generation on the head task and hands its result over.
    fn complete(&mut self, outcome: RaceOutcome) {
        let RaceOutcome { request, result } = outcome;
        let Some(task) = self.queue.front_mut() else {
            return;
        };
        task.record(result.is_ok());
        let reply = task.reply().cloned();

        if let Some(done) = self.queue.pop_finished() {
            if done.reply().is_none() {
                info!(
                    task_id = done.id(),
                    pattern = %done.pattern(),
                    succeeded = done.succeeded(),
                    count = done.count(),
                    elapsed_ms = done.age().as_millis() as u64,
                    "Batch finished"
                );
            }
        }
        // Readers must observe the idle pool before the caller sees the result.
        self.publish();

        match reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Ok(result) = result {
                    if let Err(err) = self.sink.deliver(&request, result) {
                        warn!(identifier = %request.identifier, error = %err, "Result delivery failed");
                    }
                }
            }
        }
    }

    fn stop(&mut self) {
        if let Some(outcome) = self.pool.cancel() {
            self.complete(outcome);
        }
        let pending = self.queue.drain();
        for task in &pending {
            if let Some(reply) = task.reply() {
                let _ = reply.send(Err(VanityError::EngineStopped));
            }
        }
        self.publish();
        info!(dropped_tasks = pending.len(), "Search engine stopped");
    }

    fn publish(&self) {
        let monitor = self.pool.monitor();
        let total = self.pool.max_workers();
        let active = self.pool.live_workers();

        let workers = WorkerSummary {
            total,
            current: self.pool.current_worker_count(),
            active,
            available: total.saturating_sub(active),
            queue_length: self.queue.len(),
        };
        let cpu = CpuSummary {
            current: monitor.current(),
            average: monitor.average(),
            target: monitor.target(),
        };

        self.status.store(Arc::new(PoolStatus::build(
            workers,
            cpu,
            monitor.memory(),
            self.pool.stats(),
            self.queue_alert_depth,
        )));
    }
}
