//! Worker pool management.
//!
//! The pool races `current_worker_count` search workers against one request
//! at a time. The first worker to match wins; every sibling is cancelled and
//! joined before the result is handed back. Worker count adapts to the CPU
//! monitor's rolling average between `1` and `max(1, logical cores - 1)`.
//!
//! The pool is driven either by [`WorkerPoolManager::run`], which blocks
//! until the race ends, or event by event (`start_race`, `handle_message`,
//! `expire`, `maintain`, `cancel`) by a controller that multiplexes races
//! with other work.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{after, select, tick, unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::crypto::{KeyGenerator, Keypair, SecretKeyMaterial};
use crate::error::{Result, VanityError};
use crate::matcher::Pattern;

use super::monitor::{CpuMonitor, SystemLoadProbe};
use super::search::{SearchWorker, WorkerMessage};
use super::stats::{PoolStats, StatsReporter};

/// Utilization above `target` shrinks the pool by this factor.
const SHRINK_FACTOR: f64 = 0.8;
/// Utilization below `target * GROW_THRESHOLD` grows the pool by `GROW_FACTOR`.
const GROW_THRESHOLD: f64 = 0.7;
const GROW_FACTOR: f64 = 1.2;

/// A request for one vanity address.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub pattern: Pattern,
    /// Caller-chosen identifier, echoed to the result sink
    pub identifier: String,
    /// Wall-clock deadline for the race
    pub timeout: Duration,
    pub metadata: BTreeMap<String, String>,
}

impl GenerationRequest {
    pub fn new(pattern: Pattern, identifier: impl Into<String>, timeout: Duration) -> Self {
        Self {
            pattern,
            identifier: identifier.into(),
            timeout,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Result of a successful generation.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// The base58 address
    pub public_key: String,
    /// Secret material for the wallet store; never logged
    pub secret_key: SecretKeyMaterial,
    /// The ID of the worker that found this result
    pub worker_id: usize,
    /// Keypairs generated by all workers during the race
    pub attempts: u64,
    /// Time from race start to match
    pub elapsed: Duration,
}

/// How a race ended, together with the request it served.
#[derive(Debug)]
pub struct RaceOutcome {
    pub request: GenerationRequest,
    pub result: Result<GenerationResult>,
}

enum RaceEnd {
    Matched { worker_id: usize, keypair: Keypair },
    Crashed { worker_id: usize, reason: String },
    TimedOut,
    Cancelled,
}

/// One live search worker thread.
struct WorkerHandle {
    id: usize,
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<u64>,
}

impl WorkerHandle {
    fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Waits for the thread and returns the keypairs it tested.
    fn join(self) -> u64 {
        self.thread.join().unwrap_or(0)
    }
}

struct Race {
    request: GenerationRequest,
    workers: Vec<WorkerHandle>,
    events_tx: Sender<WorkerMessage>,
    events_rx: Receiver<WorkerMessage>,
    started: Instant,
    deadline: Instant,
    /// Attempts of workers already joined
    attempts: u64,
}

/// Pool capacity for a machine with `logical_cores` cores.
pub fn max_workers_for(logical_cores: usize) -> usize {
    logical_cores.saturating_sub(1).max(1)
}

/// Manages the search workers of the request in flight.
pub struct WorkerPoolManager {
    generator: Arc<dyn KeyGenerator>,
    monitor: CpuMonitor,
    max_workers: usize,
    current_workers: usize,
    check_interval: Duration,
    next_worker_id: usize,
    race: Option<Race>,
    stats: StatsReporter,
}

impl WorkerPoolManager {
    /// Creates a pool sized for this machine.
    pub fn new(
        config: &EngineConfig,
        generator: Arc<dyn KeyGenerator>,
        probe: Box<dyn SystemLoadProbe>,
    ) -> Self {
        Self::with_max_workers(config, generator, probe, max_workers_for(num_cpus::get()))
    }

    pub(crate) fn with_max_workers(
        config: &EngineConfig,
        generator: Arc<dyn KeyGenerator>,
        probe: Box<dyn SystemLoadProbe>,
        max_workers: usize,
    ) -> Self {
        let max_workers = max_workers.max(1);
        let current_workers = config.initial_workers.unwrap_or(max_workers).clamp(1, max_workers);

        Self {
            generator,
            monitor: CpuMonitor::new(probe, config.target_utilization, config.utilization_window),
            max_workers,
            current_workers,
            check_interval: config.check_interval,
            next_worker_id: 0,
            race: None,
            stats: StatsReporter::new(),
        }
    }

    /// Upper bound on live workers.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Worker count the next race starts with.
    pub fn current_worker_count(&self) -> usize {
        self.current_workers
    }

    /// Workers currently racing.
    pub fn live_workers(&self) -> usize {
        self.race.as_ref().map_or(0, |race| race.workers.len())
    }

    pub fn is_racing(&self) -> bool {
        self.race.is_some()
    }

    pub fn monitor(&self) -> &CpuMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut CpuMonitor {
        &mut self.monitor
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    /// Receiver for the in-flight race's worker messages.
    pub fn events(&self) -> Option<Receiver<WorkerMessage>> {
        self.race.as_ref().map(|race| race.events_rx.clone())
    }

    /// Deadline of the in-flight race.
    pub fn deadline(&self) -> Option<Instant> {
        self.race.as_ref().map(|race| race.deadline)
    }

    /// Re-evaluates the worker count against the utilization average.
    ///
    /// - above target: `max(1, floor(current * 0.8))`
    /// - below `0.7 * target`: `min(max, ceil(current * 1.2))`
    /// - otherwise, or with no samples: unchanged
    pub fn optimal_worker_count(&mut self) -> usize {
        let current = self.current_workers;
        let target = self.monitor.target();

        let next = match self.monitor.average() {
            Some(avg) if avg > target => (current as f64 * SHRINK_FACTOR).floor() as usize,
            Some(avg) if avg < target * GROW_THRESHOLD => (current as f64 * GROW_FACTOR).ceil() as usize,
            _ => current,
        }
        .clamp(1, self.max_workers);

        if next != current {
            debug!(
                previous = current,
                next,
                average = ?self.monitor.average(),
                target,
                "Adjusted worker count"
            );
        }
        self.current_workers = next;
        next
    }

    /// Shrink path, invoked when the utilization average is over budget.
    pub fn throttle(&mut self) -> usize {
        let previous = self.current_workers;
        let next = self.optimal_worker_count();
        if next < previous {
            warn!(
                previous,
                next,
                average = ?self.monitor.average(),
                target = self.monitor.target(),
                "CPU over budget, shedding workers"
            );
        }
        self.resize_race(next);
        next
    }

    /// Periodic pass: sample utilization, then throttle or rebalance.
    pub fn maintain(&mut self) {
        self.monitor.tick();
        if self.monitor.over_budget() {
            self.throttle();
        } else {
            let next = self.optimal_worker_count();
            self.resize_race(next);
        }
    }

    /// Starts racing `current_worker_count` workers for `request`.
    ///
    /// The count is not re-evaluated here; callers do that once per task
    /// with [`optimal_worker_count`](Self::optimal_worker_count).
    pub fn start_race(&mut self, request: GenerationRequest) -> Result<()> {
        if self.race.is_some() {
            return Err(VanityError::TaskAddFailed(
                "a generation is already in flight".into(),
            ));
        }

        let count = self.current_workers;
        let (events_tx, events_rx) = unbounded();
        let started = Instant::now();
        let deadline = started
            .checked_add(request.timeout)
            .unwrap_or_else(|| started + Duration::from_secs(365 * 24 * 60 * 60));

        let mut workers = Vec::with_capacity(count);
        for _ in 0..count {
            match self.spawn_worker(&request.pattern, &events_tx) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    warn!(error = %e, "Failed to spawn search worker");
                    break;
                }
            }
        }
        if workers.is_empty() {
            return Err(VanityError::Worker {
                worker_id: self.next_worker_id,
                reason: "no search worker could be spawned".into(),
            });
        }

        self.stats.record_spawned(workers.len());
        self.stats.set_active(workers.len());
        info!(
            identifier = %request.identifier,
            pattern = %request.pattern,
            workers = workers.len(),
            timeout_ms = request.timeout.as_millis() as u64,
            "Race started"
        );

        self.race = Some(Race {
            request,
            workers,
            events_tx,
            events_rx,
            started,
            deadline,
            attempts: 0,
        });
        Ok(())
    }

    /// Applies a worker message; returns the outcome if it ended the race.
    pub fn handle_message(&mut self, message: WorkerMessage) -> Option<RaceOutcome> {
        match message {
            WorkerMessage::Found { worker_id, keypair } => {
                let race = self.race.take()?;
                Some(self.finish(race, RaceEnd::Matched { worker_id, keypair }))
            }
            WorkerMessage::Crashed { worker_id, reason } => {
                let race = self.race.as_mut()?;
                // Workers retired by a scale-down are no longer tracked.
                let index = race.workers.iter().position(|w| w.id == worker_id)?;
                let handle = race.workers.swap_remove(index);
                race.attempts += handle.join();
                let remaining = race.workers.len();

                self.stats.record_crash();
                self.stats.set_active(remaining);
                warn!(worker_id, %reason, remaining, "Search worker crashed");

                if remaining > 0 {
                    return None;
                }
                let race = self.race.take()?;
                Some(self.finish(race, RaceEnd::Crashed { worker_id, reason }))
            }
        }
    }

    /// Ends the race with a timeout if its deadline has passed.
    pub fn expire(&mut self) -> Option<RaceOutcome> {
        if Instant::now() < self.deadline()? {
            return None;
        }
        let race = self.race.take()?;
        Some(self.finish(race, RaceEnd::TimedOut))
    }

    /// Cancels the race in flight.
    pub fn cancel(&mut self) -> Option<RaceOutcome> {
        let race = self.race.take()?;
        Some(self.finish(race, RaceEnd::Cancelled))
    }

    /// Runs one request to completion on the calling thread.
    pub fn run(&mut self, request: GenerationRequest) -> Result<GenerationResult> {
        self.start_race(request)?;
        let ticker = tick(self.check_interval);

        loop {
            let (Some(events), Some(deadline)) = (self.events(), self.deadline()) else {
                return Err(VanityError::Cancelled);
            };
            let wait = deadline.saturating_duration_since(Instant::now());

            let outcome = select! {
                recv(events) -> message => message.ok().and_then(|m| self.handle_message(m)),
                recv(after(wait)) -> _ => self.expire(),
                recv(ticker) -> _ => {
                    self.maintain();
                    None
                }
            };

            if let Some(outcome) = outcome {
                return outcome.result;
            }
        }
    }

    fn spawn_worker(
        &mut self,
        pattern: &Pattern,
        events: &Sender<WorkerMessage>,
    ) -> std::io::Result<WorkerHandle> {
        let id = self.next_worker_id;
        let cancel = Arc::new(AtomicBool::new(false));
        let worker = SearchWorker::new(
            id,
            pattern.clone(),
            self.generator.clone(),
            events.clone(),
            cancel.clone(),
        );

        let thread = thread::Builder::new()
            .name(format!("vanity-worker-{}", id))
            .spawn(move || worker.run())?;
        self.next_worker_id += 1;

        Ok(WorkerHandle { id, cancel, thread })
    }

    /// Retires or adds workers so the race runs `target` of them.
    fn resize_race(&mut self, target: usize) {
        let Some(mut race) = self.race.take() else {
            return;
        };
        let before = race.workers.len();

        if before > target {
            let retired: Vec<WorkerHandle> = race.workers.drain(target..).collect();
            for worker in &retired {
                worker.cancel();
            }
            for worker in retired {
                race.attempts += worker.join();
            }
        } else {
            let mut spawned = 0;
            for _ in before..target {
                match self.spawn_worker(&race.request.pattern, &race.events_tx) {
                    Ok(handle) => {
                        race.workers.push(handle);
                        spawned += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to spawn search worker");
                        break;
                    }
                }
            }
            self.stats.record_spawned(spawned);
        }

        if race.workers.len() != before {
            debug!(before, after = race.workers.len(), "Resized race");
        }
        self.stats.set_active(race.workers.len());
        self.race = Some(race);
    }

    /// Cancels and joins every worker, then records the outcome.
    fn finish(&mut self, race: Race, end: RaceEnd) -> RaceOutcome {
        let Race {
            request,
            workers,
            started,
            mut attempts,
            ..
        } = race;

        for worker in &workers {
            worker.cancel();
        }
        for worker in workers {
            attempts += worker.join();
        }
        let elapsed = started.elapsed();
        self.stats.set_active(0);

        let result = match end {
            RaceEnd::Matched { worker_id, keypair } => {
                self.stats.record_success(request.pattern.len(), elapsed, attempts);
                let (address, secret_key) = keypair.into_parts();
                info!(
                    identifier = %request.identifier,
                    address = %address,
                    worker_id,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Match found"
                );
                Ok(GenerationResult {
                    public_key: address.into_string(),
                    secret_key,
                    worker_id,
                    attempts,
                    elapsed,
                })
            }
            RaceEnd::Crashed { worker_id, reason } => Err(VanityError::Worker { worker_id, reason }),
            RaceEnd::TimedOut => Err(VanityError::Timeout {
                timeout: request.timeout,
                attempts,
            }),
            RaceEnd::Cancelled => Err(VanityError::Cancelled),
        };

        if let Err(err) = &result {
            self.stats.record_failure(attempts);
            warn!(
                identifier = %request.identifier,
                code = err.code(),
                error = %err,
                attempts,
                "Generation failed"
            );
        }

        RaceOutcome { request, result }
    }
}

impl Drop for WorkerPoolManager {
    fn drop(&mut self) {
        if let Some(race) = self.race.take() {
            self.finish(race, RaceEnd::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519Generator;
    use crate::matcher::Position;
    use crate::worker::monitor::UtilizationSample;

    struct IdleProbe;

    impl SystemLoadProbe for IdleProbe {
        fn cpu_utilization(&mut self) -> Option<f64> {
            None
        }
    }

    struct FailingGenerator;

    impl KeyGenerator for FailingGenerator {
        fn generate(&self) -> Keypair {
            panic!("entropy source unavailable");
        }
    }

    /// Fails only on the first worker thread.
    struct FirstWorkerFails;

    impl KeyGenerator for FirstWorkerFails {
        fn generate(&self) -> Keypair {
            if thread::current().name() == Some("vanity-worker-0") {
                panic!("worker 0 lost its entropy source");
            }
            Keypair::generate()
        }
    }

    fn make_pool(max: usize, initial: usize) -> WorkerPoolManager {
        pool_with(max, initial, Arc::new(Ed25519Generator))
    }

    fn pool_with(max: usize, initial: usize, generator: Arc<dyn KeyGenerator>) -> WorkerPoolManager {
        let config = EngineConfig::default().with_initial_workers(initial);
        WorkerPoolManager::with_max_workers(&config, generator, Box::new(IdleProbe), max)
    }

    fn feed(pool: &mut WorkerPoolManager, samples: &[f64]) {
        for &u in samples {
            pool.monitor_mut().record(UtilizationSample::now(u));
        }
    }

    fn request(text: &str, position: Position, timeout: Duration) -> GenerationRequest {
        let pattern = Pattern::new(text, position, false).unwrap();
        GenerationRequest::new(pattern, "test", timeout)
    }

    #[test]
    fn test_max_workers_for() {
        assert_eq!(max_workers_for(0), 1);
        assert_eq!(max_workers_for(1), 1);
        assert_eq!(max_workers_for(2), 1);
        assert_eq!(max_workers_for(8), 7);
    }

    #[test]
    fn test_initial_count_clamped_to_machine() {
        let config = EngineConfig::default().with_initial_workers(10_000);
        let pool = WorkerPoolManager::new(&config, Arc::new(Ed25519Generator), Box::new(IdleProbe));
        assert_eq!(pool.current_worker_count(), max_workers_for(num_cpus::get()));
        assert!(pool.current_worker_count() <= pool.max_workers());
    }

    #[test]
    fn test_no_samples_keeps_count() {
        let mut pool = make_pool(10, 6);
        assert_eq!(pool.optimal_worker_count(), 6);
    }

    #[test]
    fn test_shrinks_above_target() {
        let mut pool = make_pool(10, 10);
        feed(&mut pool, &[0.95]);
        assert_eq!(pool.optimal_worker_count(), 8);
    }

    #[test]
    fn test_hysteresis_band_keeps_count() {
        let mut pool = make_pool(10, 5);
        feed(&mut pool, &[0.6, 0.7, 0.75]);
        assert_eq!(pool.optimal_worker_count(), 5);
    }

    #[test]
    fn test_grows_below_band() {
        let mut pool = make_pool(10, 5);
        feed(&mut pool, &[0.3]);
        assert_eq!(pool.optimal_worker_count(), 6);

        let mut pool = make_pool(10, 9);
        feed(&mut pool, &[0.3]);
        assert_eq!(pool.optimal_worker_count(), 10);
    }

    #[test]
    fn test_never_below_one() {
        let mut pool = make_pool(10, 1);
        feed(&mut pool, &[1.0]);
        assert_eq!(pool.optimal_worker_count(), 1);
    }

    #[test]
    fn test_throttle_under_synthetic_load() {
        let mut pool = make_pool(8, 8);
        feed(&mut pool, &[0.9, 1.0, 0.95, 0.95]);
        assert!(pool.monitor().over_budget());

        let previous = pool.current_worker_count();
        let next = pool.throttle();
        assert!(next <= (previous as f64 * 0.8).floor() as usize);
        assert!(next >= 1);
    }

    #[test]
    fn test_throttle_retires_live_workers() {
        let mut pool = make_pool(4, 4);
        pool.start_race(request(&"a".repeat(20), Position::Start, Duration::from_secs(60)))
            .unwrap();
        assert_eq!(pool.live_workers(), 4);

        feed(&mut pool, &[0.99]);
        pool.throttle();
        assert_eq!(pool.live_workers(), 3);
        assert_eq!(pool.stats().workers_active, 3);

        let outcome = pool.cancel().unwrap();
        assert_eq!(outcome.result.unwrap_err(), VanityError::Cancelled);
        assert_eq!(pool.live_workers(), 0);
    }

    #[test]
    fn test_generations_reuse_task_count() {
        let mut pool = make_pool(8, 8);
        feed(&mut pool, &[0.95]);
        assert_eq!(pool.optimal_worker_count(), 6);

        let mut counts = Vec::new();
        for _ in 0..4 {
            pool.run(request("1", Position::Anywhere, Duration::from_secs(60)))
                .unwrap();
            counts.push(pool.current_worker_count());
        }
        assert_eq!(counts, vec![6, 6, 6, 6]);
        assert_eq!(pool.stats().workers_created, 24);
    }

    #[test]
    fn test_maintain_grows_live_race() {
        let mut pool = make_pool(4, 2);
        pool.start_race(request(&"a".repeat(20), Position::Start, Duration::from_secs(60)))
            .unwrap();
        assert_eq!(pool.live_workers(), 2);

        feed(&mut pool, &[0.3]);
        pool.maintain();
        assert_eq!(pool.live_workers(), 3);
        assert_eq!(pool.stats().workers_created, 3);
        assert_eq!(pool.stats().workers_active, 3);

        pool.maintain();
        pool.maintain();
        assert_eq!(pool.live_workers(), 4);
        assert!(pool.live_workers() <= pool.max_workers());
        assert_eq!(pool.stats().workers_created, 4);

        pool.cancel().unwrap();
        assert_eq!(pool.live_workers(), 0);
    }

    #[test]
    fn test_run_finds_match() {
        let mut pool = make_pool(2, 2);
        let req = request("a", Position::Anywhere, Duration::from_secs(60));
        let pattern = req.pattern.clone();

        let result = pool.run(req).unwrap();
        assert!(pattern.matches(&result.public_key));
        assert!(result.attempts >= 1);
        assert_eq!(pool.live_workers(), 0);

        let stats = pool.stats();
        assert_eq!(stats.operations_succeeded, 1);
        assert_eq!(stats.workers_created, 2);
        assert_eq!(stats.workers_active, 0);
        assert_eq!(stats.completions_by_length.get(&1), Some(&1));
    }

    #[test]
    fn test_run_times_out() {
        let mut pool = make_pool(2, 2);
        let req = request(&"z".repeat(20), Position::Start, Duration::from_millis(50));

        let started = Instant::now();
        let err = pool.run(req).unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, VanityError::Timeout { .. }));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2));
        assert_eq!(pool.live_workers(), 0);
        assert_eq!(pool.stats().operations_failed, 1);
    }

    #[test]
    fn test_all_workers_crashing_fails_request() {
        let mut pool = pool_with(3, 3, Arc::new(FailingGenerator));
        let err = pool
            .run(request("abc", Position::Start, Duration::from_secs(60)))
            .unwrap_err();

        assert_eq!(err.code(), "WORKER_ERROR");
        assert_eq!(pool.live_workers(), 0);
        assert_eq!(pool.stats().worker_crashes, 3);
    }

    #[test]
    fn test_single_crash_does_not_abort_race() {
        let mut pool = pool_with(3, 3, Arc::new(FirstWorkerFails));
        let req = request("abcd", Position::Anywhere, Duration::from_secs(120));
        let pattern = req.pattern.clone();

        let result = pool.run(req).unwrap();
        assert!(pattern.matches(&result.public_key));
        assert_ne!(result.worker_id, 0);
        assert_eq!(pool.stats().worker_crashes, 1);
    }

    #[test]
    fn test_second_race_rejected_while_racing() {
        let mut pool = make_pool(1, 1);
        pool.start_race(request(&"a".repeat(20), Position::Start, Duration::from_secs(60)))
            .unwrap();
        let err = pool
            .start_race(request("ab", Position::Start, Duration::from_secs(60)))
            .unwrap_err();
        assert_eq!(err.code(), "TASK_ADD_FAILED");
    }
}
