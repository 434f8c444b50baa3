//! Worker pool for parallel vanity address search.
//!
//! This module provides:
//! - Search worker threads racing one pattern
//! - An adaptive pool sized by CPU utilization
//! - The FIFO task queue feeding the pool
//! - Statistics, status snapshots and alerts

mod monitor;
mod pool;
mod queue;
mod search;
mod stats;

pub use monitor::{
    default_probe, CpuMonitor, MemoryUsage, ProcStatProbe, SysinfoProbe, SystemLoadProbe,
    UtilizationSample,
};
pub use pool::{
    max_workers_for, GenerationRequest, GenerationResult, RaceOutcome, WorkerPoolManager,
};
pub use queue::{GenerationTask, TaskQueue};
pub use search::{SearchWorker, WorkerMessage};
pub use stats::{
    evaluate_alerts, Alert, AlertKind, AlertLevel, CpuSummary, MemorySummary, PatternSummary,
    PoolStats, PoolStatus, StatsReporter, WorkerSummary,
};
