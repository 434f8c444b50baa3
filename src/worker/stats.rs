//! Pool statistics, status snapshots and alerts.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use super::monitor::MemoryUsage;

/// Aggregated pool counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Generations finished, successful or not
    pub operations_total: u64,
    pub operations_succeeded: u64,
    pub operations_failed: u64,
    /// Workers currently racing
    pub workers_active: usize,
    /// Workers spawned since start
    pub workers_created: u64,
    /// Workers lost to a panic
    pub worker_crashes: u64,
    /// Keypairs generated across all races
    pub keys_tested: u64,
    /// Successful generations keyed by pattern length
    pub completions_by_length: BTreeMap<usize, u64>,
    /// Cumulative mean latency of successful generations
    pub average_latency_ms: f64,
    pub last_latency_ms: Option<f64>,
}

/// Owns the pool counters; mutated only by the pool's controlling thread.
#[derive(Debug, Default)]
pub struct StatsReporter {
    stats: PoolStats,
}

impl StatsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful generation.
    pub fn record_success(&mut self, pattern_len: usize, latency: Duration, attempts: u64) {
        let stats = &mut self.stats;
        stats.operations_total += 1;
        stats.operations_succeeded += 1;
        stats.keys_tested += attempts;
        *stats.completions_by_length.entry(pattern_len).or_insert(0) += 1;

        let latest = latency.as_nanos() as f64 / 1_000_000.0;
        let n = stats.operations_succeeded as f64;
        stats.average_latency_ms = (stats.average_latency_ms * (n - 1.0) + latest) / n;
        stats.last_latency_ms = Some(latest);
    }

    /// Records a failed generation (timeout, crash, cancellation).
    pub fn record_failure(&mut self, attempts: u64) {
        self.stats.operations_total += 1;
        self.stats.operations_failed += 1;
        self.stats.keys_tested += attempts;
    }

    pub fn record_spawned(&mut self, count: usize) {
        self.stats.workers_created += count as u64;
    }

    pub fn record_crash(&mut self) {
        self.stats.worker_crashes += 1;
    }

    pub fn set_active(&mut self, active: usize) {
        self.stats.workers_active = active;
    }

    /// Owned copy of the current counters.
    pub fn snapshot(&self) -> PoolStats {
        self.stats.clone()
    }
}

/// Worker capacity summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSummary {
    /// Pool capacity (`max(1, logical cores - 1)`)
    pub total: usize,
    /// Worker count the pool currently races with, after throttling
    pub current: usize,
    pub active: usize,
    pub available: usize,
    /// Tasks queued, including the one in flight
    pub queue_length: usize,
}

/// CPU utilization summary.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuSummary {
    pub current: Option<f64>,
    pub average: Option<f64>,
    pub target: f64,
}

/// Memory summary.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySummary {
    pub total: u64,
    pub free: u64,
    pub usage_percent: f64,
}

impl From<MemoryUsage> for MemorySummary {
    fn from(memory: MemoryUsage) -> Self {
        Self {
            total: memory.total_bytes,
            free: memory.free_bytes,
            usage_percent: memory.usage_percent(),
        }
    }
}

/// Completions for one pattern length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PatternSummary {
    pub length: usize,
    pub completed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighCpu,
    WorkersSaturated,
    QueueBacklog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// An operator-facing condition worth attention.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub level: AlertLevel,
    pub message: String,
    pub details: Value,
}

/// Immutable view of the pool, republished by the controller after every change.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub workers: WorkerSummary,
    pub cpu: CpuSummary,
    pub memory: Option<MemorySummary>,
    pub patterns: Vec<PatternSummary>,
    pub alerts: Vec<Alert>,
    pub stats: PoolStats,
}

impl PoolStatus {
    /// Assembles a status snapshot and derives its alerts.
    pub fn build(
        workers: WorkerSummary,
        cpu: CpuSummary,
        memory: Option<MemoryUsage>,
        stats: PoolStats,
        queue_alert_depth: usize,
    ) -> Self {
        let patterns = stats
            .completions_by_length
            .iter()
            .map(|(&length, &completed)| PatternSummary { length, completed })
            .collect();
        let alerts = evaluate_alerts(&workers, &cpu, queue_alert_depth);

        Self {
            workers,
            cpu,
            memory: memory.map(MemorySummary::from),
            patterns,
            alerts,
            stats,
        }
    }
}

/// Derives alerts from a worker and CPU summary.
///
/// - `HighCpu`: window average above target
/// - `WorkersSaturated`: every worker of the current count busy while tasks wait
///   behind the one in flight
/// - `QueueBacklog`: queue depth above `queue_alert_depth`, critical at five times that
pub fn evaluate_alerts(workers: &WorkerSummary, cpu: &CpuSummary, queue_alert_depth: usize) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if let Some(average) = cpu.average.filter(|avg| *avg > cpu.target) {
        alerts.push(Alert {
            kind: AlertKind::HighCpu,
            level: AlertLevel::Warning,
            message: format!(
                "CPU utilization {:.0}% is above the {:.0}% target",
                average * 100.0,
                cpu.target * 100.0
            ),
            details: json!({ "average": average, "target": cpu.target }),
        });
    }

    if workers.current > 0 && workers.active >= workers.current && workers.queue_length > 1 {
        alerts.push(Alert {
            kind: AlertKind::WorkersSaturated,
            level: AlertLevel::Warning,
            message: format!(
                "All {} workers are busy with {} task(s) waiting",
                workers.active,
                workers.queue_length - 1
            ),
            details: json!({
                "active": workers.active,
                "current": workers.current,
                "total": workers.total,
            }),
        });
    }

    if workers.queue_length > queue_alert_depth {
        let level = if workers.queue_length > queue_alert_depth * 5 {
            AlertLevel::Critical
        } else {
            AlertLevel::Warning
        };
        alerts.push(Alert {
            kind: AlertKind::QueueBacklog,
            level,
            message: format!("{} tasks queued", workers.queue_length),
            details: json!({ "queueLength": workers.queue_length, "threshold": queue_alert_depth }),
        });
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cumulative_average_latency() {
        let mut reporter = StatsReporter::new();
        reporter.record_success(3, Duration::from_millis(100), 10);
        reporter.record_success(3, Duration::from_millis(300), 20);
        reporter.record_success(4, Duration::from_millis(200), 30);

        let stats = reporter.snapshot();
        assert_eq!(stats.operations_succeeded, 3);
        assert!((stats.average_latency_ms - 200.0).abs() < 1e-6);
        assert_eq!(stats.last_latency_ms, Some(200.0));
        assert_eq!(stats.keys_tested, 60);
        assert_eq!(stats.completions_by_length.get(&3), Some(&2));
        assert_eq!(stats.completions_by_length.get(&4), Some(&1));
    }

    #[test]
    fn test_failures_do_not_move_latency() {
        let mut reporter = StatsReporter::new();
        reporter.record_success(2, Duration::from_millis(50), 1);
        reporter.record_failure(500);

        let stats = reporter.snapshot();
        assert_eq!(stats.operations_total, 2);
        assert_eq!(stats.operations_failed, 1);
        assert!((stats.average_latency_ms - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut reporter = StatsReporter::new();
        let before = reporter.snapshot();
        reporter.record_spawned(4);
        assert_eq!(before.workers_created, 0);
        assert_eq!(reporter.snapshot().workers_created, 4);
    }

    #[test]
    fn test_no_alerts_when_idle() {
        let workers = WorkerSummary {
            total: 4,
            current: 4,
            active: 0,
            available: 4,
            queue_length: 0,
        };
        let cpu = CpuSummary {
            current: Some(0.3),
            average: Some(0.3),
            target: 0.8,
        };
        assert!(evaluate_alerts(&workers, &cpu, 10).is_empty());
    }

    #[test]
    fn test_all_alerts() {
        let workers = WorkerSummary {
            total: 4,
            current: 4,
            active: 4,
            available: 0,
            queue_length: 11,
        };
        let cpu = CpuSummary {
            current: Some(0.97),
            average: Some(0.95),
            target: 0.8,
        };
        let kinds: Vec<_> = evaluate_alerts(&workers, &cpu, 10).iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![AlertKind::HighCpu, AlertKind::WorkersSaturated, AlertKind::QueueBacklog]
        );
    }

    #[test]
    fn test_saturated_after_throttle() {
        let workers = WorkerSummary {
            total: 8,
            current: 3,
            active: 3,
            available: 5,
            queue_length: 4,
        };
        let alerts = evaluate_alerts(&workers, &CpuSummary::default(), 10);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::WorkersSaturated);
        assert_eq!(alerts[0].details["current"], 3);
    }

    #[test]
    fn test_backlog_escalates() {
        let workers = WorkerSummary {
            total: 4,
            current: 1,
            active: 1,
            available: 3,
            queue_length: 51,
        };
        let alerts = evaluate_alerts(&workers, &CpuSummary::default(), 10);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
    }

    #[test]
    fn test_status_serializes() {
        let mut reporter = StatsReporter::new();
        reporter.record_success(3, Duration::from_millis(10), 5);
        let status = PoolStatus::build(
            WorkerSummary::default(),
            CpuSummary::default(),
            Some(MemoryUsage {
                total_bytes: 100,
                free_bytes: 25,
            }),
            reporter.snapshot(),
            10,
        );
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["patterns"][0]["length"], 3);
        assert_eq!(json["memory"]["usagePercent"], 75.0);
        assert_eq!(json["workers"]["queueLength"], 0);
    }
}
