//! CPU utilization monitoring over a rolling window.
//!
//! The monitor samples a [`SystemLoadProbe`] on every maintenance tick,
//! keeps the samples that fall inside the trailing window, and exposes their
//! mean. The pool consults that mean to decide whether to shed or add
//! workers.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;
use sysinfo::{CpuExt, System, SystemExt};
use tracing::{debug, trace, warn};

/// Source of system load readings.
pub trait SystemLoadProbe: Send {
    /// Aggregate non-idle CPU fraction across all logical cores, in `0..=1`.
    ///
    /// Returns `None` when no reading is available.
    fn cpu_utilization(&mut self) -> Option<f64>;

    /// Current memory figures, if the platform exposes them.
    fn memory(&mut self) -> Option<MemoryUsage> {
        None
    }
}

/// System memory figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl MemoryUsage {
    /// Used memory as a percentage of total.
    pub fn usage_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.free_bytes);
        used as f64 / self.total_bytes as f64 * 100.0
    }
}

/// One utilization reading.
#[derive(Debug, Clone, Copy)]
pub struct UtilizationSample {
    pub timestamp: Instant,
    pub utilization: f64,
}

impl UtilizationSample {
    pub fn now(utilization: f64) -> Self {
        Self {
            timestamp: Instant::now(),
            utilization,
        }
    }
}

/// Rolling-window CPU utilization tracker.
pub struct CpuMonitor {
    probe: Box<dyn SystemLoadProbe>,
    samples: VecDeque<UtilizationSample>,
    window: Duration,
    target: f64,
    memory: Option<MemoryUsage>,
    /// Set once the probe has failed to report, so the warning is logged once
    unavailable_reported: bool,
}

impl CpuMonitor {
    pub fn new(probe: Box<dyn SystemLoadProbe>, target: f64, window: Duration) -> Self {
        Self {
            probe,
            samples: VecDeque::new(),
            window,
            target,
            memory: None,
            unavailable_reported: false,
        }
    }

    /// Samples the probe, prunes stale readings, and returns the window mean.
    pub fn tick(&mut self) -> Option<f64> {
        if let Some(utilization) = self.probe.cpu_utilization() {
            self.record(UtilizationSample::now(utilization.clamp(0.0, 1.0)));
        } else {
            if !self.unavailable_reported {
                warn!("CPU utilization unavailable; worker count will not adapt to load");
                self.unavailable_reported = true;
            }
            self.prune(Instant::now());
        }
        if let Some(memory) = self.probe.memory() {
            self.memory = Some(memory);
        }

        let average = self.average();
        debug!(
            current = ?self.current(),
            average = ?average,
            samples = self.samples.len(),
            "CPU utilization sampled"
        );
        average
    }

    /// Appends a reading and prunes anything older than the window.
    pub fn record(&mut self, sample: UtilizationSample) {
        trace!(utilization = sample.utilization, "Recording utilization sample");
        self.samples.push_back(sample);
        self.prune(sample.timestamp);
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.samples.front() {
            let age = now.saturating_duration_since(oldest.timestamp);
            if age <= self.window {
                break;
            }
            self.samples.pop_front();
        }
    }

    /// Mean utilization across the window.
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|s| s.utilization).sum();
        Some(sum / self.samples.len() as f64)
    }

    /// Most recent reading.
    pub fn current(&self) -> Option<f64> {
        self.samples.back().map(|s| s.utilization)
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    /// True when the window mean exceeds the target.
    pub fn over_budget(&self) -> bool {
        self.average().map_or(false, |avg| avg > self.target)
    }

    /// Last memory figures reported by the probe.
    pub fn memory(&self) -> Option<MemoryUsage> {
        self.memory
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// True once the probe has failed to produce a reading.
    pub fn probe_unavailable(&self) -> bool {
        self.unavailable_reported
    }
}

/// The load probe for this platform: `/proc` on Linux, `sysinfo` elsewhere.
pub fn default_probe() -> Box<dyn SystemLoadProbe> {
    if cfg!(target_os = "linux") {
        Box::new(ProcStatProbe::new())
    } else {
        Box::new(SysinfoProbe::new())
    }
}

/// Reads CPU and memory figures from `/proc` (Linux only).
///
/// Utilization is the non-idle share of ticks between consecutive reads of
/// the aggregate `cpu` line in `/proc/stat`.
#[derive(Debug, Default)]
pub struct ProcStatProbe {
    last: Option<CpuTicks>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTicks {
    total: u64,
    idle: u64,
}

impl CpuTicks {
    /// Parses the aggregate line: `cpu user nice system idle iowait irq softirq steal ...`
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        if parts.next()? != "cpu" {
            return None;
        }
        let values: Vec<u64> = parts.take(8).filter_map(|v| v.parse().ok()).collect();
        if values.len() < 4 {
            return None;
        }
        let total = values.iter().sum();
        let idle = values[3] + values.get(4).copied().unwrap_or(0);
        Some(Self { total, idle })
    }

    fn utilization_since(&self, prev: &CpuTicks) -> Option<f64> {
        let total = self.total.saturating_sub(prev.total);
        if total == 0 {
            return None;
        }
        let idle = self.idle.saturating_sub(prev.idle);
        Some(total.saturating_sub(idle) as f64 / total as f64)
    }
}

impl ProcStatProbe {
    /// Creates the probe and takes a baseline reading, so the first tick
    /// already yields a utilization figure.
    pub fn new() -> Self {
        Self {
            last: Self::read_ticks(),
        }
    }

    #[cfg(target_os = "linux")]
    fn read_ticks() -> Option<CpuTicks> {
        let content = std::fs::read_to_string("/proc/stat").ok()?;
        content.lines().next().and_then(CpuTicks::parse)
    }

    #[cfg(not(target_os = "linux"))]
    fn read_ticks() -> Option<CpuTicks> {
        None
    }

    #[cfg(target_os = "linux")]
    fn read_memory() -> Option<MemoryUsage> {
        let content = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_meminfo(&content)
    }

    #[cfg(not(target_os = "linux"))]
    fn read_memory() -> Option<MemoryUsage> {
        None
    }
}

impl SystemLoadProbe for ProcStatProbe {
    fn cpu_utilization(&mut self) -> Option<f64> {
        let now = Self::read_ticks()?;
        let utilization = self.last.and_then(|prev| now.utilization_since(&prev));
        self.last = Some(now);
        utilization
    }

    fn memory(&mut self) -> Option<MemoryUsage> {
        Self::read_memory()
    }
}

/// Cross-platform probe backed by `sysinfo`.
pub struct SysinfoProbe {
    system: System,
}

impl SysinfoProbe {
    /// Creates the probe with a baseline CPU refresh; usage is measured
    /// between consecutive refreshes.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self { system }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemLoadProbe for SysinfoProbe {
    fn cpu_utilization(&mut self) -> Option<f64> {
        self.system.refresh_cpu();
        let usage = f64::from(self.system.global_cpu_info().cpu_usage()) / 100.0;
        usage.is_finite().then(|| usage.clamp(0.0, 1.0))
    }

    fn memory(&mut self) -> Option<MemoryUsage> {
        self.system.refresh_memory();
        let total_bytes = self.system.total_memory();
        if total_bytes == 0 {
            return None;
        }
        Some(MemoryUsage {
            total_bytes,
            free_bytes: self.system.available_memory(),
        })
    }
}

/// Extracts `MemTotal` and `MemAvailable` (kB) from `/proc/meminfo` text.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo(content: &str) -> Option<MemoryUsage> {
    let field = |name: &str| -> Option<u64> {
        content
            .lines()
            .find_map(|line| line.strip_prefix(name))
            .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok())
            .map(|kb| kb * 1024)
    };

    Some(MemoryUsage {
        total_bytes: field("MemTotal:")?,
        free_bytes: field("MemAvailable:").or_else(|| field("MemFree:"))?,
    })
}
