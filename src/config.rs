//! Runtime configuration for the search engine and its CLI.

use std::time::Duration;

use clap::Parser;

use crate::error::{Result, VanityError};
use crate::matcher::Position;

/// Tunables of the search engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// CPU utilization budget as a fraction of all cores
    pub target_utilization: f64,
    /// How often the utilization probe is sampled
    pub check_interval: Duration,
    /// Trailing window the utilization average covers
    pub utilization_window: Duration,
    /// Deadline for a single generation when the caller sets none
    pub default_timeout: Duration,
    /// Expected-attempt ceiling above which patterns are refused; `None` admits all
    pub max_expected_attempts: Option<f64>,
    /// Calibrated keypairs per second of one worker
    pub per_core_rate: f64,
    /// Starting worker count (default: the pool maximum)
    pub initial_workers: Option<usize>,
    /// Maximum number of queued tasks
    pub queue_capacity: usize,
    /// Queue depth above which a backlog alert is raised
    pub queue_alert_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_utilization: 0.80,
            check_interval: Duration::from_millis(5_000),
            utilization_window: Duration::from_millis(30_000),
            default_timeout: Duration::from_millis(300_000),
            max_expected_attempts: Some(1e12),
            per_core_rate: 25_000.0,
            initial_workers: None,
            queue_capacity: 1_000,
            queue_alert_depth: 10,
        }
    }
}

impl EngineConfig {
    pub fn with_target_utilization(mut self, target: f64) -> Self {
        self.target_utilization = target;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_utilization_window(mut self, window: Duration) -> Self {
        self.utilization_window = window;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_max_expected_attempts(mut self, ceiling: Option<f64>) -> Self {
        self.max_expected_attempts = ceiling;
        self
    }

    pub fn with_initial_workers(mut self, workers: usize) -> Self {
        self.initial_workers = Some(workers);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.target_utilization > 0.0 && self.target_utilization <= 1.0) {
            return Err(VanityError::Config(format!(
                "target utilization must be in (0, 1], got {}",
                self.target_utilization
            )));
        }
        if self.check_interval.is_zero() {
            return Err(VanityError::Config("check interval must be non-zero".into()));
        }
        if self.utilization_window < self.check_interval {
            return Err(VanityError::Config(
                "utilization window must cover at least one check interval".into(),
            ));
        }
        if self.default_timeout.is_zero() {
            return Err(VanityError::Config("default timeout must be non-zero".into()));
        }
        if !(self.per_core_rate > 0.0) {
            return Err(VanityError::Config("per-core rate must be positive".into()));
        }
        if self.initial_workers == Some(0) {
            return Err(VanityError::Config("initial workers must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(VanityError::Config("queue capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Base58 Vanity Address Generator
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Pattern to search for (base58 characters only; no 0, O, I or l)
    #[arg(short, long)]
    pub pattern: String,

    /// Where the pattern must appear: start, end, or anywhere
    #[arg(short = 't', long, default_value = "start")]
    pub position: Position,

    /// Case sensitive matching
    #[arg(short = 'c', long, default_value = "false")]
    pub case_sensitive: bool,

    /// Number of addresses to generate
    #[arg(short = 'n', long, default_value = "1")]
    pub count: usize,

    /// Starting number of worker threads (default: logical cores - 1)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Per-address timeout in seconds
    #[arg(long, default_value = "300")]
    pub timeout: u64,

    /// CPU utilization budget (0-1]
    #[arg(long, default_value = "0.8")]
    pub target_cpu: f64,

    /// Allow patterns beyond the default difficulty ceiling
    #[arg(long, default_value = "false")]
    pub no_ceiling: bool,

    /// Progress report interval in seconds
    #[arg(short = 'r', long, default_value = "5")]
    pub report_interval: u64,

    /// Print the final pool status as JSON
    #[arg(long, default_value = "false")]
    pub status_json: bool,
}

impl Config {
    /// Builds the engine configuration for this invocation.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default()
            .with_target_utilization(self.target_cpu)
            .with_default_timeout(Duration::from_secs(self.timeout));
        if let Some(workers) = self.workers {
            config = config.with_initial_workers(workers);
        }
        if self.no_ceiling {
            config = config.with_max_expected_attempts(None);
        }
        config
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(VanityError::Config("count must be at least 1".into()));
        }
        if self.report_interval == 0 {
            return Err(VanityError::Config("report interval must be at least 1".into()));
        }
        self.engine_config().validate()
    }
}
