//! Simulation parameters.

use crate::domain::screening::{AutoScreenRates, ManualScreenRates};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const RATE_EPSILON: f64 = 1e-6;

/// Static parameters governing one simulation run.
///
/// Throughputs are expressed in operations per second; each worker turns them
/// into a per-item latency of `1000 / rps` milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Client transfers emitted per second. Zero disables the client emitter.
    pub client_tps: f64,

    /// Bounds (inclusive, whole seconds) of the pause before each corporate batch.
    pub corporate_batch_min_interval_secs: u64,
    pub corporate_batch_max_interval_secs: u64,

    /// Bounds (inclusive) of the corporate batch size. A zero maximum disables
    /// the corporate emitter.
    pub corporate_batch_min_size: u32,
    pub corporate_batch_max_size: u32,

    /// Capacity of both priority lanes.
    pub priority_queue_capacity: usize,

    /// Capacity of both normal lanes; `None` means unbounded.
    pub normal_queue_capacity: Option<usize>,

    pub auto_screening_rps: f64,
    pub manual_screening_rps: f64,

    /// Execution latency is drawn between `1000 / max` and `1000 / min` ms.
    pub execution_min_rps: f64,
    pub execution_max_rps: f64,

    pub auto_screen_rates: AutoScreenRates,
    pub manual_screen_rates: ManualScreenRates,

    /// Manual-review attempts allowed before a flagged transaction is rejected.
    pub max_retry_attempts: u32,

    pub run_duration_secs: u64,

    /// Interval between metric snapshots.
    pub metrics_interval_secs: u64,

    /// Pause between raising cancellation and closing the queues.
    pub shutdown_grace_ms: u64,

    /// Seed for the per-task random generators. Random when unset.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            client_tps: 5.0,
            corporate_batch_min_interval_secs: 5,
            corporate_batch_max_interval_secs: 10,
            corporate_batch_min_size: 10,
            corporate_batch_max_size: 100,
            priority_queue_capacity: 100,
            normal_queue_capacity: None,
            auto_screening_rps: 3.0,
            manual_screening_rps: 0.1,
            execution_min_rps: 1.0,
            execution_max_rps: 2.0,
            auto_screen_rates: AutoScreenRates::default(),
            manual_screen_rates: ManualScreenRates::default(),
            max_retry_attempts: 3,
            run_duration_secs: 600,
            metrics_interval_secs: 5,
            shutdown_grace_ms: 2000,
            seed: None,
        }
    }
}

fn check_rate(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "{name} must be positive, got {value}"
        )));
    }
    // The per-item latency is `1 / value` seconds and must fit a `Duration`.
    Duration::try_from_secs_f64(1.0 / value).map_err(|_| {
        PipelineError::InvalidConfig(format!("{name} is too small, got {value}"))
    })?;
    Ok(())
}

fn check_range<T: PartialOrd + std::fmt::Display>(name: &str, min: T, max: T) -> Result<()> {
    if min <= max {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig(format!(
            "{name}: minimum {min} exceeds maximum {max}"
        )))
    }
}

impl SimulationConfig {
    /// Loads a configuration from a JSON file. Missing keys take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_tps != 0.0 {
            check_positive("client_tps", self.client_tps)?;
        }
        check_range(
            "corporate batch interval",
            self.corporate_batch_min_interval_secs,
            self.corporate_batch_max_interval_secs,
        )?;
        check_range(
            "corporate batch size",
            self.corporate_batch_min_size,
            self.corporate_batch_max_size,
        )?;
        if self.priority_queue_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "priority_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.normal_queue_capacity == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "normal_queue_capacity must be at least 1 when bounded".to_string(),
            ));
        }

        check_positive("auto_screening_rps", self.auto_screening_rps)?;
        check_positive("manual_screening_rps", self.manual_screening_rps)?;
        check_positive("execution_min_rps", self.execution_min_rps)?;
        check_positive("execution_max_rps", self.execution_max_rps)?;
        check_range("execution rps", self.execution_min_rps, self.execution_max_rps)?;

        let auto = self.auto_screen_rates;
        check_rate("auto pass rate", auto.pass)?;
        check_rate("auto retry rate", auto.retry)?;
        check_rate("auto reject rate", auto.reject)?;
        if (auto.pass + auto.retry + auto.reject - 1.0).abs() > RATE_EPSILON {
            return Err(PipelineError::InvalidConfig(
                "auto-screen rates must sum to 1.0".to_string(),
            ));
        }

        let manual = self.manual_screen_rates;
        check_rate("manual pass rate", manual.pass)?;
        check_rate("manual reject rate", manual.reject)?;
        if (manual.pass + manual.reject - 1.0).abs() > RATE_EPSILON {
            return Err(PipelineError::InvalidConfig(
                "manual-screen rates must sum to 1.0".to_string(),
            ));
        }

        if self.metrics_interval_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "metrics_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_client_tps(mut self, tps: f64) -> Self {
        self.client_tps = tps;
        self
    }

    pub fn with_corporate_batches(
        mut self,
        interval_secs: (u64, u64),
        size: (u32, u32),
    ) -> Self {
        self.corporate_batch_min_interval_secs = interval_secs.0;
        self.corporate_batch_max_interval_secs = interval_secs.1;
        self.corporate_batch_min_size = size.0;
        self.corporate_batch_max_size = size.1;
        self
    }

    /// Turns off both emitters so the run only sees submitted transactions.
    pub fn without_generators(mut self) -> Self {
        self.client_tps = 0.0;
        self.corporate_batch_min_size = 0;
        self.corporate_batch_max_size = 0;
        self
    }

    pub fn with_priority_queue_capacity(mut self, capacity: usize) -> Self {
        self.priority_queue_capacity = capacity;
        self
    }

    pub fn with_normal_queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.normal_queue_capacity = capacity;
        self
    }

    pub fn with_auto_screen_rates(mut self, pass: f64, retry: f64, reject: f64) -> Self {
        self.auto_screen_rates = AutoScreenRates {
            pass,
            retry,
            reject,
        };
        self
    }

    pub fn with_manual_screen_rates(mut self, pass: f64, reject: f64) -> Self {
        self.manual_screen_rates = ManualScreenRates { pass, reject };
        self
    }

    pub fn with_throughput(mut self, auto_rps: f64, manual_rps: f64, execution_rps: (f64, f64)) -> Self {
        self.auto_screening_rps = auto_rps;
        self.manual_screening_rps = manual_rps;
        self.execution_min_rps = execution_rps.0;
        self.execution_max_rps = execution_rps.1;
        self
    }

    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    pub fn with_run_duration(mut self, duration: Duration) -> Self {
        self.run_duration_secs = duration.as_secs();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn client_emitter_enabled(&self) -> bool {
        self.client_tps > 0.0
    }

    pub fn corporate_emitter_enabled(&self) -> bool {
        self.corporate_batch_max_size > 0
    }

    pub fn client_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.client_tps)
    }

    pub fn auto_screening_latency(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.auto_screening_rps)
    }

    pub fn manual_screening_latency(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.manual_screening_rps)
    }

    /// Fastest and slowest execution latency.
    pub fn execution_latency_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_secs_f64(1.0 / self.execution_max_rps),
            Duration::from_secs_f64(1.0 / self.execution_min_rps),
        )
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.run_duration_secs)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
