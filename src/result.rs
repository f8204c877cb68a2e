//! Benchmark result types.

use crate::render::OutputFormat;
use crate::timer::{Metric, Statistic, Timer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Statistics for one metric. `None` marks a value that is not available
/// (fewer than two cycles, or nothing recorded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric: Metric,
    pub last_value: Option<f64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub average: Option<f64>,
    pub variance: Option<f64>,
    pub std_deviation: Option<f64>,
}

impl MetricSummary {
    pub fn from_timer(timer: &Timer, metric: Metric) -> Self {
        let get = |stat| {
            let v = timer.value(metric, stat);
            v.is_finite().then_some(v)
        };
        Self {
            metric,
            last_value: get(Statistic::LastValue),
            minimum: get(Statistic::Min),
            maximum: get(Statistic::Max),
            average: get(Statistic::Average),
            variance: get(Statistic::Variance),
            std_deviation: get(Statistic::StdDeviation),
        }
    }
}

/// Snapshot of a timer's statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSummary {
    pub cycles: u32,
    pub metrics: Vec<MetricSummary>,
}

impl TimerSummary {
    pub fn metric(&self, metric: Metric) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.metric == metric)
    }
}

impl From<&Timer> for TimerSummary {
    fn from(timer: &Timer) -> Self {
        Self {
            cycles: timer.cycle_count(),
            metrics: Metric::ALL
                .into_iter()
                .map(|m| MetricSummary::from_timer(timer, m))
                .collect(),
        }
    }
}

/// Result of benchmarking one multiply routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineResult {
    /// Multiply strategy name, e.g. "smart".
    pub routine: String,
    /// Init strategy specification used for every matrix.
    pub init_method: String,
    pub dimension: usize,
    pub nloop: usize,
    pub nthreads: usize,
    /// Init timer: three cycles per iteration (A, B and C).
    pub init: TimerSummary,
    /// Init cost per iteration: one cycle covering A, B and C together.
    pub iteration_init: TimerSummary,
    /// Multiply timer: one cycle per iteration.
    pub multiply: TimerSummary,
}

impl RoutineResult {
    /// Floating-point operations per second from the average multiply walltime.
    pub fn average_flops(&self) -> Option<f64> {
        let n = self.dimension as f64;
        self.multiply
            .metric(Metric::Walltime)?
            .average
            .filter(|t| *t > 0.0)
            .map(|t| 2.0 * n * n * n / t)
    }
}

/// Results for an entire benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    /// One entry per routine, in run order.
    pub results: Vec<RoutineResult>,
    /// Timestamp when the run started (unix milliseconds).
    pub started_at: String,
    /// Total run duration.
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Format used for the timer summaries.
    pub format: OutputFormat,
}

impl SuiteResult {
    /// Load a suite result from JSON file.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Write this result as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    pub fn routine(&self, name: &str) -> Option<&RoutineResult> {
        self.results.iter().find(|r| r.routine == name)
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_nanos().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let nanos = u128::deserialize(d)?;
        Ok(Duration::from_nanos(nanos as u64))
    }
}
