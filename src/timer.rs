//! Execution timer with running resource-usage statistics.

use crate::stats::StatAccumulator;
use crate::usage::UsageSnapshot;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Number of tracked metrics.
pub const METRIC_COUNT: usize = 7;

/// One value per metric, indexed by [`Metric::index`].
pub type MetricValues = [f64; METRIC_COUNT];

/// A timer shared between collaborators that want pooled statistics.
///
/// Cloning the `Rc` retains the timer; dropping the last clone frees it.
pub type SharedTimer = Rc<RefCell<Timer>>;

/// A tracked resource-usage dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    Walltime,
    UserCpu,
    SystemCpu,
    /// Peak resident set size; recorded as the end-of-window watermark.
    MaxRss,
    NSwaps,
    IoBlocksIn,
    IoBlocksOut,
}

impl Metric {
    pub const ALL: [Metric; METRIC_COUNT] = [
        Metric::Walltime,
        Metric::UserCpu,
        Metric::SystemCpu,
        Metric::MaxRss,
        Metric::NSwaps,
        Metric::IoBlocksIn,
        Metric::IoBlocksOut,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Display label used by every output format.
    pub fn label(self) -> &'static str {
        match self {
            Metric::Walltime => "Walltime",
            Metric::UserCpu => "User CPU time",
            Metric::SystemCpu => "System CPU time",
            Metric::MaxRss => "rusage.ru_maxrss",
            Metric::NSwaps => "rusage.ru_nswap",
            Metric::IoBlocksIn => "rusage.ru_inblock",
            Metric::IoBlocksOut => "rusage.ru_outblock",
        }
    }
}

impl TryFrom<usize> for Metric {
    type Error = usize;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Metric::ALL.get(index).copied().ok_or(index)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A value derived from a metric's accumulated observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Statistic {
    LastValue,
    Min,
    Max,
    Average,
    Variance,
    StdDeviation,
}

impl Statistic {
    pub const ALL: [Statistic; 6] = [
        Statistic::LastValue,
        Statistic::Min,
        Statistic::Max,
        Statistic::Average,
        Statistic::Variance,
        Statistic::StdDeviation,
    ];

    /// Key used by the structured formats (json, yaml).
    pub fn key(self) -> &'static str {
        match self {
            Statistic::LastValue => "last-value",
            Statistic::Min => "minimum",
            Statistic::Max => "maximum",
            Statistic::Average => "average",
            Statistic::Variance => "variance",
            Statistic::StdDeviation => "standard-deviation",
        }
    }

    /// Column heading used by the delimited formats (table, csv, tsv).
    pub fn heading(self) -> &'static str {
        match self {
            Statistic::LastValue => "last value",
            Statistic::Min => "minimum",
            Statistic::Max => "maximum",
            Statistic::Average => "average",
            Statistic::Variance => "variance",
            Statistic::StdDeviation => "std deviation",
        }
    }
}

/// Accumulates resource-usage statistics over repeated start/stop cycles.
///
/// Each matched [`start`](Self::start)/[`stop`](Self::stop) pair is one
/// cycle. Stopping records one observation per [`Metric`]: deltas between
/// the two snapshots, except [`Metric::MaxRss`] which is the absolute value
/// at the end of the window.
///
/// ```
/// use mmbench::{Metric, Statistic, Timer};
///
/// let mut timer = Timer::new();
/// for _ in 0..3 {
///     timer.measure(|| std::hint::black_box((0..1000).sum::<u64>()));
/// }
/// assert_eq!(timer.cycle_count(), 3);
/// assert!(timer.value(Metric::Walltime, Statistic::Average).is_finite());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Timer {
    started: bool,
    start: Option<UsageSnapshot>,
    last_window: Option<(UsageSnapshot, UsageSnapshot)>,
    cycle_count: u32,
    metrics: [StatAccumulator; METRIC_COUNT],
}

impl Timer {
    /// Create an empty timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty timer wrapped for shared ownership.
    pub fn shared() -> SharedTimer {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Zero the cycle count, the started flag and every accumulator.
    pub fn reset(&mut self) {
        self.started = false;
        self.last_window = None;
        self.cycle_count = 0;
        for m in &mut self.metrics {
            m.reset();
        }
    }

    /// True strictly between a `start()` and its matching `stop()`.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// At least two cycles are needed for variance and deviation.
    pub fn has_statistics(&self) -> bool {
        self.cycle_count > 1
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    /// Open a measurement window.
    ///
    /// Calling this while already started discards the unmatched start.
    pub fn start(&mut self) {
        self.started = true;
        self.start = Some(UsageSnapshot::open());
    }

    /// Close the window and record one cycle. No-op when not started.
    pub fn stop(&mut self) {
        let Some(start) = self.start.filter(|_| self.started) else {
            return;
        };
        let end = UsageSnapshot::close();
        self.started = false;
        self.last_window = Some((start, end));
        self.record(window_values(&start, &end));
    }

    /// Start and end snapshots of the most recent `stop()`.
    ///
    /// `None` after a reset and for cycles supplied through `record()`.
    pub fn last_window(&self) -> Option<(UsageSnapshot, UsageSnapshot)> {
        self.last_window
    }

    /// One value per metric from the most recent cycle, `None` before the first.
    pub fn last_values(&self) -> Option<MetricValues> {
        (self.cycle_count > 0).then(|| Metric::ALL.map(|m| self.metric(m).last_value()))
    }

    /// Close the window without recording a cycle.
    ///
    /// Strategies call this when the timed operation fails part way.
    pub fn cancel(&mut self) {
        self.started = false;
    }

    /// Record one cycle from externally measured values.
    ///
    /// Use this when the timing happens inside the system under test.
    pub fn record(&mut self, values: MetricValues) {
        self.last_window = None;
        self.cycle_count += 1;
        for (acc, value) in self.metrics.iter_mut().zip(values) {
            acc.update(self.cycle_count, value);
        }
    }

    /// Time a single operation as one cycle.
    pub fn measure<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.start();
        let result = f();
        self.stop();
        result
    }

    /// Accumulator backing one metric.
    pub fn metric(&self, metric: Metric) -> &StatAccumulator {
        &self.metrics[metric.index()]
    }

    /// Read one statistic.
    ///
    /// Returns `f64::INFINITY` when nothing has been recorded, and for every
    /// statistic except [`Statistic::LastValue`] until two cycles exist.
    pub fn value(&self, metric: Metric, statistic: Statistic) -> f64 {
        if self.cycle_count == 0 {
            return f64::INFINITY;
        }
        let acc = self.metric(metric);
        if !self.has_statistics() {
            return match statistic {
                Statistic::LastValue => acc.last_value(),
                _ => f64::INFINITY,
            };
        }
        match statistic {
            Statistic::LastValue => acc.last_value(),
            Statistic::Min => acc.min(),
            Statistic::Max => acc.max(),
            Statistic::Average => acc.average(),
            Statistic::Variance => acc.variance(self.cycle_count),
            Statistic::StdDeviation => acc.std_deviation(self.cycle_count),
        }
    }

    /// Like [`value`](Self::value) with a raw metric index; out-of-range
    /// indices read as `f64::INFINITY`.
    pub fn value_by_index(&self, index: usize, statistic: Statistic) -> f64 {
        Metric::try_from(index).map_or(f64::INFINITY, |m| self.value(m, statistic))
    }
}

fn window_values(start: &UsageSnapshot, end: &UsageSnapshot) -> MetricValues {
    let (s, e) = (&start.usage, &end.usage);
    let mut values = [0.0; METRIC_COUNT];
    values[Metric::Walltime.index()] = end.at.saturating_duration_since(start.at).as_secs_f64();
    values[Metric::UserCpu.index()] = e.user_cpu - s.user_cpu;
    values[Metric::SystemCpu.index()] = e.system_cpu - s.system_cpu;
    values[Metric::MaxRss.index()] = e.max_rss as f64;
    values[Metric::NSwaps.index()] = (e.nswap - s.nswap) as f64;
    values[Metric::IoBlocksIn.index()] = (e.inblock - s.inblock) as f64;
    values[Metric::IoBlocksOut.index()] = (e.oublock - s.oublock) as f64;
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn walltime(v: f64) -> MetricValues {
        let mut values = [0.0; METRIC_COUNT];
        values[Metric::Walltime.index()] = v;
        values
    }

    #[test]
    fn should_measure_walltime_when_started_and_stopped() {
        let mut timer = Timer::new();
        timer.measure(|| std::thread::sleep(Duration::from_millis(10)));

        let wall = timer.value(Metric::Walltime, Statistic::LastValue);
        assert!(wall >= 0.010);
        assert!(wall < 1.0);
        assert_eq!(timer.cycle_count(), 1);
        assert!(!timer.is_started());
    }

    #[test]
    fn should_ignore_stop_without_start() {
        let mut timer = Timer::new();
        timer.stop();
        assert_eq!(timer.cycle_count(), 0);
        assert_eq!(timer.value(Metric::Walltime, Statistic::LastValue), f64::INFINITY);
    }

    #[test]
    fn should_record_one_cycle_when_started_twice() {
        let mut timer = Timer::new();
        timer.start();
        timer.start();
        assert!(timer.is_started());
        assert_eq!(timer.cycle_count(), 0);
        timer.stop();
        assert_eq!(timer.cycle_count(), 1);
        timer.stop();
        assert_eq!(timer.cycle_count(), 1);
    }

    #[test]
    fn should_expose_only_last_value_after_one_cycle() {
        let mut timer = Timer::new();
        timer.record(walltime(0.5));
        assert!(!timer.has_statistics());
        assert_eq!(timer.value(Metric::Walltime, Statistic::LastValue), 0.5);
        for stat in &Statistic::ALL[1..] {
            assert_eq!(timer.value(Metric::Walltime, *stat), f64::INFINITY);
        }
    }

    #[test]
    fn should_report_zero_spread_for_constant_samples() {
        let mut timer = Timer::new();
        for _ in 0..4 {
            timer.record(walltime(1.0));
        }
        assert!(timer.has_statistics());
        for stat in [Statistic::LastValue, Statistic::Min, Statistic::Max, Statistic::Average] {
            assert_eq!(timer.value(Metric::Walltime, stat), 1.0);
        }
        assert_eq!(timer.value(Metric::Walltime, Statistic::Variance), 0.0);
        assert_eq!(timer.value(Metric::Walltime, Statistic::StdDeviation), 0.0);
    }

    #[test]
    fn should_compute_unbiased_variance_for_two_samples() {
        let mut timer = Timer::new();
        timer.record(walltime(2.0));
        timer.record(walltime(4.0));
        assert_eq!(timer.value(Metric::Walltime, Statistic::Average), 3.0);
        assert_eq!(timer.value(Metric::Walltime, Statistic::Variance), 2.0);
        assert_relative_eq!(
            timer.value(Metric::Walltime, Statistic::StdDeviation),
            std::f64::consts::SQRT_2,
            epsilon = 1e-12
        );
        assert_eq!(timer.value(Metric::Walltime, Statistic::Min), 2.0);
        assert_eq!(timer.value(Metric::Walltime, Statistic::Max), 4.0);
    }

    #[test]
    fn should_behave_like_fresh_timer_after_reset() {
        let mut timer = Timer::new();
        for v in [3.0, 9.0, 27.0] {
            timer.record(walltime(v));
        }
        timer.start();
        timer.reset();
        assert!(!timer.is_started());
        assert_eq!(timer.cycle_count(), 0);

        timer.record(walltime(5.0));
        assert_eq!(timer.cycle_count(), 1);
        let acc = timer.metric(Metric::Walltime);
        assert_eq!(acc.min(), 5.0);
        assert_eq!(acc.max(), 5.0);
        assert_eq!(acc.average(), 5.0);
    }

    #[test]
    fn should_return_infinity_for_out_of_range_metric() {
        let mut timer = Timer::new();
        timer.record(walltime(1.0));
        timer.record(walltime(2.0));
        assert_eq!(timer.value_by_index(METRIC_COUNT, Statistic::Average), f64::INFINITY);
        assert_eq!(timer.value_by_index(0, Statistic::Average), 1.5);
        assert_eq!(Metric::try_from(3), Ok(Metric::MaxRss));
    }

    #[test]
    #[cfg(unix)]
    fn should_record_peak_rss_as_absolute_value() {
        let mut timer = Timer::new();
        timer.measure(|| ());
        // A delta would be ~0; the watermark is the process's resident peak.
        assert!(timer.value(Metric::MaxRss, Statistic::LastValue) > 0.0);
    }

    #[test]
    #[cfg(unix)]
    fn should_record_cpu_and_io_counters_as_window_deltas() {
        use crate::usage::ResourceUsage;

        // Accumulate process CPU time so a raw counter could not pass for a delta.
        let mut acc = 0u64;
        while ResourceUsage::current().user_cpu < 0.2 {
            for i in 0..100_000u64 {
                acc = std::hint::black_box(acc.wrapping_mul(31).wrapping_add(i));
            }
        }
        std::hint::black_box(acc);

        let mut timer = Timer::new();
        timer.measure(|| ());

        let (start, end) = timer.last_window().unwrap();
        let (s, e) = (start.usage, end.usage);
        let user = timer.value(Metric::UserCpu, Statistic::LastValue);
        assert!(user < 0.05);
        assert!(ResourceUsage::current().user_cpu >= 0.2);
        assert_eq!(user, e.user_cpu - s.user_cpu);
        assert_eq!(timer.value(Metric::SystemCpu, Statistic::LastValue), e.system_cpu - s.system_cpu);
        assert_eq!(timer.value(Metric::NSwaps, Statistic::LastValue), (e.nswap - s.nswap) as f64);
        assert_eq!(timer.value(Metric::IoBlocksIn, Statistic::LastValue), (e.inblock - s.inblock) as f64);
        assert_eq!(timer.value(Metric::IoBlocksOut, Statistic::LastValue), (e.oublock - s.oublock) as f64);
        assert_eq!(timer.value(Metric::MaxRss, Statistic::LastValue), e.max_rss as f64);
    }

    #[test]
    fn should_discard_cancelled_window() {
        let mut timer = Timer::new();
        timer.record(walltime(1.0));
        timer.start();
        timer.cancel();
        timer.stop();

        assert!(!timer.is_started());
        assert_eq!(timer.cycle_count(), 1);
        assert_eq!(timer.value(Metric::Walltime, Statistic::LastValue), 1.0);
    }

    #[test]
    fn should_forget_last_window_on_reset_and_record() {
        let mut timer = Timer::new();
        assert!(timer.last_values().is_none());
        timer.measure(|| ());
        assert!(timer.last_window().is_some());

        timer.record(walltime(2.5));
        assert!(timer.last_window().is_none());
        assert_eq!(timer.last_values().unwrap()[Metric::Walltime.index()], 2.5);

        timer.reset();
        assert!(timer.last_values().is_none());
    }

    #[test]
    fn should_pool_samples_through_shared_timer() {
        let timer = Timer::shared();
        let other = Rc::clone(&timer);
        timer.borrow_mut().record(walltime(1.0));
        other.borrow_mut().record(walltime(3.0));
        assert_eq!(Rc::strong_count(&timer), 2);
        drop(other);
        assert_eq!(timer.borrow().cycle_count(), 2);
        assert_eq!(timer.borrow().value(Metric::Walltime, Statistic::Average), 2.0);
    }
}
