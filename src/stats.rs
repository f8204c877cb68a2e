//! Online per-metric statistics.

/// Running statistics for one metric using Welford's algorithm.
///
/// Only the last value, the extrema and two running accumulators are kept,
/// so memory use does not grow with the number of observations. The sample
/// count is owned by the caller (the timer's cycle count) and passed to
/// [`update`](Self::update) and [`variance`](Self::variance).
///
/// # Example
///
/// ```
/// use mmbench::StatAccumulator;
///
/// let mut acc = StatAccumulator::new();
/// for (n, x) in [2.0, 4.0].into_iter().enumerate() {
///     acc.update(n as u32 + 1, x);
/// }
/// assert_eq!(acc.average(), 3.0);
/// assert_eq!(acc.variance(2), 2.0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatAccumulator {
    last_value: f64,
    min: f64,
    max: f64,
    running_mean: f64,
    /// Sum of squared deviations from the running mean (Welford's M2).
    running_sum_sq: f64,
}

impl StatAccumulator {
    /// Create a zeroed accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every field.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record the `n`-th observation (`n` starts at 1).
    ///
    /// `n == 0` is a contract violation; the result is unspecified.
    pub fn update(&mut self, n: u32, value: f64) {
        self.last_value = value;
        if n > 1 {
            if value > self.max {
                self.max = value;
            }
            if value < self.min {
                self.min = value;
            }
            let delta = value - self.running_mean;
            self.running_mean += delta / f64::from(n);
            // Second factor uses the updated mean.
            self.running_sum_sq += delta * (value - self.running_mean);
        } else {
            self.min = value;
            self.max = value;
            self.running_mean = value;
            self.running_sum_sq = 0.0;
        }
    }

    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Arithmetic mean of all observations.
    pub fn average(&self) -> f64 {
        self.running_mean
    }

    /// Unbiased sample variance after `n` observations.
    ///
    /// Requires `n >= 2`; smaller counts yield NaN or infinity.
    pub fn variance(&self, n: u32) -> f64 {
        self.running_sum_sq / (f64::from(n) - 1.0)
    }

    /// Square root of [`variance`](Self::variance).
    pub fn std_deviation(&self, n: u32) -> f64 {
        self.variance(n).sqrt()
    }
}
