//! The benchmark driver.

use crate::config::{BenchConfig, DEFAULT_ROUTINES};
use crate::error::{RegistryError, Result};
use crate::init::{init_registry, InitHandle, InitRegistry};
use crate::multiply::{multiply_registry, MultiplyRegistry};
use crate::report::{ConsoleReporter, JsonReporter, Reporter};
use crate::result::{RoutineResult, SuiteResult, TimerSummary};
use crate::timer::{Metric, MetricValues, Timer};
use crate::Real;
use std::collections::BTreeSet;
use std::time::Instant;

/// Runs every selected multiply routine against freshly initialized matrices.
///
/// # Example
///
/// ```rust,no_run
/// use mmbench::{BenchConfig, BenchRunner};
///
/// let config = BenchConfig::new()
///     .dimension(256)
///     .init("random=7")
///     .routines("-basic,+parallel");
///
/// let mut runner = BenchRunner::with_config(config)?;
/// let suite = runner.run()?;
/// println!("{} routines", suite.results.len());
/// # Ok::<(), mmbench::MmbenchError>(())
/// ```
pub struct BenchRunner {
    config: BenchConfig,
    multiply_registry: MultiplyRegistry,
    init_registry: InitRegistry,
    init: InitHandle,
    routines: Vec<String>,
    reporters: Vec<Box<dyn Reporter>>,
}

impl BenchRunner {
    /// Create a runner with the built-in registries.
    pub fn with_config(config: BenchConfig) -> Result<Self> {
        Self::with_registries(config, multiply_registry(), init_registry())
    }

    /// Create a runner over caller-supplied registries, which may hold
    /// additional strategies.
    pub fn with_registries(
        config: BenchConfig,
        multiply_registry: MultiplyRegistry,
        init_registry: InitRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let routines = resolve_routines(&multiply_registry, &config.routines)?;
        let init = init_registry.create(&config.init)?;
        log::info!(
            "init method '{}', routines [{}]",
            init.specification(),
            routines.join(",")
        );

        // Default reporters: console when verbose, JSON when an output dir is set
        let mut reporters: Vec<Box<dyn Reporter>> = Vec::new();
        if config.verbose {
            reporters.push(Box::new(ConsoleReporter::new(config.format)));
        }
        if let Some(dir) = &config.output_dir {
            reporters.push(Box::new(JsonReporter::new(dir.clone())));
        }

        Ok(Self {
            config,
            multiply_registry,
            init_registry,
            init,
            routines,
            reporters,
        })
    }

    /// Replace reporters with a custom set.
    pub fn reporters(&mut self, reporters: Vec<Box<dyn Reporter>>) -> &mut Self {
        self.reporters = reporters;
        self
    }

    /// Add an additional reporter.
    pub fn add_reporter(&mut self, reporter: Box<dyn Reporter>) -> &mut Self {
        self.reporters.push(reporter);
        self
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Selected routines, in registry enumeration order.
    pub fn routines(&self) -> &[String] {
        &self.routines
    }

    pub fn multiply_registry(&self) -> &MultiplyRegistry {
        &self.multiply_registry
    }

    pub fn init_registry(&self) -> &InitRegistry {
        &self.init_registry
    }

    /// Benchmark every selected routine.
    ///
    /// Each routine gets fresh init and multiply timers. Every iteration
    /// initializes A, B and C (three init cycles) and multiplies once.
    /// Reporters see the init cost per iteration: one cycle combining the
    /// three matrices, in the same units as the multiply timer.
    pub fn run(&mut self) -> Result<SuiteResult> {
        let BenchConfig {
            dimension: n,
            nloop,
            alpha,
            beta,
            nthreads,
            ..
        } = self.config;

        let mut a: Vec<Real> = vec![0.0; n * n];
        let mut b: Vec<Real> = vec![0.0; n * n];
        let mut c: Vec<Real> = vec![0.0; n * n];

        let started_at = timestamp_millis();
        let suite_start = Instant::now();
        for r in &self.reporters {
            r.suite_start(&self.config, &self.routines);
        }

        let mut init_timer = Timer::new();
        let mut iteration_init_timer = Timer::new();
        let mut multiply_timer = Timer::new();
        let mut results = Vec::with_capacity(self.routines.len());

        for routine in &self.routines {
            let handle = self.multiply_registry.create(routine)?;
            init_timer.reset();
            iteration_init_timer.reset();
            multiply_timer.reset();
            for r in &self.reporters {
                r.routine_start(routine);
            }

            for iteration in 1..=nloop {
                let mut init_cost = None;
                for m in [&mut a, &mut b, &mut c] {
                    let cycles = init_timer.cycle_count();
                    self.init.init(&mut init_timer, nthreads, n, m)?;
                    if init_timer.cycle_count() > cycles {
                        if let Some(window) = init_timer.last_values() {
                            combine_windows(&mut init_cost, &window);
                        }
                    }
                }
                if let Some(cost) = init_cost {
                    iteration_init_timer.record(cost);
                }
                handle.multiply(&mut multiply_timer, nthreads, n, alpha, &a, &b, beta, &mut c)?;
                log::debug!("{routine}: iteration {iteration}/{nloop} done");
                for r in &self.reporters {
                    r.iteration_end(routine, iteration, &iteration_init_timer, &multiply_timer);
                }
            }

            let result = RoutineResult {
                routine: handle.name().to_string(),
                init_method: self.init.specification().to_string(),
                dimension: n,
                nloop,
                nthreads,
                init: TimerSummary::from(&init_timer),
                iteration_init: TimerSummary::from(&iteration_init_timer),
                multiply: TimerSummary::from(&multiply_timer),
            };
            for r in &self.reporters {
                r.routine_end(&result, &iteration_init_timer, &multiply_timer);
            }
            results.push(result);
        }

        let suite = SuiteResult {
            results,
            started_at,
            total_duration: suite_start.elapsed(),
            format: self.config.format,
        };
        for r in &self.reporters {
            r.suite_end(&suite);
        }
        Ok(suite)
    }
}

/// Apply routine selections in order to [`DEFAULT_ROUTINES`], returning the
/// result in the registry's enumeration order.
pub fn resolve_routines(
    registry: &MultiplyRegistry,
    specs: &[String],
) -> std::result::Result<Vec<String>, RegistryError> {
    let mut selected: BTreeSet<String> = DEFAULT_ROUTINES.iter().map(|s| s.to_string()).collect();
    for spec in specs {
        selected = registry.parse_name_list(&selected, spec)?;
    }
    Ok(registry
        .registered_names()
        .into_iter()
        .filter(|name| selected.contains(name))
        .collect())
}

/// Fold one init window into an iteration's total. Counters add up; the
/// resident-set watermark keeps its maximum.
fn combine_windows(total: &mut Option<MetricValues>, window: &MetricValues) {
    let Some(sum) = total else {
        *total = Some(*window);
        return;
    };
    for (i, (acc, value)) in sum.iter_mut().zip(window).enumerate() {
        if i == Metric::MaxRss.index() {
            *acc = acc.max(*value);
        } else {
            *acc += value;
        }
    }
}

fn timestamp_millis() -> String {
    // Unix milliseconds: unique enough for result file names
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", duration.as_millis())
}
