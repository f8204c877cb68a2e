//! Pluggable reporters for benchmark output.

use crate::config::BenchConfig;
use crate::render::OutputFormat;
use crate::result::{RoutineResult, SuiteResult};
use crate::timer::{Metric, Statistic, Timer};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Trait for benchmark result reporters.
///
/// The `init` timer passed to the hooks holds one cycle per iteration, the
/// combined cost of initializing A, B and C, so it lines up with the
/// multiply timer. Per-matrix init figures are in [`RoutineResult::init`].
pub trait Reporter: Send + Sync {
    /// Called once before the first routine, with the resolved routine names.
    fn suite_start(&self, _config: &BenchConfig, _routines: &[String]) {}

    /// Called when a routine starts.
    fn routine_start(&self, _routine: &str) {}

    /// Called after each iteration's init and multiply phases.
    fn iteration_end(&self, _routine: &str, _iteration: usize, _init: &Timer, _multiply: &Timer) {}

    /// Called when a routine completes, with the timers it accumulated.
    fn routine_end(&self, _result: &RoutineResult, _init: &Timer, _multiply: &Timer) {}

    /// Called when the run completes.
    fn suite_end(&self, _result: &SuiteResult) {}
}

const PHASE_WIDTH: usize = 40;

/// Console reporter: one line per phase per iteration, then timer summaries.
pub struct ConsoleReporter<W: Write + Send = io::Stdout> {
    format: OutputFormat,
    out: Mutex<W>,
}

impl ConsoleReporter {
    /// Report to stdout.
    pub fn new(format: OutputFormat) -> Self {
        Self::with_writer(format, io::stdout())
    }
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn with_writer(format: OutputFormat, out: W) -> Self {
        Self {
            format,
            out: Mutex::new(out),
        }
    }

    /// Consume the reporter and return its writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, f: impl FnOnce(&mut W) -> io::Result<()>) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = f(&mut *out).and_then(|_| out.flush()) {
            log::warn!("failed to write console report: {e}");
        }
    }

    fn timing_line(out: &mut W, phase: &str, timer: &Timer, stat: Statistic) -> io::Result<()> {
        writeln!(
            out,
            "{phase:<PHASE_WIDTH$} {:>16.9e} | {:>16.9e} | {:>16.9e}",
            timer.value(Metric::Walltime, stat),
            timer.value(Metric::UserCpu, stat),
            timer.value(Metric::SystemCpu, stat),
        )
    }
}

impl<W: Write + Send> Reporter for ConsoleReporter<W> {
    fn suite_start(&self, config: &BenchConfig, routines: &[String]) {
        self.emit(|out| {
            writeln!(out, "INFO:  Using matrix initialization method '{}'", config.init)?;
            writeln!(out, "INFO:  Using matrix multiplication routines '{}'", routines.join(","))?;
            writeln!(
                out,
                "INFO:  n = {}, nloop = {}, alpha = {}, beta = {}",
                config.dimension, config.nloop, config.alpha, config.beta
            )?;
            writeln!(
                out,
                "{:PHASE_WIDTH$} {:>16} | {:>16} | {:>16}",
                "", "walltime", "user cpu", "system cpu"
            )
        });
    }

    fn routine_start(&self, routine: &str) {
        log::info!("starting routine '{routine}'");
    }

    fn iteration_end(&self, routine: &str, iteration: usize, init: &Timer, multiply: &Timer) {
        self.emit(|out| {
            Self::timing_line(out, &format!("INIT:   [{iteration}]"), init, Statistic::LastValue)?;
            Self::timing_line(out, &format!("MULT:   {routine} [{iteration}]"), multiply, Statistic::LastValue)
        });
    }

    fn routine_end(&self, result: &RoutineResult, init: &Timer, multiply: &Timer) {
        let format = self.format;
        self.emit(|out| {
            if multiply.has_statistics() {
                Self::timing_line(out, "AVG INIT:", init, Statistic::Average)?;
                Self::timing_line(out, "AVG MULT:", multiply, Statistic::Average)?;
            }
            if let Some(flops) = result.average_flops() {
                writeln!(out, "INFO:  {} average {:.3} GFLOP/s", result.routine, flops / 1e9)?;
            }
            let init_label = format!("init ({}, A+B+C)", result.init_method);
            let multiply_label = format!("multiply ({})", result.routine);
            writeln!(out)?;
            init.summarize(format, Some(init_label.as_str()), out)?;
            writeln!(out)?;
            multiply.summarize(format, Some(multiply_label.as_str()), out)?;
            writeln!(out)
        });
    }

    fn suite_end(&self, result: &SuiteResult) {
        log::info!(
            "completed {} routines in {:.2}s",
            result.results.len(),
            result.total_duration.as_secs_f64()
        );
    }
}

/// JSON reporter that writes the suite result to a file.
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl JsonReporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// File the given suite result is written to.
    pub fn path_for(&self, result: &SuiteResult) -> PathBuf {
        self.output_dir
            .join(format!("mmbench-{}.json", result.started_at))
    }
}

impl Reporter for JsonReporter {
    fn suite_end(&self, result: &SuiteResult) {
        match write_json_results(&self.output_dir, &self.path_for(result), result) {
            Ok(()) => log::info!("results written to {}", self.path_for(result).display()),
            Err(e) => log::warn!("failed to write JSON results: {e}"),
        }
    }
}

fn write_json_results(output_dir: &Path, path: &Path, result: &SuiteResult) -> io::Result<()> {
    std::fs::create_dir_all(output_dir)?;
    result.save(path)
}

/// Combines multiple reporters.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }
}

impl Reporter for MultiReporter {
    fn suite_start(&self, config: &BenchConfig, routines: &[String]) {
        for r in &self.reporters {
            r.suite_start(config, routines);
        }
    }

    fn routine_start(&self, routine: &str) {
        for r in &self.reporters {
            r.routine_start(routine);
        }
    }

    fn iteration_end(&self, routine: &str, iteration: usize, init: &Timer, multiply: &Timer) {
        for r in &self.reporters {
            r.iteration_end(routine, iteration, init, multiply);
        }
    }

    fn routine_end(&self, result: &RoutineResult, init: &Timer, multiply: &Timer) {
        for r in &self.reporters {
            r.routine_end(result, init, multiply);
        }
    }

    fn suite_end(&self, result: &SuiteResult) {
        for r in &self.reporters {
            r.suite_end(result);
        }
    }
}
