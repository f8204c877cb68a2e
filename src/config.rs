//! Configuration for the benchmark runner.

use crate::error::{MmbenchError, Result};
use crate::render::OutputFormat;
use crate::Real;
use std::path::PathBuf;

/// Routines selected before any routine specification is applied.
pub const DEFAULT_ROUTINES: [&str; 3] = ["basic", "smart", "opt"];

/// Configuration for the benchmark runner.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Matrix edge length; matrices are `dimension x dimension`.
    pub dimension: usize,
    /// Iterations per routine.
    pub nloop: usize,
    pub alpha: Real,
    pub beta: Real,
    /// Worker threads for parallel strategies (0 = automatic).
    pub nthreads: usize,
    /// Init strategy specification, e.g. `random=7`.
    pub init: String,
    /// Routine selections applied in order to [`DEFAULT_ROUTINES`].
    pub routines: Vec<String>,
    /// Format for timer summaries.
    pub format: OutputFormat,
    /// Output directory for JSON results; `None` disables the file.
    pub output_dir: Option<PathBuf>,
    /// Print per-iteration progress and summaries.
    pub verbose: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            dimension: 1000,
            nloop: 4,
            alpha: 1.0,
            beta: 0.0,
            nthreads: 0,
            init: "noop".to_string(),
            routines: Vec::new(),
            format: OutputFormat::Table,
            output_dir: None,
            verbose: true,
        }
    }
}

impl BenchConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config from environment variables.
    ///
    /// Supported variables:
    /// - `MMBENCH_DIMENSION`: matrix dimension (default: 1000)
    /// - `MMBENCH_NLOOP`: iterations per routine (default: 4)
    /// - `MMBENCH_ALPHA`, `MMBENCH_BETA`: scale factors (default: 1, 0)
    /// - `MMBENCH_NTHREADS`: worker threads (default: 0, automatic)
    /// - `MMBENCH_INIT`: init strategy (default: noop)
    /// - `MMBENCH_ROUTINES`: routine selection, e.g. `-opt,+parallel`
    /// - `MMBENCH_FORMAT`: table, csv, tsv, json or yaml
    /// - `MMBENCH_OUTPUT_DIR`: directory for JSON results
    /// - `MMBENCH_VERBOSE`: verbose output (default: true)
    ///
    /// Values that fail to parse are ignored.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(n) = var("MMBENCH_DIMENSION").and_then(|v| v.parse().ok()) {
            cfg.dimension = n;
        }
        if let Some(n) = var("MMBENCH_NLOOP").and_then(|v| v.parse().ok()) {
            cfg.nloop = n;
        }
        if let Some(x) = var("MMBENCH_ALPHA").and_then(|v| v.parse().ok()) {
            cfg.alpha = x;
        }
        if let Some(x) = var("MMBENCH_BETA").and_then(|v| v.parse().ok()) {
            cfg.beta = x;
        }
        if let Some(n) = var("MMBENCH_NTHREADS").and_then(|v| v.parse().ok()) {
            cfg.nthreads = n;
        }
        if let Some(v) = var("MMBENCH_INIT") {
            cfg.init = v;
        }
        if let Some(v) = var("MMBENCH_ROUTINES") {
            cfg.routines.push(v);
        }
        if let Some(f) = var("MMBENCH_FORMAT").and_then(|v| v.parse().ok()) {
            cfg.format = f;
        }
        if let Some(v) = var("MMBENCH_OUTPUT_DIR") {
            cfg.output_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("MMBENCH_VERBOSE") {
            cfg.verbose = v != "0" && !v.eq_ignore_ascii_case("false");
        }

        cfg
    }

    /// Check values the runner cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.dimension <= 1 {
            return Err(MmbenchError::Config(format!(
                "invalid dimension: {} (must be greater than 1)",
                self.dimension
            )));
        }
        if self.nloop == 0 {
            return Err(MmbenchError::Config(
                "invalid nloop: 0 (must be at least 1)".to_string(),
            ));
        }
        if !self.alpha.is_finite() || !self.beta.is_finite() {
            return Err(MmbenchError::Config(format!(
                "alpha and beta must be finite (got {}, {})",
                self.alpha, self.beta
            )));
        }
        Ok(())
    }

    /// Set the matrix dimension.
    pub fn dimension(mut self, n: usize) -> Self {
        self.dimension = n;
        self
    }

    /// Set the number of iterations per routine.
    pub fn nloop(mut self, n: usize) -> Self {
        self.nloop = n;
        self
    }

    pub fn alpha(mut self, alpha: Real) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn beta(mut self, beta: Real) -> Self {
        self.beta = beta;
        self
    }

    /// Set the worker thread count.
    pub fn nthreads(mut self, n: usize) -> Self {
        self.nthreads = n;
        self
    }

    /// Set the init strategy specification.
    pub fn init(mut self, spec: impl Into<String>) -> Self {
        self.init = spec.into();
        self
    }

    /// Append a routine selection.
    pub fn routines(mut self, spec: impl Into<String>) -> Self {
        self.routines.push(spec.into());
        self
    }

    /// Set the summary format.
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the output directory.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Set verbose output.
    pub fn verbose(mut self, v: bool) -> Self {
        self.verbose = v;
        self
    }
}
