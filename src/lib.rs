//! # mmbench
//!
//! A matrix multiplication benchmark harness with running resource-usage
//! statistics.
//!
//! Each measured operation is one start/stop cycle of a [`Timer`], which
//! records walltime, CPU times and `getrusage` counters and keeps running
//! minimum, maximum, mean and variance per metric without storing samples.
//! Multiply and init strategies are looked up by name in a
//! [`StrategyRegistry`] and shared through reference-counted handles.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mmbench::{BenchConfig, BenchRunner, OutputFormat};
//!
//! let config = BenchConfig::from_env()
//!     .dimension(512)
//!     .nloop(4)
//!     .init("simple")
//!     .routines("+parallel")
//!     .format(OutputFormat::Json);
//!
//! let mut runner = BenchRunner::with_config(config)?;
//! let suite = runner.run()?;
//!
//! for routine in &suite.results {
//!     println!("{}: {:?} FLOP/s", routine.routine, routine.average_flops());
//! }
//! # Ok::<(), mmbench::MmbenchError>(())
//! ```
//!
//! ## Timing your own code
//!
//! ```rust
//! use mmbench::{Metric, OutputFormat, Statistic, Timer};
//!
//! let mut timer = Timer::new();
//! for _ in 0..4 {
//!     timer.measure(|| std::hint::black_box((0..10_000u64).sum::<u64>()));
//! }
//! let avg = timer.value(Metric::Walltime, Statistic::Average);
//! assert!(avg.is_finite());
//!
//! let mut out = Vec::new();
//! timer.summarize(OutputFormat::Csv, Some("sum"), &mut out).unwrap();
//! ```
//!
//! ## Features
//!
//! - **`f32`**: Use single-precision matrices

mod config;
mod error;
mod init;
mod multiply;
mod registry;
mod render;
mod report;
mod result;
mod runner;
mod stats;
mod timer;
mod usage;

/// Matrix element type.
#[cfg(not(feature = "f32"))]
pub type Real = f64;

/// Matrix element type.
#[cfg(feature = "f32")]
pub type Real = f32;

pub use config::{BenchConfig, DEFAULT_ROUTINES};
pub use error::{MmbenchError, RegistryError, Result, StrategyError, EXIT_INVALID, EXIT_IO};
pub use init::{
    init_registry, FileInit, FileOptions, InitHandle, InitMethod, InitRegistry, RandomInit,
    DEFAULT_INIT_FILE,
};
pub use multiply::{multiply_registry, MultiplyHandle, MultiplyMethod, MultiplyRegistry, BLOCK_SIZE};
pub use registry::{Factory, StrategyEntry, StrategyHandle, StrategyRegistry, ALL_TOKEN};
pub use render::{format_general, OutputFormat};
pub use report::{ConsoleReporter, JsonReporter, MultiReporter, Reporter};
pub use result::{MetricSummary, RoutineResult, SuiteResult, TimerSummary};
pub use runner::{resolve_routines, BenchRunner};
pub use stats::StatAccumulator;
pub use timer::{Metric, MetricValues, SharedTimer, Statistic, Timer, METRIC_COUNT};
pub use usage::{ResourceUsage, UsageSnapshot};
