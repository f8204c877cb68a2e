//! mmbench: benchmark matrix multiplication routines.
//!
//! Options override `MMBENCH_*` environment variables, which override the
//! built-in defaults. Errors exit with `EINVAL` for bad arguments and the OS
//! error code for I/O failures.

use anyhow::{Context, Result};
use clap::Parser;
use mmbench::{
    init_registry, multiply_registry, BenchConfig, BenchRunner, MmbenchError, OutputFormat, Real,
};
use std::path::PathBuf;
use std::process::ExitCode;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "mmbench",
    about = "Benchmark matrix multiplication routines",
    long_about = "
mmbench times matrix initialization and multiplication (C := alpha*A*B + beta*C)
for each selected routine and reports running statistics of walltime, CPU time
and resource usage.

Example:
    mmbench                               # basic, smart and opt on 1000x1000
    mmbench -n 512 -r all                 # every routine
    mmbench -r -opt -r +parallel -t 8     # drop opt, add parallel on 8 threads
    mmbench -i random=42 -f json          # seeded random matrices, JSON output
    mmbench --list                        # list routines and init methods
"
)]
struct Cli {
    // ========================================================================
    // Problem
    // ========================================================================
    /// Matrix dimension (n x n)
    #[arg(short = 'n', long)]
    dimension: Option<usize>,

    /// Iterations per routine
    #[arg(short = 'l', long)]
    nloop: Option<usize>,

    /// Scale factor applied to A*B
    #[arg(short = 'a', long, allow_negative_numbers = true)]
    alpha: Option<Real>,

    /// Scale factor applied to the prior C
    #[arg(short = 'b', long, allow_negative_numbers = true)]
    beta: Option<Real>,

    /// Worker threads for parallel strategies (0 = automatic)
    #[arg(short = 't', long)]
    nthreads: Option<usize>,

    // ========================================================================
    // Strategy Selection
    // ========================================================================
    /// Matrix init method, e.g. "zero", "random=7", "file=sync:/path"
    #[arg(short = 'i', long)]
    init: Option<String>,

    /// Routine selection: [=][+|-]name{,[+|-]name..}; "all" selects every routine.
    /// May be repeated; applied in order.
    #[arg(short = 'r', long = "routines", allow_hyphen_values = true)]
    routines: Vec<String>,

    /// List routines, init methods and output formats, then exit
    #[arg(long)]
    list: bool,

    // ========================================================================
    // Output Control
    // ========================================================================
    /// Summary format: table, csv, tsv, json or yaml
    #[arg(short = 'f', long)]
    format: Option<OutputFormat>,

    /// Output directory for JSON results
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Quiet mode (no console report)
    #[arg(long, short = 'q', conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn into_config(self) -> BenchConfig {
        let mut cfg = BenchConfig::from_env();
        if let Some(n) = self.dimension {
            cfg = cfg.dimension(n);
        }
        if let Some(n) = self.nloop {
            cfg = cfg.nloop(n);
        }
        if let Some(alpha) = self.alpha {
            cfg = cfg.alpha(alpha);
        }
        if let Some(beta) = self.beta {
            cfg = cfg.beta(beta);
        }
        if let Some(n) = self.nthreads {
            cfg = cfg.nthreads(n);
        }
        if let Some(init) = self.init {
            cfg = cfg.init(init);
        }
        for spec in self.routines {
            cfg = cfg.routines(spec);
        }
        if let Some(format) = self.format {
            cfg = cfg.format(format);
        }
        if let Some(dir) = self.output_dir {
            cfg = cfg.output_dir(dir);
        }
        if self.quiet {
            cfg = cfg.verbose(false);
        }
        cfg
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR:  {err:#}");
            let code = err
                .downcast_ref::<MmbenchError>()
                .map_or(1, MmbenchError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if cli.list {
        print_strategies();
        return Ok(());
    }

    let config = cli.into_config();
    let mut runner = BenchRunner::with_config(config).context("invalid configuration")?;
    let suite = runner.run().context("benchmark failed")?;

    log::info!(
        "benchmarked {} routine(s) in {:.2}s",
        suite.results.len(),
        suite.total_duration.as_secs_f64()
    );
    Ok(())
}

fn print_strategies() {
    println!("routines:       {}", multiply_registry().token_list());
    println!("init methods:   {}", init_registry().token_list());
    println!("output formats: {}", OutputFormat::names());
}
