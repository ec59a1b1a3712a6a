//! tofstore CLI
//!
//! Generates synthetic event workspaces and exercises sorting, binning and
//! the histogram cache on them.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

mod synth;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;
use synth::SynthShape;
use thiserror::Error;
use tofstore_algorithms::{LogProgress, SchedulerConfig};
use tofstore_core::{BinEdges, EventType, SortOrder};
use tofstore_workspace::{EventWorkspace, WorkspaceConfig};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workspace error: {0}")]
    Workspace(#[from] tofstore_workspace::Error),

    #[error("Core error: {0}")]
    Core(#[from] tofstore_core::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tofstore_algorithms::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Event record type selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    /// TOF and pulse time
    Tof,
    /// Weighted with pulse time
    Weighted,
    /// Weighted without pulse time
    WeightedNoTime,
}

impl From<Kind> for EventType {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Tof => EventType::Tof,
            Kind::Weighted => EventType::Weighted,
            Kind::WeightedNoTime => EventType::WeightedNoTime,
        }
    }
}

/// Sort order selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Order {
    /// Ascending TOF
    Tof,
    /// Ascending pulse time
    Pulse,
    /// Ascending pulse time, then TOF
    PulseTof,
}

impl From<Order> for SortOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Tof => SortOrder::TofSort,
            Order::Pulse => SortOrder::PulseTimeSort,
            Order::PulseTof => SortOrder::PulseTimeTofSort,
        }
    }
}

/// Synthetic workspace shape.
#[derive(Args, Debug, Clone)]
struct WorkspaceArgs {
    /// Number of spectra
    #[arg(short, long, default_value = "1000")]
    spectra: usize,

    /// Mean events per spectrum
    #[arg(short, long, default_value = "2000")]
    events: usize,

    /// Event record type
    #[arg(long, value_enum, default_value = "tof")]
    kind: Kind,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Sort workers (defaults to the physical core count)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Parallel sub-sorts per list: 1, 2 or 4 (automatic when omitted)
    #[arg(long)]
    cores_per_task: Option<usize>,

    /// Histogram cache capacity
    #[arg(long, default_value = "50")]
    mru_capacity: usize,
}

impl WorkspaceArgs {
    fn config(&self) -> Result<WorkspaceConfig> {
        let mut scheduler = SchedulerConfig::default();
        if let Some(workers) = self.workers {
            scheduler = scheduler.try_with_workers(workers)?;
        }
        if let Some(cores) = self.cores_per_task {
            scheduler = scheduler.try_with_cores_per_task(cores)?;
        }
        Ok(WorkspaceConfig::default()
            .with_mru_capacity(self.mru_capacity)
            .with_scheduler(scheduler))
    }

    fn build(&self) -> Result<EventWorkspace> {
        let shape = SynthShape {
            spectra: self.spectra,
            events_per_spectrum: self.events,
            event_type: self.kind.into(),
            seed: self.seed,
            ..SynthShape::default()
        };
        Ok(synth::build_workspace(&shape, self.config()?)?)
    }
}

/// Event workspace sorting and binning tool.
#[derive(Parser)]
#[command(name = "tofstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Threads for data-parallel loops (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a workspace and print or write its JSON summary
    Summary {
        #[command(flatten)]
        workspace: WorkspaceArgs,

        /// Sort before summarising
        #[arg(long, value_enum)]
        sort: Option<Order>,

        /// Include one row per spectrum
        #[arg(long)]
        per_spectrum: bool,

        /// Write the summary to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Benchmark bulk sorting
    SortBenchmark {
        #[command(flatten)]
        workspace: WorkspaceArgs,

        /// Target order
        #[arg(long, value_enum, default_value = "tof")]
        order: Order,

        /// Number of iterations
        #[arg(short, long, default_value = "3")]
        iterations: usize,
    },

    /// Bin every spectrum through the histogram cache
    Histogram {
        #[command(flatten)]
        workspace: WorkspaceArgs,

        /// Number of bins
        #[arg(short, long, default_value = "1000")]
        bins: usize,

        /// Upper TOF edge (microseconds)
        #[arg(long, default_value = "20000.0")]
        tof_max: f64,

        /// Sort by TOF before binning
        #[arg(long)]
        sorted: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    match cli.command {
        Commands::Summary {
            workspace,
            sort,
            per_spectrum,
            output,
        } => {
            let mut ws = workspace.build()?;
            if let Some(order) = sort {
                let progress = LogProgress::new(ws.num_histograms());
                ws.sort_all(order.into(), Some(&progress))?;
            }
            let summary = ws.summary(per_spectrum);
            match output {
                Some(path) => {
                    summary.write_json(&path)?;
                    println!("Summary written to {}", path.display());
                }
                None => println!("{}", summary.to_json()?),
            }
        }

        Commands::SortBenchmark {
            workspace,
            order,
            iterations,
        } => {
            let base = workspace.build()?;
            let order: SortOrder = order.into();
            println!(
                "Benchmarking {} sort of {} events in {} spectra, {} iterations",
                order,
                base.num_events(),
                base.num_histograms(),
                iterations
            );

            let mut times = Vec::with_capacity(iterations);
            let mut last_report = None;
            for _ in 0..iterations.max(1) {
                let mut ws = base.clone();
                let start = Instant::now();
                let report = ws.sort_all(order, None)?;
                times.push(start.elapsed().as_secs_f64() * 1000.0);
                last_report = Some(report);
            }

            let min_time = times.iter().fold(f64::INFINITY, |a, &b| a.min(b));
            let max_time = times.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            let mean_time = times.iter().sum::<f64>() / times.len() as f64;

            println!(
                "{:<15} | {:<15} | {:<15}",
                "Mean Time (ms)", "Min Time (ms)", "Max Time (ms)"
            );
            println!("{:-<51}", "");
            println!(
                "{:<15.2} | {:<15.2} | {:<15.2}",
                mean_time, min_time, max_time
            );

            if let Some(report) = last_report {
                println!(
                    "Workers: {}, concurrent tasks: {} ({} used), cores per task: {}, chunk size: {}, chunks: {}",
                    report.workers,
                    report.concurrent_tasks,
                    report.workers_used(),
                    report.cores_per_task,
                    report.chunk_size,
                    report.chunks.len()
                );
                if let Some(first) = report.chunks.first() {
                    println!(
                        "Largest chunk: spectra {}..{} (cost {:.0})",
                        first.start, first.end, first.cost
                    );
                }
            }
        }

        Commands::Histogram {
            workspace,
            bins,
            tof_max,
            sorted,
        } => {
            let mut ws = workspace.build()?;
            if sorted {
                ws.sort_all(SortOrder::TofSort, None)?;
            }
            ws.set_all_x(BinEdges::linear(0.0, tof_max, bins)?);

            for pass in ["cold", "warm"] {
                let start = Instant::now();
                let mut total = 0.0;
                for index in 0..ws.num_histograms() {
                    total += ws.histogram(index)?.total();
                }
                println!(
                    "{} pass: {:.2} ms, total counts {:.1}",
                    pass,
                    start.elapsed().as_secs_f64() * 1000.0,
                    total
                );
            }

            let stats = ws.mru_stats();
            println!(
                "Cache: {}/{} entries, {} hits, {} misses, {} evictions",
                ws.mru_size(),
                ws.mru_capacity(),
                stats.hits,
                stats.misses,
                stats.evictions
            );
        }
    }

    Ok(())
}
