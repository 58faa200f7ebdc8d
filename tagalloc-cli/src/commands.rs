use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;

use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tagalloc_config::TrackerConfig;
use tagalloc_core::prelude::*;
use tagalloc_telemetry::AllocationMetrics;

use crate::error::CliError;

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Configuration file; defaults to config/tagalloc.yaml when present
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print Prometheus metrics after the command
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Allocate a few tagged objects, dump the table, free them
    Demo,
    /// Allocate and free concurrently from several threads
    Stress(StressArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct StressArgs {
    #[arg(long, default_value_t = 4)]
    pub threads: usize,
    /// Allocate/free rounds per thread
    #[arg(long, default_value_t = 10_000)]
    pub iterations: usize,
    /// Largest array length, in `u32`s
    #[arg(long, default_value_t = 64)]
    pub max_len: usize,
    /// Allocations each thread keeps alive before freeing the oldest
    #[arg(long, default_value_t = 48)]
    pub window: usize,
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

pub fn run_command(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => TrackerConfig::load_from_path(path)?,
        None => TrackerConfig::load()?,
    };
    let metrics = cli.metrics.then(AllocationMetrics::new).transpose()?;

    match cli.command {
        Commands::Demo => run_demo(&config, metrics.as_ref()),
        Commands::Stress(args) => run_stress(&config, &args, metrics.as_ref()),
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}

fn report_metrics(
    metrics: Option<&AllocationMetrics>,
    tracker: &TagTracker,
) -> Result<(), CliError> {
    if let Some(metrics) = metrics {
        metrics.observe(&tracker.try_stats()?);
        print!("{}", metrics.gather()?);
    }
    Ok(())
}

fn run_demo(config: &TrackerConfig, metrics: Option<&AllocationMetrics>) -> Result<(), CliError> {
    let tracker = TagTracker::new(config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut counter = tracker.try_allocate_one::<u64>(b"CNTR")?;
    counter.fill_with(|_| 0);
    let mut samples = tracker.try_allocate_array::<f32>(32, b"SMPL")?;
    samples.fill_with(|n| n as f32 * 0.5);
    let name = tracker.try_allocate_array::<u8>(24, b"NAME")?;

    writeln!(
        out,
        "{} allocations, {} bytes tracked",
        tracker.try_count()?,
        tracker.try_total_size()?
    )?;
    tracker.dump(&mut out)?;
    report_metrics(metrics, &tracker)?;

    name.try_free()?;
    samples.try_free()?;
    counter.try_free()?;

    writeln!(out, "{} allocations after free", tracker.try_count()?)?;
    Ok(())
}

fn thread_tag(index: usize) -> Tag {
    let digits = format!("{:03}", index % 1000);
    let bytes = digits.as_bytes();
    Tag::new([b'T', bytes[0], bytes[1], bytes[2]])
}

fn run_stress(
    config: &TrackerConfig,
    args: &StressArgs,
    metrics: Option<&AllocationMetrics>,
) -> Result<(), CliError> {
    let tracker = TagTracker::new(config)?;
    let max_len = args.max_len.max(1);
    let window = args.window.max(1);

    tracing::info!(
        threads = args.threads,
        iterations = args.iterations,
        max_len,
        "starting stress run"
    );

    let failures = thread::scope(|scope| {
        let workers: Vec<_> = (0..args.threads)
            .map(|index| {
                let tracker = &tracker;
                scope.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(args.seed.wrapping_add(index as u64));
                    let tag = thread_tag(index);
                    let mut held = std::collections::VecDeque::with_capacity(window);
                    let mut failures = 0usize;

                    for _ in 0..args.iterations {
                        let len = rng.random_range(1..=max_len);
                        match tracker.try_allocate_array::<u32>(len, tag) {
                            Ok(mut block) => {
                                block.fill_with(|n| n as u32);
                                held.push_back(block);
                            }
                            Err(error) => {
                                tracing::warn!(%error, %tag, "allocation failed");
                                failures += 1;
                            }
                        }
                        if held.len() > window {
                            held.pop_front();
                        }
                    }
                    failures
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|worker| worker.join().map_err(|_| CliError::WorkerPanicked))
            .sum::<Result<usize, CliError>>()
    })?;

    let stats = tracker.try_stats()?;
    println!(
        "live: {}, table: {} entries ({} bytes), grows: {}, shrinks: {}, defrag moves: {}, \
         peak live: {}, failed allocations: {}",
        stats.live_count,
        stats.table_size,
        stats.table_bytes,
        stats.counters.grows,
        stats.counters.shrinks,
        stats.counters.defrag_moves,
        stats.counters.peak_live_count,
        failures
    );
    report_metrics(metrics, &tracker)?;

    if stats.live_count != 0 {
        return Err(CliError::Leaked {
            live: stats.live_count,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_tags_are_four_bytes() {
        assert_eq!(thread_tag(7).as_bytes(), b"T007");
        assert_eq!(thread_tag(1234).as_bytes(), b"T234");
    }

    #[test]
    fn stress_leaves_nothing_tracked() {
        let config = TrackerConfig {
            lock_timeout_ms: 1_000,
            ..TrackerConfig::default()
        }
        .with_failure_policy(FailurePolicy::Panic);
        let args = StressArgs {
            threads: 4,
            iterations: 500,
            max_len: 16,
            window: 40,
            seed: 7,
        };
        run_stress(&config, &args, None).unwrap();
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["tagalloc", "stress", "--threads", "2", "--metrics"]);
        assert!(cli.metrics);
        assert!(matches!(
            cli.command,
            Commands::Stress(StressArgs { threads: 2, .. })
        ));
    }
}
