//! Command-line front end: run an experiment and report the verdict.
//!
//! Exit status is `0` when every run was consistent, `2` when a lost update was
//! detected, and `1` on error.

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rmwcheck::{CellKind, CellValue, Experiment, UpdateStrategy, WorkloadConfig};

#[derive(Parser)]
#[command(name = "rmwcheck")]
#[command(about = "Detect lost updates in read-modify-write strategies", long_about = None)]
struct Cli {
    /// Shape of the shared state: flag or counter
    #[arg(long, default_value = "counter")]
    kind: CellKind,

    /// Update strategy: naive, cas or fused
    #[arg(long, default_value = "naive")]
    strategy: UpdateStrategy,

    /// Worker threads (default: 10 for flags, 5 for counters)
    #[arg(long)]
    threads: Option<usize>,

    /// Updates per thread (default: 1000 for flags, 10000 for counters)
    #[arg(long)]
    iterations: Option<usize>,

    /// Starting value of the cell (true/false or an integer)
    #[arg(long)]
    initial: Option<String>,

    /// Repeat the experiment this many times
    #[arg(long, default_value_t = 1)]
    trials: usize,

    /// Emit the result as JSON on stdout
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let (default_threads, default_iterations) = match cli.kind {
        CellKind::Flag => (10, 1_000),
        CellKind::Counter => (5, 10_000),
    };
    let config = WorkloadConfig::new(
        cli.threads.unwrap_or(default_threads),
        cli.iterations.unwrap_or(default_iterations),
    );
    config.validate().context("rejected workload configuration")?;

    let mut experiment = Experiment::new(cli.kind, cli.strategy, config);
    if let Some(raw) = &cli.initial {
        experiment = experiment.with_initial(parse_initial(cli.kind, raw)?);
    }

    if cli.trials == 0 {
        bail!("--trials must be at least 1");
    }
    if cli.trials == 1 {
        single(&experiment, cli.json)
    } else {
        repeated(&experiment, cli.trials, cli.json)
    }
}

fn single(experiment: &Experiment, json: bool) -> Result<ExitCode> {
    if !json {
        println!("Initial value: {}", experiment.initial);
        println!(
            "Starting {} threads, each applying {} {} updates...\n",
            experiment.config.threads, experiment.config.iterations, experiment.strategy
        );
    }

    let outcome = experiment.run().context("experiment did not complete")?;
    let v = outcome.verification;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("Total updates performed: {}", outcome.report.total_operations);
        println!("Expected final value: {}", v.expected);
        println!("Actual final value: {}", v.observed);
        if outcome.report.cas_retries > 0 {
            println!("CAS retries: {}", outcome.report.cas_retries);
        }
        println!("Elapsed: {:.2?}", outcome.report.elapsed);
        if v.consistent {
            println!("\nFinal value is consistent with a serial execution.");
            if !experiment.strategy.is_linearizable() {
                println!("The race may simply not have fired; run more trials to observe it.");
            }
        } else {
            println!("\nRACE CONDITION DETECTED");
            match v.lost_updates() {
                Some(0) => println!("The counter ended ahead of the serial value."),
                Some(lost) => println!("{lost} update(s) were lost."),
                None => println!("An odd number of toggles was lost."),
            }
        }
    }

    Ok(exit_for(v.race_detected()))
}

fn repeated(experiment: &Experiment, trials: usize, json: bool) -> Result<ExitCode> {
    let summary = experiment
        .trials(trials)
        .context("experiment did not complete")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} x {} {} updates on a {} cell, {} trials",
            experiment.config.threads,
            experiment.config.iterations,
            experiment.strategy,
            experiment.kind(),
            trials
        );
        println!(
            "Races detected: {} ({:.1}%)",
            summary.races_detected,
            summary.race_rate() * 100.0
        );
        if let Some(worst) = summary.worst {
            println!(
                "Worst run: expected {}, observed {}",
                worst.expected, worst.observed
            );
        }
    }

    Ok(exit_for(summary.races_detected > 0))
}

fn parse_initial(kind: CellKind, raw: &str) -> Result<CellValue> {
    let value = match kind {
        CellKind::Flag => match raw.trim() {
            "true" | "1" => CellValue::Flag(true),
            "false" | "0" => CellValue::Flag(false),
            other => bail!("invalid flag value `{other}` (expected true or false)"),
        },
        CellKind::Counter => CellValue::Counter(
            raw.trim()
                .parse()
                .with_context(|| format!("invalid counter value `{raw}`"))?,
        ),
    };
    Ok(value)
}

fn exit_for(race_detected: bool) -> ExitCode {
    if race_detected {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .init();
}
