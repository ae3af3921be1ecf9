//! CLI entrypoint for the arenalloc harness.

use std::path::PathBuf;

use arenalloc_core::EngineKind;
use arenalloc_harness::runner::{ScenarioRunner, summarize};
use arenalloc_harness::scenarios::DEFAULT_REGION_SIZE;
use arenalloc_harness::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};
use arenalloc_harness::{HarnessError, StressConfig, run_stress};
use clap::{Parser, Subcommand};

/// Scenario and stress tooling for the arena allocators.
#[derive(Debug, Parser)]
#[command(name = "arenalloc-harness")]
#[command(about = "Drive the arena allocator engines through scripted scenarios")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the demonstration and property scenarios against one engine.
    Run {
        /// Engine to exercise (`free-list` or `slab`).
        #[arg(long, default_value = "free-list")]
        engine: EngineKind,
        /// Region size in bytes for each scenario's arena.
        #[arg(long, default_value_t = DEFAULT_REGION_SIZE)]
        region_size: usize,
        /// Structured JSONL log output path (if omitted, prints to stdout).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Hammer one shared allocator from several threads.
    Stress {
        /// Engine to exercise (`free-list` or `slab`).
        #[arg(long, default_value = "free-list")]
        engine: EngineKind,
        /// Worker thread count.
        #[arg(long, default_value_t = 4)]
        threads: usize,
        /// Allocations per worker.
        #[arg(long, default_value_t = 10_000)]
        iterations: usize,
        /// Region size in bytes for the shared arena.
        #[arg(long, default_value_t = DEFAULT_REGION_SIZE)]
        region_size: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            engine,
            region_size,
            log,
        } => {
            let mut emitter = match &log {
                Some(path) => LogEmitter::to_file(path, "run")?,
                None => LogEmitter::to_stdout("run"),
            };
            eprintln!("Running {engine} scenarios over {region_size}-byte regions");
            let results = ScenarioRunner::new(engine, region_size).run(&mut emitter)?;
            for result in &results {
                match &result.error {
                    None => eprintln!("[PASS] {}/{}", result.engine, result.scenario),
                    Some(err) => eprintln!("[FAIL] {}/{}: {err}", result.engine, result.scenario),
                }
            }
            if let Some(path) = &log {
                eprintln!("Wrote structured log to {}", path.display());
            }
            summarize(&results)?;
        }
        Command::Stress {
            engine,
            threads,
            iterations,
            region_size,
        } => {
            eprintln!("Stressing {engine} with {threads} threads x {iterations} iterations");
            let report = run_stress(StressConfig {
                engine,
                threads,
                iterations,
                region_size,
            })?;
            let outcome = if report.corrupted == 0 {
                Outcome::Pass
            } else {
                Outcome::Fail
            };
            let mut emitter = LogEmitter::to_stdout("stress");
            emitter.emit_entry(
                LogEntry::new("", LogLevel::Info, "stress_summary")
                    .with_engine(engine.name())
                    .with_outcome(outcome)
                    .with_details(serde_json::json!({
                        "threads": threads,
                        "iterations": iterations,
                        "allocations": report.allocations,
                        "exhausted": report.exhausted,
                        "frees": report.frees,
                        "corrupted": report.corrupted,
                    })),
            )?;
            emitter.flush()?;
            if report.corrupted > 0 {
                return Err(HarnessError::Corruption {
                    corrupted: report.corrupted,
                }
                .into());
            }
        }
    }
    Ok(())
}
