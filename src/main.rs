// src/main.rs
// =============================================================================
// Entry point of the code-harvester CLI.
//
// What happens here:
// 1. Parse command-line arguments and set up logging
// 2. Dispatch to the subcommand (scan or stats)
// 3. For a scan: build the config, wire prober -> scheduler -> controller ->
//    CSV sink, install the Ctrl-C handler, run, print the summary
// 4. Exit with a code that tells scripts what happened:
//      0   = every configured length was scanned
//      130 = stopped by Ctrl-C, progress saved, rerun to resume
//      2   = error (bad configuration, results file not writable, ...)
// =============================================================================

mod cli;
mod codes;
mod config;
mod error;
mod probe;
mod report;
mod scan;
mod sink;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, ScanArgs};
use config::{ResumePolicy, ScanConfig};
use error::HarvestError;
use probe::{HttpProber, MetadataExtractor, PageExtractor};
use scan::{Harvester, RunSummary, Scheduler, ShutdownSignal};
use sink::{BatchBuffer, CsvSink};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

const EXIT_COMPLETED: i32 = 0;
const EXIT_ERROR: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            // Printed once, plainly; the {:#} form includes every context layer
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    };

    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Scan(args) => handle_scan(args).await,
        Commands::Stats { output, json, top } => handle_stats(&output, json, top),
    }
}

// Logs go to stderr; RUST_LOG wins over --verbose when set
fn setup_logging(verbose: bool) {
    let default = if verbose {
        "code_harvester=debug,warn"
    } else {
        "code_harvester=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// Handles the 'scan' subcommand
async fn handle_scan(args: ScanArgs) -> Result<i32> {
    let config = ScanConfig::from_args(args).context("Invalid configuration")?;

    if !config.json {
        println!("🔍 Scanning {}{{code}}", config.base_url);
        println!("📄 Saving to: {}", config.output.display());
        println!("🧵 Concurrency: {}", config.concurrency);
        println!("📏 Lengths: {:?}", config.lengths);
        println!("{}", "-".repeat(60));
    }

    let shutdown = ShutdownSignal::new();
    install_interrupt_handler(shutdown.clone());

    let summary = harvest(&config, shutdown)
        .await
        .with_context(|| format!("Scan writing to {} failed", config.output.display()))?;

    print_summary(&summary, config.json)?;

    if summary.interrupted {
        Ok(EXIT_INTERRUPTED)
    } else {
        Ok(EXIT_COMPLETED)
    }
}

// Builds every piece of a scan from the config and runs it
async fn harvest(config: &ScanConfig, shutdown: ShutdownSignal) -> Result<RunSummary, HarvestError> {
    let space = config.code_space()?;

    let sink = CsvSink::new(&config.output);
    let recorded = match config.resume {
        ResumePolicy::Fresh => {
            warn!(path = %sink.path().display(), "starting fresh, existing results discarded");
            sink.reset()?;
            HashSet::new()
        }
        ResumePolicy::Resume => sink.recorded_codes()?,
    };

    let extractor: Arc<dyn MetadataExtractor> =
        Arc::new(PageExtractor::new(config.title_suffix.clone()));
    let prober = HttpProber::new(config.base_url.clone(), config.probe_settings(), extractor)?;
    let scheduler = Scheduler::new(Arc::new(prober), config.concurrency, shutdown.clone());

    let mut harvester = Harvester::new(
        space,
        scheduler,
        BatchBuffer::new(sink, config.batch_size),
        shutdown,
    )
    .with_recorded(recorded)
    .with_delay(config.delay);

    harvester.run().await
}

// First Ctrl-C asks for a clean stop, a second one exits immediately
fn install_interrupt_handler(shutdown: ShutdownSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("could not listen for Ctrl-C; stop with SIGTERM loses buffered results");
            return;
        }
        eprintln!("\nInterrupt received, finishing in-flight probes and saving progress...");
        eprintln!("Press Ctrl+C again to force exit immediately.");
        shutdown.trigger();

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nForced exit!");
            std::process::exit(EXIT_INTERRUPTED);
        }
    });
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    let stats = &summary.stats;
    println!();
    println!("📊 Summary:");
    println!("   ✅ Found: {}", stats.found);
    println!("   ❌ Not found: {}", stats.missing);
    println!("   ⚠️  Errors: {}", stats.failed);
    println!("   📋 Probed: {}", stats.probed);
    println!("   ⏭️  Already recorded: {}", stats.skipped);
    println!("   💾 Rows written: {} in {} batch(es)", summary.written, summary.flushes);
    println!("   ⏱️  Elapsed: {:.1}s", summary.elapsed.as_secs_f64());

    if summary.interrupted {
        println!("\n⏸️  Stopped early. Progress is saved; run again to continue.");
    }
    Ok(())
}

// Handles the 'stats' subcommand
fn handle_stats(output: &Path, json: bool, top: usize) -> Result<i32> {
    let rows = sink::load_rows(output)
        .with_context(|| format!("Could not read results from {}", output.display()))?;
    let report = report::summarize(&rows, top);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(EXIT_COMPLETED);
    }

    println!("📊 {}", output.display());
    println!("   📋 Rows: {} ({} unique, {} duplicate)", report.rows, report.unique_codes, report.duplicates);
    println!("   ✅ Found: {}", report.found);
    println!("   ❌ Not found: {}", report.missing);
    println!("   ⚠️  Errors: {}", report.errors);
    println!("   ⏱️  Total found duration: {}s", report.total_found_seconds);

    if !report.top.is_empty() {
        println!();
        println!("{:<8} {:<50} {:>10} {:>10} {:>10}", "CODE", "TITLE", "LISTENS", "DOWNLOADS", "DURATION");
        println!("{}", "=".repeat(92));
        for entry in &report.top {
            // Truncate long titles for display
            let title = if entry.title.chars().count() > 47 {
                format!("{}...", entry.title.chars().take(47).collect::<String>())
            } else {
                entry.title.clone()
            };
            println!(
                "{:<8} {:<50} {:>10} {:>10} {:>10}",
                entry.code, title, entry.listens, entry.downloads, entry.duration
            );
        }
    }

    Ok(EXIT_COMPLETED)
}
