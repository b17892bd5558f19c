//! Mailtrawl main entry point
//!
//! Command-line interface for the bulk email discovery engine: loads NDJSON
//! company files, runs the batch, writes checkpoints, final reports and
//! merged NDJSON back next to the output directory.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mailtrawl::report::{merge_into_records, write_final_report, write_ndjson};
use mailtrawl::{CompanyRecord, Engine, EngineConfig, EngineEvents, ProcessingResult};

/// Mailtrawl: bulk business-contact email discovery
///
/// Crawls each company's website, extracts and validates contact emails,
/// and writes results with checkpoint/resume support.
#[derive(Parser, Debug)]
#[command(name = "mailtrawl")]
#[command(version = "1.0.0")]
#[command(about = "Bulk business-contact email discovery", long_about = None)]
struct Cli {
    /// NDJSON company files (one JSON object per line)
    #[arg(value_name = "FILES", required = true)]
    files: Vec<PathBuf>,

    /// Output directory for checkpoints and reports
    #[arg(short, long, default_value = "results")]
    output: PathBuf,

    /// Concurrent workers (clamped to 200)
    #[arg(short, long, default_value_t = 60)]
    workers: usize,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume from checkpoint files in the output directory
    #[arg(long)]
    resume: bool,

    /// Process at most this many companies (for test runs)
    #[arg(long)]
    limit: Option<usize>,

    /// Stop dispatching new companies after this many hours
    #[arg(long, value_name = "HOURS")]
    max_hours: Option<f64>,

    /// Crawl every planned URL instead of stopping at the first hit
    #[arg(long)]
    exhaustive: bool,
}

/// Event sink that mirrors engine milestones to the log
struct LogEvents;

impl EngineEvents for LogEvents {
    fn on_company_processed(&self, result: &ProcessingResult) {
        if result.success {
            tracing::info!(
                company = %result.company_name,
                emails = result.emails.len(),
                method = %result.discovery_method,
                "emails found"
            );
        }
    }

    fn on_batch_checkpoint(&self, batch: usize, results: &[ProcessingResult]) {
        tracing::info!(batch, rows = results.len(), "checkpoint flushed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let config = EngineConfig {
        output_dir: cli.output.clone(),
        workers: cli.workers,
        verbose: cli.verbose,
        limit: cli.limit,
        max_hours: cli.max_hours,
        resume: cli.resume,
        exhaustive: cli.exhaustive,
        ..Default::default()
    };

    let engine = Engine::new(config)
        .context("engine initialization failed")?
        .with_events(Arc::new(LogEvents));

    for file in &cli.files {
        tracing::info!(file = %file.display(), "loading companies");
        let (rows, companies) = load_ndjson(file)
            .with_context(|| format!("cannot read company file {}", file.display()))?;
        tracing::info!(rows = rows.len(), usable = companies.len(), "companies loaded");

        let summary = engine.run(companies).await?;

        // Resumed runs must report checkpointed results alongside this
        // run's, or the rewritten files lose everything pre-restart.
        let elapsed = summary.elapsed_seconds;
        let mut all_results = summary.prior_results;
        all_results.extend(summary.results);

        let files = write_final_report(&cli.output, &all_results, elapsed)?;
        tracing::info!(report = %files.results_csv.display(), "report written");

        let merged = merge_into_records(&rows, &all_results);
        let merged_path = merged_output_path(&cli.output, file);
        write_ndjson(&merged_path, &merged)?;
        tracing::info!(file = %merged_path.display(), "merged records written");
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("mailtrawl=info,warn"),
            1 => EnvFilter::new("mailtrawl=debug,info"),
            2 => EnvFilter::new("mailtrawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Reads one NDJSON file into raw rows plus the usable company records.
///
/// Blank lines are skipped; unparseable lines and rows without a usable
/// name are logged and dropped, never fatal.
fn load_ndjson(path: &Path) -> anyhow::Result<(Vec<serde_json::Value>, Vec<CompanyRecord>)> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    let mut companies = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(line = index + 1, error = %e, "skipping unparseable row");
                continue;
            }
        };
        if let Some(record) = CompanyRecord::from_json(&value, index) {
            companies.push(record);
        } else {
            tracing::warn!(line = index + 1, "skipping row without a usable name");
        }
        rows.push(value);
    }

    Ok((rows, companies))
}

fn merged_output_path(output_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("companies");
    output_dir.join(format!("{}_with_emails.ndjson", stem))
}
