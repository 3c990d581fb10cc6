use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use lempicka_sync::control::RunOptions;
use lempicka_sync::{config::{CliOverrides, LempickaConfig}, SyncEngine, SyncError};

/// lempicka-sync - copies the newest version of each file into a destination tree
#[derive(Parser, Debug)]
#[command(name = "lempicka-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source directory (ignored with --resume)
    source: Option<PathBuf>,

    /// Destination directory (ignored with --resume)
    destination: Option<PathBuf>,

    /// Build and print the plan without copying anything
    #[arg(long, short = 'n')]
    dry_run: bool,

    /// Keep going after a file fails instead of stopping the run
    #[arg(long)]
    continue_on_error: bool,

    /// Extra attempts for recoverable I/O errors
    #[arg(long)]
    retry_count: Option<u32>,

    /// Base delay before the first retry, doubled on each subsequent attempt
    #[arg(long)]
    retry_base_delay_ms: Option<u64>,

    /// Files at or above this size (MB) are copied sequentially instead of in parallel
    #[arg(long)]
    small_file_threshold_mb: Option<u64>,

    /// Maximum small files copied concurrently
    #[arg(long)]
    max_parallel_small_files: Option<usize>,

    /// Where to keep the recovery journal (defaults under the config's journal_dir)
    #[arg(long)]
    journal_path: Option<PathBuf>,

    /// Resume an interrupted sync from its journal instead of starting a new one
    #[arg(long)]
    resume: bool,

    /// Path to a `lempicka.toml`-style config file's directory
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<std::process::ExitCode> {
    let config_dir = cli.config.clone().unwrap_or_else(|| PathBuf::from("."));
    let file_config = LempickaConfig::load_from_dir(&config_dir)?;
    let overrides = CliOverrides {
        continue_on_error: if cli.continue_on_error { Some(true) } else { None },
        retry_count: cli.retry_count,
        retry_base_delay_ms: cli.retry_base_delay_ms,
        small_file_threshold_mb: cli.small_file_threshold_mb,
        max_parallel_small_files: cli.max_parallel_small_files,
    };
    let sync_options = file_config.merge_into(&overrides);

    let journal_path = cli
        .journal_path
        .clone()
        .or_else(|| file_config.journal_dir(None).map(|dir| dir.join("lempicka-sync.journal.json")))
        .unwrap_or_else(|| PathBuf::from(".lempicka-sync.journal.json"));

    let engine = SyncEngine::new();

    let reporter = Arc::new(std::sync::Mutex::new(lempicka_sync::ui::ProgressReporter::new()));
    let on_progress: Arc<dyn Fn(&lempicka_sync::ProgressEvent) + Send + Sync> = Arc::new(move |event| {
        if let Ok(mut reporter) = reporter.lock() {
            reporter.on_event(event);
        }
    });

    if cli.resume {
        let history_log_path = engine
            .recovery_summary(&journal_path)?
            .map(|summary| summary.left_root.join("sync-history.log"));
        let summary = engine.resume(journal_path, run_options(&sync_options, history_log_path), Arc::clone(&on_progress)).await;
        return finish(summary);
    }

    let source = cli.source.ok_or_else(|| anyhow::anyhow!("source is required unless --resume is given"))?;
    let destination = cli.destination.ok_or_else(|| anyhow::anyhow!("destination is required unless --resume is given"))?;

    let plan = engine.build_compare_plan(&source, &destination)?;
    println!(
        "Plan: {} of {} candidates are stale or missing ({} bytes)",
        plan.pending_count,
        plan.total_candidates,
        plan.plan.iter().map(|item| item.source_size).sum::<u64>()
    );
    for item in &plan.plan {
        println!("  COPY {} -> {}", item.source_relative_path.display(), item.target_relative_path.display());
    }

    if cli.dry_run {
        println!("Dry-run mode: no changes were made.");
        return Ok(std::process::ExitCode::SUCCESS);
    }

    if plan.plan.is_empty() {
        println!("Nothing to sync.");
        return Ok(std::process::ExitCode::SUCCESS);
    }

    // History log lives alongside the source root (§6); an empty left_root
    // disables it, but the CLI always has a concrete source directory.
    let history_log_path = source.join("sync-history.log");
    let summary = engine.sync(journal_path, plan, run_options(&sync_options, Some(history_log_path)), on_progress).await;
    finish(summary)
}

fn run_options(options: &lempicka_sync::SyncOptions, history_log_path: Option<PathBuf>) -> RunOptions {
    RunOptions {
        continue_on_error: options.continue_on_error,
        retry_count: options.retry_count,
        retry_base_delay_ms: options.retry_base_delay_ms,
        small_file_threshold_bytes: options.small_file_threshold_bytes,
        max_parallel_small_files: options.max_parallel_small_files,
        history_log_path: history_log_path.or_else(|| options.history_log_path.clone()),
    }
}

fn finish(result: Result<lempicka_sync::RunSummary, SyncError>) -> anyhow::Result<std::process::ExitCode> {
    match result {
        Ok(summary) => {
            println!(
                "Sync complete: {} succeeded, {} failed | {} bytes | {:.0}s",
                summary.copied,
                summary.failed.len(),
                summary.bytes_copied,
                summary.duration_ms as f64 / 1000.0
            );
            if summary.failed.is_empty() {
                Ok(std::process::ExitCode::SUCCESS)
            } else {
                Ok(std::process::ExitCode::from(2))
            }
        }
        Err(err) => {
            eprintln!("sync failed: {}", err);
            Ok(std::process::ExitCode::from(2))
        }
    }
}
