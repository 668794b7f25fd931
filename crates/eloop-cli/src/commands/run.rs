use crate::cli::RunArgs;
use crate::config::PartialRunConfig;
use crate::error::{CliError, Result};
use crate::model::ResonantLevelModel;
use crate::utils::progress::CliProgressHandler;
use eloop::engine::coordinator::SweepReport;
use eloop::engine::progress::ProgressReporter;
use eloop::workflows;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub async fn run(args: RunArgs, quiet: bool) -> Result<()> {
    let partial_config = PartialRunConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let run_config = partial_config.merge_with_cli(&args)?;

    let model = ResonantLevelModel::new(run_config.model.clone())
        .map_err(|e| CliError::Config(format!("Invalid [model] section: {e}")))?;

    let progress_handler = if quiet {
        CliProgressHandler::hidden()
    } else {
        CliProgressHandler::new()
    };
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Starting sweep '{}' with {} worker(s)...",
        run_config.sweep.label, run_config.sweep.workers
    );
    info!("Invoking the core sweep workflow...");

    let report = tokio::task::block_in_place(|| {
        workflows::sweep::run(&run_config.sweep, &model, &reporter)
    })?;

    print_summary(&report);

    match &report.checkpoint {
        Some(checkpoint) if !args.no_archive_config => {
            let archived = archive_config(&args.config, checkpoint)?;
            info!("Configuration archived to {:?}", archived);
        }
        Some(_) => {}
        None => {
            warn!("Sweep finished without a checkpoint; results were not persisted.");
        }
    }

    Ok(())
}

fn print_summary(report: &SweepReport) {
    println!(
        "Sweep complete: {} point(s) in {:.2?}.",
        report.points, report.elapsed
    );
    for series in report.series.enabled() {
        let shape = series
            .shape()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "empty".to_string());
        println!("  {:<16} {:>8} record(s), {}", series.tag(), series.len(), shape);
    }
    for series in report.series.iter().filter(|s| !s.is_enabled()) {
        println!("  {:<16} disabled", series.tag());
    }
    if let Some(path) = &report.checkpoint {
        println!(
            "✓ {} block(s) appended to: {}",
            report.blocks_written,
            path.display()
        );
    }
}

/// Copies the configuration file next to the checkpoint as `<checkpoint stem>.config.toml`.
fn archive_config(config: &Path, checkpoint: &Path) -> Result<PathBuf> {
    let stem = checkpoint
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".to_string());
    let target = checkpoint.with_file_name(format!("{stem}.config.toml"));

    if target.as_path() != config {
        std::fs::copy(config, &target)?;
    }
    Ok(target)
}
