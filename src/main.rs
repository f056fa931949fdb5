// src/main.rs
mod batch;
mod config;
mod extractors;
mod reports;
mod storage;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use batch::{BatchAggregator, Table};
use config::ExtractionConfig;
use extractors::{DocumentExtractor, SchemaCache};
use reports::FileTextSource;
use storage::{RunSummary, StorageManager};
use utils::AppError;

/// Command Line Interface for the daily rice price report extractor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Years to process; each is a folder under --raw-dir
    years: Vec<String>,

    /// Folder holding one sub-folder of reports per year
    #[arg(long, default_value = "./data/raw")]
    raw_dir: PathBuf,

    /// Output directory for the CSV tables and run summary
    #[arg(short, long, default_value = "./data/processed/batch")]
    output_dir: PathBuf,

    /// JSON extraction config (defaults are built in)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the section start marker
    #[arg(long)]
    start_marker: Option<String>,

    /// Override the section end marker
    #[arg(long)]
    end_marker: Option<String>,

    /// Reports extracted in parallel within a year
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Extract a single report file instead of year folders
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Debug mode - save annotated report text for failed documents
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Parse CLI Arguments and setup logging (reads RUST_LOG env var)
    let args = Args::parse();
    utils::logging::setup_logging(args.debug);
    tracing::info!("Starting processing for args: {:?}", args);

    // 2. Load config, CLI markers win over the file
    let mut config = ExtractionConfig::load(args.config.as_deref())?;
    if let Some(marker) = &args.start_marker {
        config.start_marker = marker.clone();
    }
    if let Some(marker) = &args.end_marker {
        config.end_marker = marker.clone();
    }

    // 3. Initialize storage and the extractor
    let storage = StorageManager::new(&args.output_dir)?;
    let debug_dir = args.debug.then(|| args.output_dir.join("debug"));
    let extractor = Arc::new(
        DocumentExtractor::new(Arc::new(config), Arc::new(SchemaCache::new()), Arc::new(FileTextSource))?
            .with_debug_dir(debug_dir),
    );

    // 4. If a single file is given, process just that report
    if let Some(path) = &args.file {
        tracing::info!("Processing single report: {}", path.display());
        return match extractor.extract_file(path) {
            Ok(record) => {
                let id = record.document_id.clone();
                let table = Table::from_records(vec![record], extractor.vocabulary());
                let output = storage.save_document_table(&id, &table)?;
                tracing::info!("Extracted {} rows to {}", table.len(), output.display());
                Ok(())
            }
            Err(failure) => Err(AppError::Processing(format!(
                "{} failed at {:?}: {}",
                failure.document, failure.stage, failure.reason
            ))),
        };
    }

    // 5. Resolve the requested year folders
    let years: Vec<(String, PathBuf)> = args
        .years
        .iter()
        .filter(|year| {
            let valid = year.len() == 4 && year.chars().all(|c| c.is_ascii_digit());
            if !valid {
                tracing::warn!("Ignoring invalid year argument '{}'", year);
            }
            valid
        })
        .map(|year| (year.clone(), args.raw_dir.join(year)))
        .collect();

    if years.is_empty() {
        return Err(AppError::Config(
            "No valid years given. Usage: rice_price_extractor 2023 2024 [--raw-dir DIR]".to_string(),
        ));
    }

    // 6. Process each year, then the combined table
    let aggregator = BatchAggregator::new(Arc::clone(&extractor), args.concurrency);
    let outcome = aggregator.process_all(&years, &storage).await?;

    let summary = RunSummary::from_outcome(&outcome);
    if let Err(e) = storage.save_run_summary(&summary) {
        tracing::error!("Failed to save run summary: {}", e);
    }

    for failure in &summary.failures {
        tracing::info!(
            "Excluded {} ({:?} at {:?}): {}",
            failure.document,
            failure.kind,
            failure.stage,
            failure.reason
        );
    }
    let (hits, misses) = extractor.cache().stats();
    tracing::debug!("Layout cache: {} layouts, {} hits, {} misses", extractor.cache().len(), hits, misses);
    tracing::info!(
        "Processing finished. Success: {}, Failures: {}, Total rows: {}",
        summary.succeeded,
        summary.failed,
        summary.rows
    );

    if summary.succeeded == 0 && summary.failed > 0 {
        return Err(AppError::Processing(format!(
            "Failed to extract any report from {} documents",
            summary.failed
        )));
    }

    Ok(())
}
