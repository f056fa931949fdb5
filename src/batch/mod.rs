// src/batch/mod.rs
pub mod table;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt as _};

use crate::extractors::document::DocumentExtractor;
use crate::extractors::models::{Diagnostic, DiagnosticKind, DocumentFailure, DocumentRecord, DocumentStage};
use crate::reports::list_report_files;
use crate::storage::TableSink;
use crate::utils::error::{AppError, ExtractError};

pub use table::Table;

/// Result of one year folder.
#[derive(Debug, Clone)]
pub struct YearOutcome {
    pub year: String,
    pub documents: usize,
    /// `None` when no document of the year succeeded.
    pub table: Option<Table>,
    pub failures: Vec<DocumentFailure>,
    pub diagnostics: Vec<Diagnostic>,
    pub output: Option<PathBuf>,
}

impl YearOutcome {
    pub fn succeeded(&self) -> usize {
        self.documents - self.failures.len()
    }

    pub fn rows(&self) -> usize {
        self.table.as_ref().map(Table::len).unwrap_or(0)
    }
}

/// Result of a multi-year run.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub years: Vec<YearOutcome>,
    /// One `MissingFolder` diagnostic per requested year without a folder.
    pub skipped: Vec<Diagnostic>,
    /// `None` when no year produced a table.
    pub table: Option<Table>,
    pub output: Option<PathBuf>,
}

pub struct BatchAggregator {
    extractor: Arc<DocumentExtractor>,
    concurrency: usize,
}

impl BatchAggregator {
    pub fn new(extractor: Arc<DocumentExtractor>, concurrency: usize) -> Self {
        Self {
            extractor,
            concurrency: concurrency.max(1),
        }
    }

    /// Extracts every report in `folder`, in file-name order, and writes the
    /// year table through `sink`. A failed report is logged and recorded;
    /// it never stops the rest of the folder.
    pub async fn process_folder(&self, year: &str, folder: &Path, sink: &dyn TableSink) -> Result<YearOutcome, AppError> {
        let files = list_report_files(folder)?;
        tracing::info!("[{}] Found {} report files in {}", year, files.len(), folder.display());

        let results: Vec<Result<DocumentRecord, DocumentFailure>> = stream::iter(files.iter().cloned().map(|path| {
            let extractor = Arc::clone(&self.extractor);
            async move {
                let document = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match tokio::task::spawn_blocking(move || extractor.extract_file(&path)).await {
                    Ok(result) => result,
                    Err(e) => Err(DocumentFailure::new(
                        &document,
                        DocumentStage::Pending,
                        &ExtractError::UpstreamExtraction(format!("extraction task failed: {}", e)),
                    )),
                }
            }
        }))
        .buffered(self.concurrency)
        .collect()
        .await;

        let mut records = Vec::new();
        let mut failures = Vec::new();
        let mut diagnostics = Vec::new();
        for result in results {
            match result {
                Ok(mut record) => {
                    tracing::debug!(
                        "[{}] {} rows from {} (report date {})",
                        year,
                        record.rows.len(),
                        record.document_id,
                        record.date
                    );
                    diagnostics.append(&mut record.diagnostics);
                    records.push(record);
                }
                Err(failure) => {
                    log_failure(year, &failure);
                    failures.push(failure);
                }
            }
        }

        let mut outcome = YearOutcome {
            year: year.to_string(),
            documents: files.len(),
            table: None,
            failures,
            diagnostics,
            output: None,
        };

        if records.is_empty() {
            tracing::warn!(
                "[{}] No report extracted successfully ({} failed)",
                year,
                outcome.failures.len()
            );
            return Ok(outcome);
        }

        let table = Table::from_records(records, self.extractor.vocabulary());
        outcome.output = Some(sink.write_year_table(year, &table)?);
        tracing::info!(
            "[{}] Extracted {} rows. Success: {}, Failures: {}",
            year,
            table.len(),
            outcome.succeeded(),
            outcome.failures.len()
        );
        outcome.table = Some(table);
        Ok(outcome)
    }

    /// Processes each `(year, folder)` in the order given, then writes the
    /// combined table. Years whose folder is missing are skipped.
    pub async fn process_all(&self, years: &[(String, PathBuf)], sink: &dyn TableSink) -> Result<BatchOutcome, AppError> {
        let mut outcome = BatchOutcome::default();

        for (year, folder) in years {
            if !folder.is_dir() {
                tracing::warn!("[{}] Folder {} not found, skipping year", year, folder.display());
                outcome.skipped.push(Diagnostic {
                    document: year.clone(),
                    line: None,
                    kind: DiagnosticKind::MissingFolder,
                    detail: format!("folder {} not found", folder.display()),
                });
                continue;
            }
            outcome.years.push(self.process_folder(year, folder, sink).await?);
        }

        let tables: Vec<Table> = outcome.years.iter().filter_map(|y| y.table.clone()).collect();
        if tables.is_empty() {
            tracing::warn!("No data extracted for any requested year");
            return Ok(outcome);
        }

        let combined = Table::concat(tables, self.extractor.vocabulary());
        outcome.output = Some(sink.write_combined_table(&combined)?);
        tracing::info!("Combined {} rows across {} years", combined.len(), outcome.years.len());
        outcome.table = Some(combined);
        Ok(outcome)
    }
}

fn log_failure(year: &str, failure: &DocumentFailure) {
    if failure.kind.is_layout_drift() {
        tracing::error!(
            "[{}] {} excluded at {:?}, report layout not understood: {}",
            year,
            failure.document,
            failure.stage,
            failure.reason
        );
    } else {
        tracing::warn!(
            "[{}] {} excluded at {:?}: {}",
            year,
            failure.document,
            failure.stage,
            failure.reason
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::extractors::document::SchemaCache;
    use crate::extractors::models::CellValue;
    use crate::reports::FileTextSource;
    use crate::storage::StorageManager;
    use crate::utils::error::{FailureKind, StorageError};
    use std::fs;
    use std::sync::Mutex;

    fn aggregator(concurrency: usize) -> BatchAggregator {
        let extractor = DocumentExtractor::new(
            Arc::new(ExtractionConfig::default()),
            Arc::new(SchemaCache::new()),
            Arc::new(FileTextSource),
        )
        .unwrap();
        BatchAggregator::new(Arc::new(extractor), concurrency)
    }

    fn report(nadu: &str, samba: &str) -> String {
        format!(
            "DAILY PRICE REPORT\nRice Prices\nItem  Nadu (Rs/Kg)  Samba (Rs/Kg)\nRetail  {}  {}\nVegetable Prices\nBeans  400\n",
            nadu, samba
        )
    }

    /// Records what would have been written instead of touching disk.
    #[derive(Default)]
    struct RecordingSink {
        writes: Mutex<Vec<(String, usize)>>,
    }

    impl TableSink for RecordingSink {
        fn write_year_table(&self, year: &str, table: &Table) -> Result<PathBuf, StorageError> {
            self.writes.lock().unwrap().push((year.to_string(), table.len()));
            Ok(PathBuf::from(format!("{}.csv", year)))
        }

        fn write_combined_table(&self, table: &Table) -> Result<PathBuf, StorageError> {
            self.writes.lock().unwrap().push(("all".to_string(), table.len()));
            Ok(PathBuf::from("all.csv"))
        }
    }

    #[tokio::test]
    async fn failed_report_is_excluded_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("2024-01-02.txt"), report("185", "230")).unwrap();
        fs::write(dir.path().join("2024-01-03.txt"), "Holiday. No market report.").unwrap();
        fs::write(dir.path().join("2024-01-04.txt"), report("186", "-")).unwrap();
        let sink = RecordingSink::default();

        let outcome = aggregator(2).process_folder("2024", dir.path(), &sink).await.unwrap();

        assert_eq!(outcome.documents, 3);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].document, "2024-01-03");
        assert_eq!(outcome.failures[0].kind, FailureKind::SectionNotFound);

        let table = outcome.table.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column_names(), vec!["Date", "Item", "Nadu", "Samba"]);
        assert_eq!(table.cell(0, "Date").unwrap().to_string(), "2024-01-02");
        assert_eq!(table.cell(1, "Nadu"), Some(&CellValue::Price(186.0)));
        assert_eq!(table.cell(1, "Samba"), Some(&CellValue::Missing));
        assert_eq!(*sink.writes.lock().unwrap(), vec![("2024".to_string(), 2)]);
    }

    #[tokio::test]
    async fn all_failed_folder_yields_no_table() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("2024-02-01.txt"), "nothing here").unwrap();
        fs::write(dir.path().join("2024-02-02.txt"), "   ").unwrap();
        let sink = RecordingSink::default();

        let outcome = aggregator(4).process_folder("2024", dir.path(), &sink).await.unwrap();

        assert!(outcome.table.is_none());
        assert_eq!(outcome.succeeded(), 0);
        assert_eq!(outcome.failures[1].kind, FailureKind::UpstreamExtraction);
        assert!(sink.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn rows_follow_file_name_order_at_any_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        for day in 1..=9 {
            fs::write(
                dir.path().join(format!("2023-03-{:02}.txt", day)),
                report(&format!("{}", 180 + day), "230"),
            )
            .unwrap();
        }

        for concurrency in [1, 3, 16] {
            let sink = RecordingSink::default();
            let outcome = tokio_test::block_on(aggregator(concurrency).process_folder("2023", dir.path(), &sink)).unwrap();
            let table = outcome.table.unwrap();
            let nadu: Vec<String> = (0..table.len())
                .map(|i| table.cell(i, "Nadu").unwrap().to_string())
                .collect();
            assert_eq!(nadu, (181..=189).map(|p| p.to_string()).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn missing_year_is_skipped_and_years_are_combined_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        fs::create_dir_all(raw.join("2023")).unwrap();
        fs::create_dir_all(raw.join("2024")).unwrap();
        fs::write(raw.join("2023").join("2023-12-29.txt"), report("180", "225")).unwrap();
        fs::write(raw.join("2024").join("2024-01-02.txt"), report("185", "230")).unwrap();
        fs::write(raw.join("2024").join("2024-01-03.txt"), report("186", "231")).unwrap();
        let storage = StorageManager::new(dir.path().join("out")).unwrap();

        let years = vec![
            ("2024".to_string(), raw.join("2024")),
            ("2022".to_string(), raw.join("2022")),
            ("2023".to_string(), raw.join("2023")),
        ];
        let outcome = aggregator(2).process_all(&years, &storage).await.unwrap();

        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].document, "2022");
        assert_eq!(outcome.skipped[0].kind, DiagnosticKind::MissingFolder);

        let combined = outcome.table.unwrap();
        let dates: Vec<String> = (0..combined.len())
            .map(|i| combined.cell(i, "Date").unwrap().to_string())
            .collect();
        assert_eq!(dates, vec!["2024-01-02", "2024-01-03", "2023-12-29"]);

        assert!(storage.year_table_path("2023").exists());
        assert!(storage.year_table_path("2024").exists());
        let stored = crate::storage::read_table(&storage.combined_path()).unwrap();
        assert_eq!(stored.headers, combined.column_names());
        assert_eq!(stored.rows.len(), 3);
    }
}
