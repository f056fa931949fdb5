// src/storage/mod.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::batch::{BatchOutcome, Table};
use crate::extractors::models::{DiagnosticKind, DocumentFailure};
use crate::utils::error::StorageError;

const COMBINED_FILE_NAME: &str = "rice_prices_all_years.csv";
const SUMMARY_FILE_NAME: &str = "run_summary.json";

/// Destination for the tables a batch run produces.
pub trait TableSink: Send + Sync {
    fn write_year_table(&self, year: &str, table: &Table) -> Result<PathBuf, StorageError>;

    fn write_combined_table(&self, table: &Table) -> Result<PathBuf, StorageError>;
}

pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        // Create the base directory if it doesn't exist
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path })
    }

    pub fn year_table_path(&self, year: &str) -> PathBuf {
        self.base_dir.join(format!("rice_prices_{}.csv", year))
    }

    pub fn combined_path(&self) -> PathBuf {
        self.base_dir.join(COMBINED_FILE_NAME)
    }

    /// Single-report output, named after the report id.
    pub fn save_document_table(&self, document_id: &str, table: &Table) -> Result<PathBuf, StorageError> {
        let path = self.base_dir.join(format!("{}.csv", document_id));
        write_table(&path, table)?;
        Ok(path)
    }

    /// Saves the run summary in JSON format
    pub fn save_run_summary(&self, summary: &RunSummary) -> Result<PathBuf, StorageError> {
        let file_path = self.base_dir.join(SUMMARY_FILE_NAME);

        let summary_str =
            serde_json::to_string_pretty(summary).map_err(|e| StorageError::SerializationError(e.to_string()))?;

        fs::write(&file_path, summary_str).map_err(StorageError::IoError)?;

        tracing::info!("Saved run summary to {}", file_path.display());

        Ok(file_path)
    }
}

impl TableSink for StorageManager {
    fn write_year_table(&self, year: &str, table: &Table) -> Result<PathBuf, StorageError> {
        let path = self.year_table_path(year);
        write_table(&path, table)?;
        Ok(path)
    }

    fn write_combined_table(&self, table: &Table) -> Result<PathBuf, StorageError> {
        let path = self.combined_path();
        write_table(&path, table)?;
        Ok(path)
    }
}

/// Writes `table` as CSV: one header record in column order, one record per
/// row, missing values as empty fields.
pub fn write_table(path: &Path, table: &Table) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.column_names())?;
    for record in table.render_rows() {
        writer.write_record(&record)?;
    }
    writer.flush()?;

    tracing::info!("Saved {} rows to {}", table.len(), path.display());
    Ok(())
}

/// A CSV read back from disk, as plain strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn read_table(path: &Path) -> Result<StoredTable, StorageError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.iter().map(String::from).collect();
    let rows = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(String::from).collect()))
        .collect::<Result<Vec<Vec<String>>, csv::Error>>()?;
    Ok(StoredTable { headers, rows })
}

// --- Run summary ---

#[derive(Debug, Clone, Serialize)]
pub struct YearSummary {
    pub year: String,
    pub documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rows: usize,
    pub output: Option<PathBuf>,
}

/// What a batch run did, written next to the CSV outputs.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: String,
    pub documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rows: usize,
    pub years: Vec<YearSummary>,
    pub skipped_years: Vec<String>,
    pub combined_output: Option<PathBuf>,
    pub failures: Vec<DocumentFailure>,
    pub diagnostics_by_kind: BTreeMap<DiagnosticKind, usize>,
}

impl RunSummary {
    pub fn from_outcome(outcome: &BatchOutcome) -> Self {
        let years: Vec<YearSummary> = outcome
            .years
            .iter()
            .map(|y| YearSummary {
                year: y.year.clone(),
                documents: y.documents,
                succeeded: y.succeeded(),
                failed: y.failures.len(),
                rows: y.rows(),
                output: y.output.clone(),
            })
            .collect();

        let mut diagnostics_by_kind = BTreeMap::new();
        let diagnostics = outcome
            .years
            .iter()
            .flat_map(|y| y.diagnostics.iter())
            .chain(outcome.skipped.iter());
        for diagnostic in diagnostics {
            *diagnostics_by_kind.entry(diagnostic.kind).or_insert(0) += 1;
        }

        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            documents: years.iter().map(|y| y.documents).sum(),
            succeeded: years.iter().map(|y| y.succeeded).sum(),
            failed: years.iter().map(|y| y.failed).sum(),
            rows: years.iter().map(|y| y.rows).sum(),
            skipped_years: outcome.skipped.iter().map(|d| d.document.clone()).collect(),
            combined_output: outcome.output.clone(),
            failures: outcome.years.iter().flat_map(|y| y.failures.iter().cloned()).collect(),
            diagnostics_by_kind,
            years,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::YearOutcome;
    use crate::config::{ColumnKind, ExtractionConfig};
    use crate::extractors::columns::Vocabulary;
    use crate::extractors::models::{
        CanonicalRow, CanonicalSchema, CellValue, Diagnostic, DocumentRecord, DocumentStage, SchemaColumn,
    };
    use crate::utils::error::ExtractError;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn sample_table() -> Table {
        let schema = Arc::new(
            CanonicalSchema::new(vec![
                SchemaColumn { name: "Date".into(), kind: ColumnKind::Date },
                SchemaColumn { name: "Nadu".into(), kind: ColumnKind::Price },
                SchemaColumn { name: "Samba".into(), kind: ColumnKind::Price },
            ])
            .unwrap(),
        );
        let date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let rows = vec![
            CanonicalRow::new(
                Arc::clone(&schema),
                vec![CellValue::Date(date), CellValue::Price(185.5), CellValue::Missing],
            )
            .unwrap(),
            CanonicalRow::new(
                Arc::clone(&schema),
                vec![CellValue::Date(date), CellValue::Missing, CellValue::Text("230*".into())],
            )
            .unwrap(),
        ];
        let record = DocumentRecord {
            document_id: "2024-01-03".into(),
            date,
            fingerprint: String::new(),
            schema,
            rows,
            diagnostics: Vec::new(),
        };
        let vocabulary = Vocabulary::from_config(&ExtractionConfig::default()).unwrap();
        Table::from_records(vec![record], &vocabulary)
    }

    #[test]
    fn csv_round_trip_keeps_order_and_blank_missing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path().join("out")).unwrap();
        let table = sample_table();

        let path = storage.write_year_table("2024", &table).unwrap();
        assert_eq!(path, dir.path().join("out").join("rice_prices_2024.csv"));

        let stored = read_table(&path).unwrap();
        assert_eq!(stored.headers, vec!["Date", "Nadu", "Samba"]);
        assert_eq!(
            stored.rows,
            vec![
                vec!["2024-01-03".to_string(), "185.5".to_string(), String::new()],
                vec!["2024-01-03".to_string(), String::new(), "230*".to_string()],
            ]
        );
        assert_eq!(stored.rows, table.render_rows().collect::<Vec<_>>());

        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("None"));
        assert!(!raw.contains("missing"));
    }

    #[test]
    fn summary_counts_failures_and_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let failure = DocumentFailure::new(
            "2024-01-04",
            DocumentStage::TextLoaded,
            &ExtractError::SectionNotFound("start marker missing".into()),
        );
        let diagnostic = |kind| Diagnostic {
            document: "2024".into(),
            line: None,
            kind,
            detail: String::new(),
        };
        let outcome = BatchOutcome {
            years: vec![YearOutcome {
                year: "2024".into(),
                documents: 3,
                table: Some(sample_table()),
                failures: vec![failure],
                diagnostics: vec![diagnostic(DiagnosticKind::RowTooShort)],
                output: None,
            }],
            skipped: vec![diagnostic(DiagnosticKind::MissingFolder)],
            table: None,
            output: None,
        };

        let summary = RunSummary::from_outcome(&outcome);
        assert_eq!((summary.documents, summary.succeeded, summary.failed), (3, 2, 1));
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.skipped_years, vec!["2024".to_string()]);

        let path = storage.save_run_summary(&summary).unwrap();
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["failures"][0]["kind"], "section_not_found");
        assert_eq!(json["failures"][0]["stage"], "text_loaded");
        assert_eq!(json["diagnostics_by_kind"]["row_too_short"], 1);
        assert_eq!(json["diagnostics_by_kind"]["missing_folder"], 1);
    }
}
