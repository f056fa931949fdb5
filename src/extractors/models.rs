// src/extractors/models.rs
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::ColumnKind;
use crate::utils::error::{ExtractError, FailureKind};

// --- Cell values ---

/// A reconciled cell. `Missing` is the "no data published" sentinel and is
/// never represented as an empty string or an absent value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Date(NaiveDate),
    Price(f64),
    /// Label text, or an unparseable value kept verbatim for review.
    Text(String),
    Missing,
}

impl CellValue {
    /// Rendering used by the CSV sink: missing becomes a blank cell.
    pub fn render(&self) -> String {
        match self {
            CellValue::Missing => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            CellValue::Price(value) => write!(f, "{}", value),
            CellValue::Text(text) => f.write_str(text),
            CellValue::Missing => f.write_str("<missing>"),
        }
    }
}

// --- Schema ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaColumn {
    pub name: String,
    pub kind: ColumnKind,
}

/// Ordered canonical column list. The date column is always first and
/// names are unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSchema {
    columns: Vec<SchemaColumn>,
}

impl CanonicalSchema {
    pub fn new(columns: Vec<SchemaColumn>) -> Result<Self, ExtractError> {
        match columns.first() {
            Some(first) if first.kind == ColumnKind::Date => {}
            _ => {
                return Err(ExtractError::InvalidConfig(
                    "canonical schema must start with the date column".to_string(),
                ))
            }
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(ExtractError::InvalidConfig(format!(
                    "column '{}' appears twice in schema",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[SchemaColumn] {
        &self.columns
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Which physical cell position of a document layout feeds each canonical
/// column. Indexed by schema position; `None` means the layout does not
/// publish that column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnOrderMap {
    positions: Vec<Option<usize>>,
}

impl ColumnOrderMap {
    pub fn new(positions: Vec<Option<usize>>) -> Self {
        Self { positions }
    }

    /// Builds the map from `(physical position, column name)` pairs. Names
    /// outside the schema are rejected.
    pub fn from_pairs(pairs: &[(usize, &str)], schema: &CanonicalSchema) -> Result<Self, ExtractError> {
        let mut positions = vec![None; schema.len()];
        for (position, name) in pairs {
            let index = schema.index_of(name).ok_or_else(|| ExtractError::UnknownColumn {
                label: name.to_string(),
                header: schema.names().join(", "),
            })?;
            positions[index] = Some(*position);
        }
        Ok(Self { positions })
    }

    pub fn position_of(&self, schema_index: usize) -> Option<usize> {
        self.positions.get(schema_index).copied().flatten()
    }

    /// Number of physical cells a complete row of this layout carries.
    pub fn width(&self) -> usize {
        self.positions
            .iter()
            .flatten()
            .max()
            .map(|p| p + 1)
            .unwrap_or(0)
    }
}

// --- Rows ---

/// One reconciled row. Always holds exactly one value per column of the
/// schema it was reconciled against, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRow {
    schema: Arc<CanonicalSchema>,
    values: Vec<CellValue>,
}

impl CanonicalRow {
    /// Returns `None` when `values` does not match the schema width.
    pub fn new(schema: Arc<CanonicalSchema>, values: Vec<CellValue>) -> Option<Self> {
        (values.len() == schema.len()).then_some(Self { schema, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&CellValue> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }
}

// --- Diagnostics ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    RowTooShort,
    RowTooLong,
    NeedsReview,
    NoiseLine,
    RepeatedColumn,
    /// A requested year had no folder under the raw directory.
    MissingFolder,
}

/// Non-fatal finding recorded while extracting a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub document: String,
    pub line: Option<usize>,
    pub kind: DiagnosticKind,
    pub detail: String,
}

/// Per-document progress. A failure reports the last stage reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStage {
    Pending,
    TextLoaded,
    Located,
    Header,
    RowsParsed,
    Reconciled,
    Done,
}

/// A document that did not reach `Done`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentFailure {
    pub document: String,
    pub stage: DocumentStage,
    pub kind: FailureKind,
    pub reason: String,
}

impl DocumentFailure {
    pub fn new(document: &str, stage: DocumentStage, error: &ExtractError) -> Self {
        Self {
            document: document.to_string(),
            stage,
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}

/// Every row extracted from one report, tagged with the report date.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub document_id: String,
    pub date: NaiveDate,
    pub fingerprint: String,
    pub schema: Arc<CanonicalSchema>,
    pub rows: Vec<CanonicalRow>,
    pub diagnostics: Vec<Diagnostic>,
}
