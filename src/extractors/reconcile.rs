// src/extractors/reconcile.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::config::ColumnKind;
use crate::extractors::models::{CanonicalRow, CanonicalSchema, CellValue, ColumnOrderMap};
use crate::extractors::rows::{is_date_token, is_numeric_token, RawRow};

/// Date spellings seen in report rows, tried in order.
const ROW_DATE_FORMATS: [&str; 6] = ["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%d/%m/%Y", "%d-%m-%Y", "%Y.%m.%d"];

/// Something worth a diagnostic that did not stop the row from reconciling.
#[derive(Debug, Clone, PartialEq)]
pub enum RowIssue {
    /// Fewer cells than the layout maps; the absent columns are missing.
    TooShort { expected: usize, found: usize },
    /// More cells than the layout maps; the extra cells are dropped.
    TooLong {
        expected: usize,
        found: usize,
        ignored: Vec<String>,
    },
    /// A value that is neither a number, a date nor a missing token.
    NeedsReview { column: String, raw: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub row: CanonicalRow,
    pub issues: Vec<RowIssue>,
}

/// Aligns raw rows against a canonical schema and coerces cell values.
#[derive(Debug, Clone)]
pub struct SchemaReconciler {
    missing_tokens: HashSet<String>,
}

impl SchemaReconciler {
    pub fn new(missing_tokens: &[String]) -> Self {
        Self {
            missing_tokens: missing_tokens.iter().map(|t| t.trim().to_lowercase()).collect(),
        }
    }

    /// Produces exactly one value per schema column. Columns whose mapped
    /// position is absent from the row become `Missing`; an unmapped date
    /// column takes `fallback_date` (the report date) when given.
    pub fn reconcile(
        &self,
        row: &RawRow,
        schema: &Arc<CanonicalSchema>,
        order: &ColumnOrderMap,
        fallback_date: Option<NaiveDate>,
    ) -> Reconciled {
        let mut issues = Vec::new();
        let expected = order.width();
        let found = row.cells.len();

        if found < expected {
            issues.push(RowIssue::TooShort { expected, found });
        } else if found > expected {
            let ignored = row
                .cells
                .iter()
                .filter(|c| c.position >= expected)
                .map(|c| c.text.clone())
                .collect();
            issues.push(RowIssue::TooLong {
                expected,
                found,
                ignored,
            });
        }

        let values = schema
            .columns()
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let cell = order.position_of(index).and_then(|p| row.cell_at(p));
                match cell {
                    Some(cell) => {
                        let (value, needs_review) = self.coerce(&cell.text, column.kind);
                        if needs_review {
                            issues.push(RowIssue::NeedsReview {
                                column: column.name.clone(),
                                raw: cell.text.clone(),
                            });
                        }
                        value
                    }
                    None if column.kind == ColumnKind::Date => {
                        fallback_date.map(CellValue::Date).unwrap_or(CellValue::Missing)
                    }
                    None => CellValue::Missing,
                }
            })
            .collect::<Vec<_>>();

        let width = values.len();
        let row = CanonicalRow::new(Arc::clone(schema), values)
            .unwrap_or_else(|| unreachable!("reconciled {} values for {} columns", width, schema.len()));

        Reconciled { row, issues }
    }

    /// Coerces one raw cell according to its column kind. The flag is set
    /// when the value was kept as text because it could not be parsed.
    pub fn coerce(&self, raw: &str, kind: ColumnKind) -> (CellValue, bool) {
        let trimmed = raw.trim();
        if trimmed.is_empty() || self.missing_tokens.contains(&trimmed.to_lowercase()) {
            return (CellValue::Missing, false);
        }

        match kind {
            ColumnKind::Label => (CellValue::Text(trimmed.to_string()), false),
            ColumnKind::Price => match parse_price(trimmed) {
                Some(value) => (CellValue::Price(value), false),
                None => (CellValue::Text(trimmed.to_string()), true),
            },
            ColumnKind::Date => match parse_row_date(trimmed) {
                Some(date) => (CellValue::Date(date), false),
                None => (CellValue::Text(trimmed.to_string()), true),
            },
        }
    }
}

fn parse_price(raw: &str) -> Option<f64> {
    if !is_numeric_token(raw) {
        return None;
    }
    raw.replace(',', "").parse::<f64>().ok()
}

fn parse_row_date(raw: &str) -> Option<NaiveDate> {
    if !is_date_token(raw) {
        return None;
    }
    ROW_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}
