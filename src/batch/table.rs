// src/batch/table.rs
use crate::config::ColumnKind;
use crate::extractors::columns::Vocabulary;
use crate::extractors::models::{CanonicalRow, CanonicalSchema, CellValue, DocumentRecord, SchemaColumn};

static MISSING: CellValue = CellValue::Missing;

/// Rows from one or more reports, possibly of different layout vintages.
///
/// The column set is the union of every row's schema, ordered by
/// vocabulary rank with the date column first. A row whose schema lacks a
/// column reads as missing there.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<SchemaColumn>,
    rows: Vec<CanonicalRow>,
}

impl Table {
    /// Concatenates the rows of `records` in the given order.
    pub fn from_records(records: Vec<DocumentRecord>, vocabulary: &Vocabulary) -> Self {
        let mut table = Self::default();
        for record in records {
            table.append(record.schema.as_ref(), record.rows, vocabulary);
        }
        table
    }

    /// Concatenates whole tables in the given order.
    pub fn concat(tables: Vec<Table>, vocabulary: &Vocabulary) -> Self {
        let mut combined = Self::default();
        for table in tables {
            for column in &table.columns {
                combined.add_column(column, vocabulary);
            }
            combined.rows.extend(table.rows);
        }
        combined
    }

    fn append(&mut self, schema: &CanonicalSchema, rows: Vec<CanonicalRow>, vocabulary: &Vocabulary) {
        for column in schema.columns() {
            self.add_column(column, vocabulary);
        }
        self.rows.extend(rows);
    }

    fn add_column(&mut self, column: &SchemaColumn, vocabulary: &Vocabulary) {
        if self.columns.iter().any(|c| c.name == column.name) {
            return;
        }
        // Names outside the vocabulary go last, in order of appearance.
        let key = |c: &SchemaColumn| (c.kind != ColumnKind::Date, vocabulary.rank(&c.name).unwrap_or(usize::MAX));
        let new_key = key(column);
        let at = self
            .columns
            .iter()
            .position(|c| key(c) > new_key)
            .unwrap_or(self.columns.len());
        self.columns.insert(at, column.clone());
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Value of `column` in row `index`, missing when the row's layout had no
    /// such column.
    pub fn cell(&self, index: usize, column: &str) -> Option<&CellValue> {
        let row = self.rows.get(index)?;
        Some(row.get(column).unwrap_or(&MISSING))
    }

    /// Rows as output strings in column order; missing cells are empty.
    pub fn render_rows(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.rows.iter().map(move |row| {
            self.columns
                .iter()
                .map(|c| row.get(&c.name).unwrap_or(&MISSING).render())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn vocabulary() -> Vocabulary {
        Vocabulary::from_config(&ExtractionConfig::default()).unwrap()
    }

    fn record(day: u32, columns: &[(&str, ColumnKind)], values: Vec<CellValue>) -> DocumentRecord {
        let schema = Arc::new(
            CanonicalSchema::new(
                columns
                    .iter()
                    .map(|(name, kind)| SchemaColumn {
                        name: name.to_string(),
                        kind: *kind,
                    })
                    .collect(),
            )
            .unwrap(),
        );
        let date = NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        DocumentRecord {
            document_id: date.to_string(),
            date,
            fingerprint: String::new(),
            schema: Arc::clone(&schema),
            rows: vec![CanonicalRow::new(schema, values).unwrap()],
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn vintages_merge_into_vocabulary_order() {
        let date = |d| CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, d).unwrap());
        let older = record(
            2,
            &[("Date", ColumnKind::Date), ("Samba", ColumnKind::Price), ("Nadu", ColumnKind::Price)],
            vec![date(2), CellValue::Price(230.0), CellValue::Price(185.0)],
        );
        let newer = record(
            3,
            &[("Date", ColumnKind::Date), ("Kekulu Red", ColumnKind::Price), ("Samba", ColumnKind::Price)],
            vec![date(3), CellValue::Price(170.0), CellValue::Price(232.0)],
        );

        let table = Table::from_records(vec![older, newer], &vocabulary());

        assert_eq!(table.column_names(), vec!["Date", "Nadu", "Samba", "Kekulu Red"]);
        assert_eq!(table.cell(0, "Kekulu Red"), Some(&CellValue::Missing));
        assert_eq!(table.cell(1, "Nadu"), Some(&CellValue::Missing));

        let rendered: Vec<Vec<String>> = table.render_rows().collect();
        assert_eq!(rendered[0], vec!["2024-01-02", "185", "230", ""]);
        assert_eq!(rendered[1], vec!["2024-01-03", "", "232", "170"]);
    }

    #[test]
    fn concat_keeps_year_order() {
        let vocabulary = vocabulary();
        let first = Table::from_records(
            vec![record(5, &[("Date", ColumnKind::Date)], vec![CellValue::Missing])],
            &vocabulary,
        );
        let second = Table::from_records(
            vec![record(
                1,
                &[("Date", ColumnKind::Date), ("Nadu", ColumnKind::Price)],
                vec![CellValue::Missing, CellValue::Price(190.0)],
            )],
            &vocabulary,
        );

        let combined = Table::concat(vec![first, second], &vocabulary);

        assert_eq!(combined.len(), 2);
        assert_eq!(combined.column_names(), vec!["Date", "Nadu"]);
        assert_eq!(combined.cell(1, "Nadu"), Some(&CellValue::Price(190.0)));
        assert_eq!(combined.cell(2, "Nadu"), None);
    }
}
