// src/config.rs
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extractors::columns::normalize_label;
use crate::utils::error::{AppError, ExtractError};

/// How cells of a canonical column are coerced during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Date,
    Label,
    #[default]
    Price,
}

/// One entry of the controlled vocabulary: a canonical name plus every
/// header spelling accepted for it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub kind: ColumnKind,
}

impl ColumnDefinition {
    fn new(name: &str, kind: ColumnKind, synonyms: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
            kind,
        }
    }
}

/// Options recognized by the extraction pipeline. Every field has a
/// default, so a JSON file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub start_marker: String,
    pub end_marker: String,
    /// Keep the start marker text at the head of the section.
    pub include_start_marker: bool,
    /// Keep the end marker text at the tail of the section.
    pub include_end_marker: bool,
    /// Ordered: the order here is the column order of every output table.
    pub vocabulary: Vec<ColumnDefinition>,
    /// Unit suffixes stripped from header labels ("Nadu (Rs/Kg)" -> "Nadu").
    pub unit_qualifiers: Vec<String>,
    /// Cell values meaning "no data published".
    pub missing_tokens: Vec<String>,
    /// Footer and continuation lines inside a section.
    pub skip_line_patterns: Vec<String>,
    /// Minimum run of spaces separating two cells on a line.
    pub min_gap_width: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        use ColumnKind::{Date, Label, Price};

        let vocabulary = vec![
            ColumnDefinition::new("Date", Date, &["date", "report date", "day"]),
            ColumnDefinition::new("Item", Label, &["item", "items", "variety", "commodity", "description"]),
            ColumnDefinition::new("Unit", Label, &["unit", "units"]),
            ColumnDefinition::new("Price", Price, &["price", "rs/kg", "rs per kg", "price rs/kg"]),
            ColumnDefinition::new("Nadu", Price, &["nadu", "white nadu"]),
            ColumnDefinition::new("Red Nadu", Price, &["red nadu"]),
            ColumnDefinition::new("Samba", Price, &["samba"]),
            ColumnDefinition::new("Keeri Samba", Price, &["keeri samba", "kiri samba"]),
            ColumnDefinition::new("Kekulu White", Price, &["kekulu white", "white kekulu", "white raw rice", "raw rice white"]),
            ColumnDefinition::new("Kekulu Red", Price, &["kekulu red", "red kekulu", "red raw rice", "raw rice red"]),
            ColumnDefinition::new("Pettah Wholesale", Price, &["pettah wholesale", "wholesale pettah"]),
            ColumnDefinition::new("Marandagahamula Wholesale", Price, &["marandagahamula wholesale", "wholesale marandagahamula", "marandagahamula"]),
            ColumnDefinition::new("Dambulla Wholesale", Price, &["dambulla wholesale", "wholesale dambulla"]),
            ColumnDefinition::new("Pettah Retail", Price, &["pettah retail", "retail pettah"]),
            ColumnDefinition::new("Dambulla Retail", Price, &["dambulla retail", "retail dambulla"]),
            ColumnDefinition::new("Narahenpita Retail", Price, &["narahenpita retail", "retail narahenpita", "narahenpita"]),
        ];

        Self {
            start_marker: "Rice Prices".to_string(),
            end_marker: "Vegetable Prices".to_string(),
            include_start_marker: false,
            include_end_marker: false,
            vocabulary,
            unit_qualifiers: ["rs/kg", "rs per kg", "per kg", "rs", "kg", "rs/1kg"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            missing_tokens: ["-", "--", "---", "n.a.", "n.a", "na", "n/a", "nt", "n.t.", "no trading", "nil", "*"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            skip_line_patterns: vec![
                r"(?i)^source\s*:".to_string(),
                r"(?i)^notes?\s*[:\-]".to_string(),
                r"(?i)^page\s+\d+(\s+of\s+\d+)?$".to_string(),
                r"(?i)\((cont(inued|'d)?\.?)\)$".to_string(),
                r"^\*".to_string(),
            ],
            min_gap_width: 2,
        }
    }
}

impl ExtractionConfig {
    /// Loads the config from a JSON file, or the built-in defaults when no
    /// path is given. The result is validated either way.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)?;
                let parsed: ExtractionConfig = serde_json::from_str(&raw).map_err(|e| {
                    AppError::Config(format!("Invalid config file '{}': {}", path.display(), e))
                })?;
                tracing::info!("Loaded extraction config from {}", path.display());
                parsed
            }
            None => {
                tracing::debug!("Using built-in extraction config");
                ExtractionConfig::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.start_marker.is_empty() || self.end_marker.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "start_marker and end_marker must be non-empty".to_string(),
            ));
        }
        if self.min_gap_width == 0 {
            return Err(ExtractError::InvalidConfig("min_gap_width must be at least 1".to_string()));
        }

        let date_columns = self
            .vocabulary
            .iter()
            .filter(|c| c.kind == ColumnKind::Date)
            .count();
        if date_columns != 1 {
            return Err(ExtractError::InvalidConfig(format!(
                "vocabulary needs exactly one date column, found {}",
                date_columns
            )));
        }

        let mut names = HashSet::new();
        let mut spellings: Vec<(String, &str)> = Vec::new();
        for column in &self.vocabulary {
            if !names.insert(column.name.as_str()) {
                return Err(ExtractError::InvalidConfig(format!(
                    "column '{}' is defined twice",
                    column.name
                )));
            }
            for spelling in std::iter::once(&column.name).chain(column.synonyms.iter()) {
                let normalized = normalize_label(spelling);
                if let Some((_, owner)) = spellings
                    .iter()
                    .find(|(seen, owner)| *seen == normalized && *owner != column.name)
                {
                    return Err(ExtractError::InvalidConfig(format!(
                        "synonym '{}' is claimed by both '{}' and '{}'",
                        spelling, owner, column.name
                    )));
                }
                spellings.push((normalized, column.name.as_str()));
            }
        }

        for pattern in &self.skip_line_patterns {
            Regex::new(pattern).map_err(|e| {
                ExtractError::InvalidConfig(format!("bad skip pattern '{}': {}", pattern, e))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ExtractionConfig::default().validate().unwrap();
    }

    #[test]
    fn default_order_follows_report_header_order() {
        let names: Vec<String> = ExtractionConfig::default()
            .vocabulary
            .into_iter()
            .map(|c| c.name)
            .collect();
        let rank = |name: &str| names.iter().position(|n| n == name).unwrap();

        assert_eq!(rank("Date"), 0);
        assert!(rank("Nadu") < rank("Samba"));
        assert!(rank("Samba") < rank("Kekulu White"));
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "start_marker": "RICE", "missing_tokens": ["-"] }"#).unwrap();

        let config = ExtractionConfig::load(Some(&path)).unwrap();

        assert_eq!(config.start_marker, "RICE");
        assert_eq!(config.missing_tokens, vec!["-".to_string()]);
        assert_eq!(config.end_marker, ExtractionConfig::default().end_marker);
        assert_eq!(config.vocabulary.len(), ExtractionConfig::default().vocabulary.len());
    }

    #[test]
    fn rejects_synonym_shared_by_two_columns() {
        let mut config = ExtractionConfig::default();
        config.vocabulary.push(ColumnDefinition::new("Rice", ColumnKind::Price, &["Samba"]));

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ExtractError::InvalidConfig(msg) if msg.contains("Samba")));
    }

    #[test]
    fn rejects_vocabulary_without_date_column() {
        let mut config = ExtractionConfig::default();
        config.vocabulary.retain(|c| c.kind != ColumnKind::Date);

        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_skip_pattern() {
        let config = ExtractionConfig {
            skip_line_patterns: vec!["(unclosed".to_string()],
            ..ExtractionConfig::default()
        };

        assert!(matches!(config.validate(), Err(ExtractError::InvalidConfig(_))));
    }
}
