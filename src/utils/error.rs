// src/utils/error.rs
use serde::Serialize;
use thiserror::Error;

// Errors raised while turning one report into rows. Every variant is
// recoverable at document granularity: the batch records it and moves on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("Section not found: {0}")]
    SectionNotFound(String),

    #[error("No header line found before the first data row")]
    HeaderNotFound,

    #[error("Unknown column label '{label}' in header '{header}'")]
    UnknownColumn { label: String, header: String },

    #[error("Labels '{first}' and '{second}' both resolve to column '{column}'")]
    DuplicateColumn {
        column: String,
        first: String,
        second: String,
    },

    #[error("Text extraction failed upstream: {0}")]
    UpstreamExtraction(String),

    #[error("Cannot derive a report date from '{0}'")]
    InvalidDocumentDate(String),

    #[error("Invalid extraction config: {0}")]
    InvalidConfig(String),
}

/// Serializable classification of a document-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SectionNotFound,
    HeaderNotFound,
    UnknownColumn,
    DuplicateColumn,
    UpstreamExtraction,
    InvalidDocumentDate,
    InvalidConfig,
}

impl FailureKind {
    /// The report layout changed and the vocabulary needs attention.
    pub fn is_layout_drift(self) -> bool {
        matches!(self, FailureKind::UnknownColumn | FailureKind::DuplicateColumn)
    }
}

impl ExtractError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExtractError::SectionNotFound(_) => FailureKind::SectionNotFound,
            ExtractError::HeaderNotFound => FailureKind::HeaderNotFound,
            ExtractError::UnknownColumn { .. } => FailureKind::UnknownColumn,
            ExtractError::DuplicateColumn { .. } => FailureKind::DuplicateColumn,
            ExtractError::UpstreamExtraction(_) => FailureKind::UpstreamExtraction,
            ExtractError::InvalidDocumentDate(_) => FailureKind::InvalidDocumentDate,
            ExtractError::InvalidConfig(_) => FailureKind::InvalidConfig,
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_drift_covers_column_failures_only() {
        let unknown = ExtractError::UnknownColumn {
            label: "Keeri".into(),
            header: "Date Keeri".into(),
        };
        assert!(unknown.kind().is_layout_drift());
        assert!(FailureKind::DuplicateColumn.is_layout_drift());
        assert!(!ExtractError::SectionNotFound("RICE".into()).kind().is_layout_drift());
        assert!(!ExtractError::HeaderNotFound.kind().is_layout_drift());
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        let kind = ExtractError::SectionNotFound("x".into()).kind();
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"section_not_found\"");
    }
}
