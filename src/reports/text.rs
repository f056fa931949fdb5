// src/reports/text.rs
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use crate::utils::error::ExtractError;

/// The PDF-to-text collaborator. Implementations return the full text of a
/// report; anything that is not usable text is an upstream failure.
pub trait TextSource: Send + Sync {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError>;
}

/// Reads `.pdf` reports through `pdf-extract` and `.txt` files as text that
/// was already extracted.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTextSource;

impl TextSource for FileTextSource {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        let text = if is_pdf {
            extract_pdf_text(path)?
        } else {
            fs::read_to_string(path).map_err(|e| {
                ExtractError::UpstreamExtraction(format!("cannot read {}: {}", path.display(), e))
            })?
        };

        if text.trim().is_empty() {
            return Err(ExtractError::UpstreamExtraction(format!(
                "{} has no text layer",
                path.display()
            )));
        }

        tracing::debug!("Extracted {} characters of text from {}", text.len(), path.display());
        Ok(text)
    }
}

fn extract_pdf_text(path: &Path) -> Result<String, ExtractError> {
    let bytes = fs::read(path).map_err(|e| {
        ExtractError::UpstreamExtraction(format!("cannot read {}: {}", path.display(), e))
    })?;

    // pdf-extract panics on some malformed files instead of returning an error.
    match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(&bytes))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractError::UpstreamExtraction(format!(
            "PDF extraction failed for {}: {}",
            path.display(),
            e
        ))),
        Err(_) => Err(ExtractError::UpstreamExtraction(format!(
            "PDF extraction panicked for {} (malformed document)",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_pre_extracted_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024-01-03.txt");
        fs::write(&path, "Rice Prices\nDate  Nadu\n").unwrap();

        let text = FileTextSource.extract_text(&path).unwrap();
        assert!(text.contains("Nadu"));
    }

    #[test]
    fn whitespace_only_text_is_an_upstream_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024-01-03.txt");
        fs::write(&path, "  \n\n ").unwrap();

        let err = FileTextSource.extract_text(&path).unwrap_err();
        assert!(matches!(err, ExtractError::UpstreamExtraction(_)));
    }

    #[test]
    fn corrupt_pdf_is_an_upstream_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024-01-03.pdf");
        fs::write(&path, b"%PDF-1.4 truncated").unwrap();

        let err = FileTextSource.extract_text(&path).unwrap_err();
        assert!(matches!(err, ExtractError::UpstreamExtraction(_)));
    }
}
