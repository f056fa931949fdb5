// src/reports/models.rs
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;

use crate::utils::error::ExtractError;

/// File naming convention of the upstream downloader: `YYYY-MM-DD.pdf`.
const REPORT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Extensions the extractor can read: raw reports and pre-extracted text.
const REPORT_EXTENSIONS: [&str; 2] = ["pdf", "txt"];

/// Identity of one daily report on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportDocument {
    pub id: String,
    pub path: PathBuf,
    pub date: NaiveDate,
}

impl ReportDocument {
    /// Derives the report identity from its file stem. A stem that is not a
    /// calendar date fails the document instead of falling back to a
    /// placeholder that could collide with other reports.
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ExtractError::InvalidDocumentDate(path.display().to_string()))?;

        let date = NaiveDate::parse_from_str(stem, REPORT_DATE_FORMAT)
            .map_err(|_| ExtractError::InvalidDocumentDate(stem.to_string()))?;

        Ok(Self {
            id: stem.to_string(),
            path: path.to_path_buf(),
            date,
        })
    }
}

/// Lists the report files of one year folder in lexical file-name order,
/// which is date order under the naming convention.
pub fn list_report_files(folder: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| REPORT_EXTENSIONS.iter().any(|ok| e.eq_ignore_ascii_case(ok)))
            .unwrap_or(false);
        if supported {
            files.push(path);
        } else {
            tracing::debug!("Ignoring non-report file {}", path.display());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_identity_from_date_stem() {
        let doc = ReportDocument::from_path(Path::new("data/raw/2024/2024-01-03.pdf")).unwrap();
        assert_eq!(doc.id, "2024-01-03");
        assert_eq!(doc.date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
    }

    #[test]
    fn unparseable_stem_fails_the_document() {
        let err = ReportDocument::from_path(Path::new("data/raw/2024/unknown_date.pdf")).unwrap_err();
        assert_eq!(err, ExtractError::InvalidDocumentDate("unknown_date".to_string()));
    }

    #[test]
    fn lists_reports_in_lexical_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2024-01-05.txt", "2024-01-03.pdf", "notes.md", "2024-01-04.TXT"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        fs::create_dir(dir.path().join("2024-01-01.pdf")).unwrap();

        let names: Vec<String> = list_report_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["2024-01-03.pdf", "2024-01-04.TXT", "2024-01-05.txt"]);
    }
}
