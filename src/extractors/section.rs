// src/extractors/section.rs

// --- Imports ---
use crate::utils::error::ExtractError;

// --- Data Structures ---

/// The part of a report's text that holds the price table. Offsets are byte
/// offsets into the full document text and bound `text` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

impl<'a> Section<'a> {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Finds the price table between a start and an end marker.
///
/// Markers are literal, case-sensitive substrings. By default both markers
/// are excluded from the section; `include_start`/`include_end` keep the
/// marker text on that side (useful when the start marker is itself the
/// first header label).
#[derive(Debug, Clone)]
pub struct SectionLocator {
    start_marker: String,
    end_marker: String,
    include_start: bool,
    include_end: bool,
}

impl SectionLocator {
    pub fn new(start_marker: &str, end_marker: &str) -> Self {
        Self {
            start_marker: start_marker.to_string(),
            end_marker: end_marker.to_string(),
            include_start: false,
            include_end: false,
        }
    }

    pub fn with_inclusivity(mut self, include_start: bool, include_end: bool) -> Self {
        self.include_start = include_start;
        self.include_end = include_end;
        self
    }

    /// Locates the section in `text`. The end marker is searched only after
    /// the first start marker; the result is trimmed of surrounding
    /// whitespace and may be empty.
    pub fn locate<'a>(&self, text: &'a str) -> Result<Section<'a>, ExtractError> {
        let start_pos = text.find(&self.start_marker).ok_or_else(|| {
            ExtractError::SectionNotFound(format!("start marker '{}' not in document", self.start_marker))
        })?;
        let after_start = start_pos + self.start_marker.len();

        let end_pos = text[after_start..]
            .find(&self.end_marker)
            .map(|offset| after_start + offset)
            .ok_or_else(|| {
                ExtractError::SectionNotFound(format!(
                    "end marker '{}' not found after start marker '{}'",
                    self.end_marker, self.start_marker
                ))
            })?;

        let raw_start = if self.include_start { start_pos } else { after_start };
        let raw_end = if self.include_end {
            end_pos + self.end_marker.len()
        } else {
            end_pos
        };

        let raw = &text[raw_start..raw_end];
        let leading = raw.len() - raw.trim_start().len();
        let trimmed = raw.trim();
        let start = raw_start + leading;

        tracing::trace!(
            "Located section [{}..{}] ({} bytes) between '{}' and '{}'",
            start,
            start + trimmed.len(),
            trimmed.len(),
            self.start_marker,
            self.end_marker
        );

        Ok(Section {
            start,
            end: start + trimmed.len(),
            text: trimmed,
        })
    }
}

/// Returns the trimmed text strictly between the first `start_marker` and
/// the first `end_marker` that follows it.
pub fn locate<'a>(text: &'a str, start_marker: &str, end_marker: &str) -> Result<Section<'a>, ExtractError> {
    SectionLocator::new(start_marker, end_marker).locate(text)
}
