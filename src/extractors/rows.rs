// src/extractors/rows.rs
use std::collections::HashSet;
use std::iter::Enumerate;
use std::str::Lines;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ExtractionConfig;
use crate::extractors::columns::normalize_label;
use crate::utils::error::ExtractError;

// --- Regex Patterns (Lazy Static) ---
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").expect("Failed to compile WORD_RE"));

// Prices as printed: "185", "185.00", "1,250.50", optionally signed.
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-+]?(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?$").expect("Failed to compile NUMERIC_RE")
});

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{4}[-/.]\d{1,2}[-/.]\d{1,2}|\d{1,2}[-/.]\d{1,2}[-/.]\d{4})$")
        .expect("Failed to compile DATE_RE")
});

pub fn is_numeric_token(token: &str) -> bool {
    NUMERIC_RE.is_match(token.trim())
}

pub fn is_date_token(token: &str) -> bool {
    DATE_RE.is_match(token.trim())
}

// --- Data Structures ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCell {
    pub text: String,
    /// Left-to-right index of the cell on its line.
    pub position: usize,
}

/// One physical line split into cells, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based line number within the section body.
    pub line_number: usize,
    pub cells: Vec<RawCell>,
}

impl RawRow {
    pub fn cell_at(&self, position: usize) -> Option<&RawCell> {
        self.cells.iter().find(|c| c.position == position)
    }

    pub fn texts(&self) -> Vec<&str> {
        self.cells.iter().map(|c| c.text.as_str()).collect()
    }
}

/// A body line that could not be turned into a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedLine {
    pub line_number: usize,
    pub text: String,
}

// --- Cell splitting ---

/// Splits a line at column gaps: tabs, `|`, or runs of at least
/// `min_gap_width` spaces.
#[derive(Debug, Clone)]
pub struct CellSplitter {
    gap: Regex,
}

impl CellSplitter {
    pub fn new(min_gap_width: usize) -> Result<Self, ExtractError> {
        let pattern = format!(r"\t+| *\| *| {{{},}}", min_gap_width.max(1));
        let gap = Regex::new(&pattern)
            .map_err(|e| ExtractError::InvalidConfig(format!("bad gap pattern '{}': {}", pattern, e)))?;
        Ok(Self { gap })
    }

    /// Returns `(byte offset, chunk)` pairs with surrounding spaces removed.
    pub fn split<'a>(&self, line: &'a str) -> Vec<(usize, &'a str)> {
        let mut chunks = Vec::new();
        let mut last = 0;
        for gap in self.gap.find_iter(line) {
            push_chunk(&mut chunks, line, last, gap.start());
            last = gap.end();
        }
        push_chunk(&mut chunks, line, last, line.len());
        chunks
    }
}

fn push_chunk<'a>(chunks: &mut Vec<(usize, &'a str)>, line: &'a str, start: usize, end: usize) {
    let raw = &line[start..end];
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        let leading = raw.len() - raw.trim_start().len();
        chunks.push((start + leading, trimmed));
    }
}

// --- Row parser ---

/// Splits a section body into rows of cells using layout cues.
///
/// Gap splitting separates columns; inside a chunk, every price, date,
/// missing token or unit word becomes its own cell while runs of other
/// words stay together as one label ("Kekulu White 180.00" is two cells).
#[derive(Debug, Clone)]
pub struct RowParser {
    splitter: CellSplitter,
    skip_patterns: Vec<Regex>,
    missing_tokens: HashSet<String>,
    unit_qualifiers: HashSet<String>,
}

impl RowParser {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let skip_patterns = config
            .skip_line_patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| ExtractError::InvalidConfig(format!("bad skip pattern '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            splitter: CellSplitter::new(config.min_gap_width)?,
            skip_patterns,
            missing_tokens: config
                .missing_tokens
                .iter()
                .map(|t| t.trim().to_lowercase())
                .collect(),
            unit_qualifiers: config.unit_qualifiers.iter().map(|q| normalize_label(q)).collect(),
        })
    }

    pub fn splitter(&self) -> &CellSplitter {
        &self.splitter
    }

    /// Blank lines and configured footer/continuation lines.
    pub fn is_skipped(&self, line: &str) -> bool {
        let trimmed = line.trim();
        trimmed.is_empty() || self.skip_patterns.iter().any(|re| re.is_match(trimmed))
    }

    /// Lines with no letters or digits at all (rules, dots, stray symbols).
    pub fn is_noise(&self, line: &str) -> bool {
        !line.chars().any(char::is_alphanumeric)
    }

    fn is_missing_token(&self, token: &str) -> bool {
        self.missing_tokens.contains(&token.trim().to_lowercase())
    }

    fn is_standalone(&self, word: &str) -> bool {
        is_numeric_token(word)
            || is_date_token(word)
            || self.is_missing_token(word)
            || self.unit_qualifiers.contains(&normalize_label(word))
    }

    /// A line is data (not header) when it carries a price, starts with a
    /// date, or has a "no data" token after its first cell (a row whose
    /// prices were all unpublished).
    pub fn is_data_line(&self, line: &str) -> bool {
        let cells = self.split_cells(line);
        cells.first().map(|c| is_date_token(&c.text)).unwrap_or(false)
            || cells.iter().any(|c| is_numeric_token(&c.text))
            || cells.iter().skip(1).any(|c| self.is_missing_token(&c.text))
    }

    /// Splits a section into its header lines and the body that follows.
    /// Header lines are the retained lines before the first data line.
    pub fn split_header<'a>(&self, section_text: &'a str) -> (Vec<&'a str>, &'a str) {
        let mut header = Vec::new();
        let mut offset = 0;
        for line in section_text.split_inclusive('\n') {
            let content = line.trim_end_matches(['\n', '\r']);
            if !self.is_skipped(content) && !self.is_noise(content) {
                if self.is_data_line(content) {
                    return (header, &section_text[offset..]);
                }
                header.push(content);
            }
            offset += line.len();
        }
        (header, "")
    }

    /// Splits one line into cells. Empty for blank or noise-only lines.
    pub fn split_cells(&self, line: &str) -> Vec<RawCell> {
        let mut cells: Vec<RawCell> = Vec::new();

        for (_, chunk) in self.splitter.split(line) {
            let mut group: Option<(usize, usize)> = None;

            for word in WORD_RE.find_iter(chunk) {
                if self.is_standalone(word.as_str()) {
                    if let Some((start, end)) = group.take() {
                        push_cell(&mut cells, &chunk[start..end]);
                    }
                    push_cell(&mut cells, word.as_str());
                } else {
                    group = Some(match group {
                        Some((start, _)) => (start, word.end()),
                        None => (word.start(), word.end()),
                    });
                }
            }
            if let Some((start, end)) = group {
                push_cell(&mut cells, &chunk[start..end]);
            }
        }

        cells
    }

    /// Lazily parses the body into rows. The returned iterator can be cloned
    /// to restart from the beginning; noise lines come out as `Err`.
    pub fn parse_rows<'a>(&'a self, section_text: &'a str) -> RawRows<'a> {
        RawRows {
            parser: self,
            lines: section_text.lines().enumerate(),
        }
    }
}

fn push_cell(cells: &mut Vec<RawCell>, text: &str) {
    let position = cells.len();
    cells.push(RawCell {
        text: text.to_string(),
        position,
    });
}

#[derive(Debug, Clone)]
pub struct RawRows<'a> {
    parser: &'a RowParser,
    lines: Enumerate<Lines<'a>>,
}

impl<'a> Iterator for RawRows<'a> {
    type Item = Result<RawRow, DroppedLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, line) = self.lines.next()?;
            if self.parser.is_skipped(line) {
                continue;
            }

            let cells = if self.parser.is_noise(line) {
                Vec::new()
            } else {
                self.parser.split_cells(line)
            };

            if cells.is_empty() {
                return Some(Err(DroppedLine {
                    line_number: index + 1,
                    text: line.trim().to_string(),
                }));
            }

            return Some(Ok(RawRow {
                line_number: index + 1,
                cells,
            }));
        }
    }
}
