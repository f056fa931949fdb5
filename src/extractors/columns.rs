// src/extractors/columns.rs
//! Header inference: turns the noisy header text of a report section into
//! a canonical schema plus the physical position of each column.
//!
//! Matching is driven by an explicit synonym table built from the
//! controlled vocabulary and a pure [`normalize_label`] function, so that
//! "Nadu (Rs/Kg)", "NADU rs./kg" and "nadu" all land on the same column.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{ColumnDefinition, ColumnKind, ExtractionConfig};
use crate::extractors::models::{CanonicalSchema, ColumnOrderMap, SchemaColumn};
use crate::extractors::rows::CellSplitter;
use crate::utils::error::ExtractError;

/// Anything that is not a letter, digit or whitespace.
static PUNCTUATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("Failed to compile PUNCTUATION_RE"));

/// Header cells on different lines may be off by a couple of characters.
const ALIGN_TOLERANCE: usize = 2;

/// Normalizes a header label for comparison: lowercase, punctuation
/// replaced by spaces, whitespace collapsed. `"Rs./Kg"` and `"rs/kg"` both
/// become `"rs kg"`.
pub fn normalize_label(label: &str) -> String {
    let lower = label.to_lowercase();
    let no_punct = PUNCTUATION_RE.replace_all(&lower, " ");
    no_punct.split_whitespace().collect::<Vec<_>>().join(" ")
}

// --- Vocabulary ---

/// Synonym table over the controlled vocabulary.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    columns: Vec<ColumnDefinition>,
    index: HashMap<String, usize>,
    /// Normalized unit qualifiers, longest first.
    qualifiers: Vec<String>,
    date_index: usize,
    /// Longest word span a single header label can cover.
    max_span: usize,
}

impl Vocabulary {
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        config.validate()?;

        let mut index = HashMap::new();
        for (i, column) in config.vocabulary.iter().enumerate() {
            for spelling in std::iter::once(&column.name).chain(column.synonyms.iter()) {
                let normalized = normalize_label(spelling);
                if !normalized.is_empty() {
                    index.insert(normalized, i);
                }
            }
        }

        let mut qualifiers: Vec<String> = config
            .unit_qualifiers
            .iter()
            .map(|q| normalize_label(q))
            .filter(|q| !q.is_empty())
            .collect();
        qualifiers.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        qualifiers.dedup();

        let words = |s: &String| s.split_whitespace().count();
        let max_span = index.keys().map(words).max().unwrap_or(1)
            + qualifiers.iter().map(words).max().unwrap_or(0);

        // validate() guarantees exactly one date column.
        let date_index = config
            .vocabulary
            .iter()
            .position(|c| c.kind == ColumnKind::Date)
            .unwrap_or(0);

        Ok(Self {
            columns: config.vocabulary.clone(),
            index,
            qualifiers,
            date_index,
            max_span,
        })
    }

    /// Resolves a raw header label to its vocabulary entry. Exact
    /// normalized match first, then with a trailing unit qualifier removed.
    pub fn resolve(&self, label: &str) -> Option<&ColumnDefinition> {
        let normalized = normalize_label(label);
        if normalized.is_empty() {
            return None;
        }
        if let Some(&i) = self.index.get(&normalized) {
            return Some(&self.columns[i]);
        }
        self.qualifiers.iter().find_map(|q| {
            let stem = normalized.strip_suffix(q.as_str())?.strip_suffix(' ')?;
            self.index.get(stem).map(|&i| &self.columns[i])
        })
    }

    pub fn date_column(&self) -> &ColumnDefinition {
        &self.columns[self.date_index]
    }

    /// Position of a canonical name in the vocabulary; fixes output column order.
    pub fn rank(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// True when `text` is nothing but a unit qualifier, e.g. "(Rs/Kg)".
    pub fn is_qualifier(&self, text: &str) -> bool {
        let normalized = normalize_label(text);
        self.qualifiers.iter().any(|q| *q == normalized)
    }
}

// --- Inference ---

/// Result of inferring one header layout.
#[derive(Debug, Clone)]
pub struct InferredLayout {
    pub schema: Arc<CanonicalSchema>,
    pub order: ColumnOrderMap,
    /// Columns printed more than once under the same label; later copies
    /// are ignored.
    pub repeated: Vec<String>,
}

pub struct ColumnSchemaInferer<'a> {
    vocabulary: &'a Vocabulary,
    splitter: &'a CellSplitter,
}

impl<'a> ColumnSchemaInferer<'a> {
    pub fn new(vocabulary: &'a Vocabulary, splitter: &'a CellSplitter) -> Self {
        Self { vocabulary, splitter }
    }

    /// Infers the canonical schema of a header. Deterministic: the same
    /// header text always yields the same schema.
    pub fn infer(&self, header_lines: &[&str]) -> Result<CanonicalSchema, ExtractError> {
        self.infer_layout(header_lines)
            .map(|layout| layout.schema.as_ref().clone())
    }

    /// Infers the schema together with the physical position of every
    /// column, which is what row reconciliation needs.
    pub fn infer_layout(&self, header_lines: &[&str]) -> Result<InferredLayout, ExtractError> {
        let labels = self.merge_header_lines(header_lines);
        if labels.is_empty() {
            return Err(ExtractError::HeaderNotFound);
        }
        let header_text = header_lines.join(" / ");

        // A gap-separated header has one physical column per label, so a
        // label may only be split into several columns when the whole
        // header is a single run of single-spaced words.
        let single_spaced = labels.len() == 1;

        // (physical position, raw label, vocabulary entry)
        let mut resolved: Vec<(usize, String, &ColumnDefinition)> = Vec::new();
        for label in &labels {
            for (text, column) in self.resolve_label(label, single_spaced, &header_text)? {
                resolved.push((resolved.len(), text, column));
            }
        }

        let date = self.vocabulary.date_column();
        let mut columns = vec![SchemaColumn {
            name: date.name.clone(),
            kind: date.kind,
        }];
        let mut first_labels: Vec<Option<String>> = vec![None];
        let mut positions: Vec<Option<usize>> = vec![None];
        let mut repeated = Vec::new();

        for (position, text, column) in resolved {
            let existing = columns.iter().position(|c| c.name == column.name);
            match existing {
                Some(i) if first_labels[i].is_none() => {
                    // Only the date column can be present without a label.
                    first_labels[i] = Some(text);
                    positions[i] = Some(position);
                }
                Some(i) => {
                    let first = first_labels[i].clone().unwrap_or_default();
                    if normalize_label(&first) == normalize_label(&text) {
                        tracing::debug!(
                            "Column '{}' repeated at position {}; keeping the first copy",
                            column.name,
                            position
                        );
                        repeated.push(column.name.clone());
                    } else {
                        return Err(ExtractError::DuplicateColumn {
                            column: column.name.clone(),
                            first,
                            second: text,
                        });
                    }
                }
                None => {
                    columns.push(SchemaColumn {
                        name: column.name.clone(),
                        kind: column.kind,
                    });
                    first_labels.push(Some(text));
                    positions.push(Some(position));
                }
            }
        }

        let schema = CanonicalSchema::new(columns)?;
        tracing::debug!("Inferred schema {:?} from header '{}'", schema.names(), header_text);

        Ok(InferredLayout {
            schema: Arc::new(schema),
            order: ColumnOrderMap::new(positions),
            repeated,
        })
    }

    /// Recombines a multi-line header into one label per column.
    ///
    /// The line with the most cells is the primary line. Cells on lines
    /// above it are group titles and prefix every primary cell that starts
    /// within their span; cells on lines below are wrapped continuations and
    /// suffix the primary cell they sit under. A unit qualifier printed
    /// above a column ("Rs/Kg") is not a group title and is left out.
    fn merge_header_lines(&self, header_lines: &[&str]) -> Vec<String> {
        let tokenized: Vec<Vec<(usize, &str)>> = header_lines
            .iter()
            .map(|line| self.splitter.split(line))
            .filter(|cells| !cells.is_empty())
            .collect();

        let Some(primary_index) = tokenized
            .iter()
            .enumerate()
            .fold(None::<(usize, usize)>, |best, (i, cells)| match best {
                Some((_, n)) if n >= cells.len() => best,
                _ => Some((i, cells.len())),
            })
            .map(|(i, _)| i)
        else {
            return Vec::new();
        };

        let primary = &tokenized[primary_index];
        let mut prefixes: Vec<Vec<&str>> = vec![Vec::new(); primary.len()];
        let mut suffixes: Vec<Vec<&str>> = vec![Vec::new(); primary.len()];

        for (line_index, cells) in tokenized.iter().enumerate() {
            if line_index < primary_index {
                for (slot, (start, _)) in primary.iter().enumerate() {
                    let owner = cells.iter().rev().find(|(o, _)| *o <= start + ALIGN_TOLERANCE);
                    if let Some((_, title)) = owner {
                        if !self.vocabulary.is_qualifier(title) {
                            prefixes[slot].push(title);
                        }
                    }
                }
            } else if line_index > primary_index {
                for (offset, text) in cells {
                    let slot = primary
                        .iter()
                        .rposition(|(start, _)| *start <= offset + ALIGN_TOLERANCE)
                        .unwrap_or(0);
                    suffixes[slot].push(text);
                }
            }
        }

        primary
            .iter()
            .enumerate()
            .map(|(slot, (_, text))| {
                prefixes[slot]
                    .iter()
                    .copied()
                    .chain(std::iter::once(*text))
                    .chain(suffixes[slot].iter().copied())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }

    /// Resolves one merged label. With `segment` set, a label that is not a
    /// vocabulary entry as a whole is split greedily into the longest
    /// resolvable word runs, which handles headers printed with single
    /// spaces between columns. Without it the label must resolve as a whole.
    fn resolve_label(
        &self,
        label: &str,
        segment: bool,
        header_text: &str,
    ) -> Result<Vec<(String, &'a ColumnDefinition)>, ExtractError> {
        let vocabulary: &'a Vocabulary = self.vocabulary;
        if let Some(column) = vocabulary.resolve(label) {
            return Ok(vec![(label.to_string(), column)]);
        }
        if !segment {
            tracing::error!("Unknown column label '{}' in header '{}'", label, header_text);
            return Err(ExtractError::UnknownColumn {
                label: label.to_string(),
                header: header_text.to_string(),
            });
        }

        let words: Vec<&str> = label.split_whitespace().collect();
        let mut segments = Vec::new();
        let mut i = 0;
        while i < words.len() {
            let longest = vocabulary.max_span.min(words.len() - i);
            let hit = (1..=longest).rev().find_map(|span| {
                let candidate = words[i..i + span].join(" ");
                vocabulary
                    .resolve(&candidate)
                    .map(|column| (candidate, column, span))
            });
            match hit {
                Some((candidate, column, span)) => {
                    segments.push((candidate, column));
                    i += span;
                }
                None => {
                    let offending = words[i..].join(" ");
                    tracing::error!(
                        "Unknown column label '{}' in header '{}'",
                        offending,
                        header_text
                    );
                    return Err(ExtractError::UnknownColumn {
                        label: offending,
                        header: header_text.to_string(),
                    });
                }
            }
        }
        Ok(segments)
    }
}
