// src/extractors/document.rs
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use sha2::{Digest, Sha256};

use crate::config::ExtractionConfig;
use crate::extractors::columns::{ColumnSchemaInferer, InferredLayout, Vocabulary};
use crate::extractors::models::{
    CanonicalSchema, ColumnOrderMap, Diagnostic, DiagnosticKind, DocumentFailure, DocumentRecord, DocumentStage,
    SchemaColumn,
};
use crate::extractors::reconcile::{RowIssue, SchemaReconciler};
use crate::extractors::rows::RowParser;
use crate::extractors::section::SectionLocator;
use crate::reports::{ReportDocument, TextSource};
use crate::utils::error::ExtractError;
use crate::utils::text_debug;

// --- Layout fingerprint & schema cache ---

/// Identifies a report template by its header lines. Trailing whitespace is
/// ignored; alignment inside the line is not, since header merging depends
/// on it.
pub fn layout_fingerprint(header_lines: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for line in header_lines {
        hasher.update(line.trim_end().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Inferred layouts keyed by fingerprint, shared by all document tasks of a
/// batch run. Read-through and write-once per fingerprint: when two tasks
/// infer the same layout concurrently, the first insert wins and both get
/// the stored value.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<String, Arc<InferredLayout>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_try_insert_with<F>(&self, fingerprint: &str, infer: F) -> Result<Arc<InferredLayout>, ExtractError>
    where
        F: FnOnce() -> Result<InferredLayout, ExtractError>,
    {
        let cached = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fingerprint)
            .cloned();
        if let Some(layout) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(layout);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        // Inference runs outside the lock; failures are never cached.
        let layout = Arc::new(infer()?);

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(
            entries.entry(fingerprint.to_string()).or_insert(layout),
        ))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (usize, usize) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}

// --- Document extractor ---

/// Runs locate, header inference, row parsing and reconciliation for one
/// report.
pub struct DocumentExtractor {
    config: Arc<ExtractionConfig>,
    locator: SectionLocator,
    vocabulary: Vocabulary,
    rows: RowParser,
    reconciler: SchemaReconciler,
    cache: Arc<SchemaCache>,
    source: Arc<dyn TextSource>,
    debug_dir: Option<PathBuf>,
}

impl DocumentExtractor {
    pub fn new(
        config: Arc<ExtractionConfig>,
        cache: Arc<SchemaCache>,
        source: Arc<dyn TextSource>,
    ) -> Result<Self, ExtractError> {
        let locator = SectionLocator::new(&config.start_marker, &config.end_marker)
            .with_inclusivity(config.include_start_marker, config.include_end_marker);
        let vocabulary = Vocabulary::from_config(&config)?;
        let rows = RowParser::new(&config)?;
        let reconciler = SchemaReconciler::new(&config.missing_tokens);

        Ok(Self {
            config,
            locator,
            vocabulary,
            rows,
            reconciler,
            cache,
            source,
            debug_dir: None,
        })
    }

    /// Failed documents get an annotated text dump under `dir`.
    pub fn with_debug_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.debug_dir = dir;
        self
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    /// Reads one report file and extracts it.
    pub fn extract_file(&self, path: &Path) -> Result<DocumentRecord, DocumentFailure> {
        let fallback_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let document = ReportDocument::from_path(path)
            .map_err(|e| DocumentFailure::new(&fallback_id, DocumentStage::Pending, &e))?;

        let text = self
            .source
            .extract_text(path)
            .map_err(|e| DocumentFailure::new(&document.id, DocumentStage::Pending, &e))?;

        let result = self.extract_text(&document, &text);
        if let (Err(_), Some(dir)) = (&result, &self.debug_dir) {
            self.dump_debug_text(dir, &document, &text);
        }
        result
    }

    /// Extracts an already loaded report text.
    pub fn extract_text(&self, document: &ReportDocument, text: &str) -> Result<DocumentRecord, DocumentFailure> {
        let fail = |stage: DocumentStage, error: ExtractError| DocumentFailure::new(&document.id, stage, &error);

        let section = self
            .locator
            .locate(text)
            .map_err(|e| fail(DocumentStage::TextLoaded, e))?;
        tracing::trace!("[{}] section spans bytes {}..{}", document.id, section.start, section.end);

        let (header_lines, body) = self.rows.split_header(restore_indent(text, section.start, section.text));
        let mut diagnostics = Vec::new();

        let (fingerprint, layout) = if section.is_empty() {
            // Adjacent markers: a valid, empty table with only the date column.
            let layout = self.empty_layout().map_err(|e| fail(DocumentStage::Located, e))?;
            (layout_fingerprint(&[]), Arc::new(layout))
        } else {
            let fingerprint = layout_fingerprint(&header_lines);
            let layout = self
                .cache
                .get_or_try_insert_with(&fingerprint, || {
                    ColumnSchemaInferer::new(&self.vocabulary, self.rows.splitter()).infer_layout(&header_lines)
                })
                .map_err(|e| fail(DocumentStage::Located, e))?;
            (fingerprint, layout)
        };

        tracing::trace!(
            "[{}] reached {:?} with layout {}",
            document.id,
            DocumentStage::Header,
            fingerprint
        );

        for column in &layout.repeated {
            diagnostics.push(Diagnostic {
                document: document.id.clone(),
                line: None,
                kind: DiagnosticKind::RepeatedColumn,
                detail: format!("column '{}' printed more than once; later copies ignored", column),
            });
        }

        let mut raw_rows = Vec::new();
        for parsed in self.rows.parse_rows(body) {
            match parsed {
                Ok(row) => raw_rows.push(row),
                Err(dropped) => diagnostics.push(Diagnostic {
                    document: document.id.clone(),
                    line: Some(dropped.line_number),
                    kind: DiagnosticKind::NoiseLine,
                    detail: format!("dropped untokenizable line '{}'", dropped.text),
                }),
            }
        }
        tracing::trace!(
            "[{}] reached {:?} with {} rows",
            document.id,
            DocumentStage::RowsParsed,
            raw_rows.len()
        );

        let mut rows = Vec::with_capacity(raw_rows.len());
        for raw in &raw_rows {
            let reconciled = self
                .reconciler
                .reconcile(raw, &layout.schema, &layout.order, Some(document.date));
            for issue in reconciled.issues {
                diagnostics.push(issue_diagnostic(&document.id, raw.line_number, issue));
            }
            rows.push(reconciled.row);
        }
        tracing::trace!("[{}] reached {:?}", document.id, DocumentStage::Reconciled);

        for diagnostic in &diagnostics {
            tracing::debug!(
                "[{}] {:?} (line {:?}): {}",
                diagnostic.document,
                diagnostic.kind,
                diagnostic.line,
                diagnostic.detail
            );
        }
        tracing::debug!(
            "[{}] {:?}: {} rows, {} diagnostics, schema {:?}",
            document.id,
            DocumentStage::Done,
            rows.len(),
            diagnostics.len(),
            layout.schema.names()
        );

        Ok(DocumentRecord {
            document_id: document.id.clone(),
            date: document.date,
            fingerprint,
            schema: Arc::clone(&layout.schema),
            rows,
            diagnostics,
        })
    }

    fn empty_layout(&self) -> Result<InferredLayout, ExtractError> {
        let date = self.vocabulary.date_column();
        let schema = CanonicalSchema::new(vec![SchemaColumn {
            name: date.name.clone(),
            kind: date.kind,
        }])?;
        Ok(InferredLayout {
            schema: Arc::new(schema),
            order: ColumnOrderMap::new(vec![None]),
            repeated: Vec::new(),
        })
    }

    fn dump_debug_text(&self, dir: &Path, document: &ReportDocument, text: &str) {
        let path = dir.join(format!("{}.txt", document.id));
        let needles = [
            (self.config.start_marker.as_str(), "start"),
            (self.config.end_marker.as_str(), "end"),
        ];
        if let Err(e) = text_debug::create_debug_text(text, &path, &needles) {
            tracing::warn!("[{}] failed to write debug text: {}", document.id, e);
        }
    }
}

/// Section trimming strips the indentation of the first header line, which
/// group titles need for alignment. Put it back when the section starts on
/// its own line.
fn restore_indent<'a>(text: &'a str, start: usize, section: &'a str) -> &'a str {
    if section.is_empty() {
        return section;
    }
    let line_start = text[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let indent = &text[line_start..start];
    if indent.chars().all(|c| c == ' ' || c == '\t') {
        &text[line_start..start + section.len()]
    } else {
        section
    }
}

fn issue_diagnostic(document: &str, line: usize, issue: RowIssue) -> Diagnostic {
    let (kind, detail) = match issue {
        RowIssue::TooShort { expected, found } => (
            DiagnosticKind::RowTooShort,
            format!("{} of {} cells present; absent columns set to missing", found, expected),
        ),
        RowIssue::TooLong {
            expected,
            found,
            ignored,
        } => (
            DiagnosticKind::RowTooLong,
            format!("{} cells for {} columns; ignored {:?}", found, expected, ignored),
        ),
        RowIssue::NeedsReview { column, raw } => (
            DiagnosticKind::NeedsReview,
            format!("kept '{}' as text in column '{}'", raw, column),
        ),
    };
    Diagnostic {
        document: document.to_string(),
        line: Some(line),
        kind,
        detail,
    }
}
