// src/utils/text_debug.rs
use std::fs;
use std::path::Path;

use crate::utils::error::AppError;

/// Writes `text` to `path` with every span in `highlights` wrapped in
/// `>>>[label]` ... `[/label]<<<` tags, so marker hits stand out in a plain
/// text viewer.
pub fn save_annotated_text(
    text: &str,
    path: &Path,
    highlights: &[(usize, usize, &str)],
) -> Result<(), AppError> {
    let mut sorted = highlights.to_vec();
    sorted.sort_by_key(|h| (h.0, h.1));

    let mut annotated = String::with_capacity(text.len() + sorted.len() * 24);
    let mut last_pos = 0;

    for (start, end, label) in sorted {
        // Overlapping hits are dropped, the earlier one already covers the text.
        if start < last_pos || end > text.len() {
            continue;
        }
        annotated.push_str(&text[last_pos..start]);
        annotated.push_str(&format!(">>>[{}]", label));
        annotated.push_str(&text[start..end]);
        annotated.push_str(&format!("[/{}]<<<", label));
        last_pos = end;
    }
    annotated.push_str(&text[last_pos..]);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, annotated)?;

    tracing::info!("Saved annotated debug text to {}", path.display());
    Ok(())
}

/// Annotates every literal occurrence of each `(needle, label)` pair.
pub fn create_debug_text(text: &str, path: &Path, needles: &[(&str, &str)]) -> Result<(), AppError> {
    let mut highlights = Vec::new();
    for (needle, label) in needles {
        if needle.is_empty() {
            continue;
        }
        for (start, matched) in text.match_indices(needle) {
            highlights.push((start, start + matched.len(), *label));
        }
    }
    save_annotated_text(text, path, &highlights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_each_marker_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug/2024-01-03.txt");
        let text = "header RICE body VEGETABLES tail";

        create_debug_text(text, &path, &[("RICE", "start"), ("VEGETABLES", "end")]).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "header >>>[start]RICE[/start]<<< body >>>[end]VEGETABLES[/end]<<< tail"
        );
    }

    #[test]
    fn missing_markers_leave_text_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");

        create_debug_text("no markers here", &path, &[("RICE", "start"), ("", "empty")]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "no markers here");
    }
}
