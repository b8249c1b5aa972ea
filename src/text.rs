//! Column-aware text helpers for the renderer.
//!
//! All operations respect UTF-8 boundaries and display width so multi-byte
//! and double-width glyphs never get split mid-character.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Truncate to `max_cols` display columns, appending an ellipsis when
/// anything was cut.
pub fn ellipsize(s: &str, max_cols: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_cols {
        return s.to_string();
    }
    if max_cols <= 1 {
        return "…".to_string();
    }

    let mut out = String::new();
    let mut used = 0usize;
    for ch in s.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0).max(1);
        if used + w > max_cols - 1 {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

/// Greedy word wrap to `width` columns. Words longer than a full line are
/// split mid-word; existing newlines are respected.
pub fn wrap_columns(s: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for raw_line in s.split('\n') {
        let raw_line = raw_line.trim_end_matches('\r');
        if UnicodeWidthStr::width(raw_line) <= width {
            lines.push(raw_line.to_string());
            continue;
        }

        let mut current = String::new();
        let mut current_cols = 0usize;
        for word in raw_line.split(' ') {
            let word_cols = UnicodeWidthStr::width(word);
            let sep = usize::from(!current.is_empty());
            if current_cols + sep + word_cols <= width {
                if sep == 1 {
                    current.push(' ');
                }
                current.push_str(word);
                current_cols += sep + word_cols;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_cols = 0;
            }
            if word_cols <= width {
                current.push_str(word);
                current_cols = word_cols;
            } else {
                // A single oversized token gets hard-split.
                let mut cols = 0usize;
                for ch in word.chars() {
                    let w = UnicodeWidthChar::width(ch).unwrap_or(0).max(1);
                    if cols + w > width {
                        lines.push(std::mem::take(&mut current));
                        cols = 0;
                    }
                    current.push(ch);
                    cols += w;
                }
                current_cols = cols;
            }
        }
        lines.push(current);
    }

    lines
}
