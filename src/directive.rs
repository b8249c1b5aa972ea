//! In-band control-tag extraction for streamed assistant text.
//!
//! The chat backend embeds quick-reply directives directly in the token
//! stream as `[OPTIONS: a | b | ...]`. Extraction is a pure function of the
//! full accumulated buffer and is re-run from scratch at every chunk
//! boundary; a partial match in one chunk may be completed or invalidated by
//! the next, so there is deliberately no incremental parser here.

use regex::Regex;
use std::sync::OnceLock;

/// Phrase that arms the CPR pacing aid when it appears in a response.
pub const METRONOME_TRIGGER_PHRASE: &str = "starting metronome";

/// Result of scanning the accumulated response buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Buffer text with the matched directive substring removed.
    pub display: String,
    /// Options from the matched directive, or `None` when no directive (or
    /// an empty one) was found. `None` means "leave quick replies as-is".
    pub options: Option<Vec<String>>,
}

fn directive_regex() -> &'static Regex {
    static DIRECTIVE_RE: OnceLock<Regex> = OnceLock::new();
    DIRECTIVE_RE.get_or_init(|| {
        // Case-insensitive, dot-matches-newline. The closing bracket is
        // optional so a directive truncated mid-stream still matches to the
        // end of the buffer.
        Regex::new(r"(?is)\[\s*options\s*:?\s*(?P<body>.*?)(?:\]|\z)")
            .expect("directive pattern should compile")
    })
}

/// Scan `buffer` for the quick-reply directive.
///
/// Returns the display text (directive substring stripped) and the parsed
/// option list. Options are split on `|`, trimmed, stripped of embedded
/// newlines, de-duplicated by trimmed value, and kept in order. A match that
/// yields no valid options is still stripped from the display text but
/// reports `options: None` so stale quick replies are not cleared.
pub fn extract(buffer: &str) -> Extraction {
    let Some(caps) = directive_regex().captures(buffer) else {
        return Extraction {
            display: buffer.to_string(),
            options: None,
        };
    };

    let matched = caps.get(0).expect("group 0 always present");
    let body = caps.name("body").map(|m| m.as_str()).unwrap_or("");

    let mut options = Vec::new();
    for piece in body.split('|') {
        let cleaned: String = piece
            .chars()
            .filter(|c| *c != '\n' && *c != '\r')
            .collect::<String>()
            .trim()
            .to_string();
        if cleaned.is_empty() || options.contains(&cleaned) {
            continue;
        }
        options.push(cleaned);
    }

    let mut display = String::with_capacity(buffer.len() - matched.as_str().len());
    display.push_str(&buffer[..matched.start()]);
    display.push_str(&buffer[matched.end()..]);

    Extraction {
        display,
        options: if options.is_empty() {
            None
        } else {
            Some(options)
        },
    }
}

/// Case-insensitive search for the metronome trigger phrase. The caller is
/// responsible for the fire-at-most-once-per-session guarantee.
pub fn contains_metronome_trigger(buffer: &str) -> bool {
    buffer.to_lowercase().contains(METRONOME_TRIGGER_PHRASE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_directive_is_stripped_and_parsed() {
        let out = extract("[OPTIONS:Yes|No]");
        assert_eq!(out.display, "");
        assert_eq!(
            out.options,
            Some(vec!["Yes".to_string(), "No".to_string()])
        );
    }

    #[test]
    fn directive_keyword_is_case_insensitive() {
        let out = extract("Check this. [options: Left | Right]");
        assert_eq!(out.display, "Check this. ");
        assert_eq!(
            out.options,
            Some(vec!["Left".to_string(), "Right".to_string()])
        );
    }

    #[test]
    fn unterminated_directive_matches_to_end_of_buffer() {
        let out = extract("Let's check. [OPTIONS: Ye");
        assert_eq!(out.display, "Let's check. ");
        // "Ye" is a valid (if truncated) option at this point in the stream;
        // the next chunk's re-parse replaces it.
        assert_eq!(out.options, Some(vec!["Ye".to_string()]));
    }

    #[test]
    fn reparse_converges_once_closing_bracket_arrives() {
        let full = "Let's check. [OPTIONS: Yes | No]";
        let out = extract(full);
        assert_eq!(out.display, "Let's check. ");
        assert_eq!(
            out.options,
            Some(vec!["Yes".to_string(), "No".to_string()])
        );
    }

    #[test]
    fn non_directive_brackets_are_left_alone() {
        let out = extract("Dosage [see label] applies. [OPTIONS: Ok]");
        assert_eq!(out.display, "Dosage [see label] applies. ");
        assert_eq!(out.options, Some(vec!["Ok".to_string()]));
    }

    #[test]
    fn empty_directive_strips_but_reports_no_options() {
        let out = extract("Done. [OPTIONS: ]");
        assert_eq!(out.display, "Done. ");
        assert_eq!(out.options, None);
    }

    #[test]
    fn blank_pieces_are_discarded_and_duplicates_collapse() {
        let out = extract("[OPTIONS: Yes | | Yes |  No  ]");
        assert_eq!(
            out.options,
            Some(vec!["Yes".to_string(), "No".to_string()])
        );
    }

    #[test]
    fn embedded_newlines_inside_options_are_stripped() {
        let out = extract("[OPTIONS: Call\nfor help | Wait]");
        assert_eq!(
            out.options,
            Some(vec!["Callfor help".to_string(), "Wait".to_string()])
        );
        assert_eq!(out.display, "");
    }

    #[test]
    fn text_without_directive_passes_through() {
        let out = extract("Apply firm pressure to the wound.");
        assert_eq!(out.display, "Apply firm pressure to the wound.");
        assert_eq!(out.options, None);
    }

    #[test]
    fn trigger_phrase_is_found_case_insensitively() {
        assert!(contains_metronome_trigger("Starting Metronome now."));
        assert!(contains_metronome_trigger("ok. starting metronome"));
        assert!(!contains_metronome_trigger("starting metr"));
    }

    #[test]
    fn optional_colon_and_whitespace_are_tolerated() {
        let out = extract("[ OPTIONS   Yes | No ]");
        assert_eq!(
            out.options,
            Some(vec!["Yes".to_string(), "No".to_string()])
        );
    }
}
