//! Deterministic cleaning pipeline for message bodies.
//!
//! The order is fixed: choose a body (plain text preferred, HTML converted
//! otherwise), remove quote chains, strip signatures, normalize noise, then
//! derive a snippet. Every step is a bounded rule with a conservative
//! fallback that keeps the original text on evidence of over-stripping; the
//! goal is a low-noise corpus for grep and reading, not linguistic
//! perfection.

pub mod html;
pub mod noise;
pub mod quotes;
pub mod signature;

/// Maximum snippet length in characters.
pub const SNIPPET_MAX_CHARS: usize = 300;
/// A word-boundary cut must keep at least this share of the cap.
const SNIPPET_BOUNDARY_FLOOR: f64 = 0.70;

/// Output of the pipeline for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedBody {
    pub text: String,
    pub snippet: String,
}

/// Run the full pipeline over a message's bodies.
pub fn clean_message(text_body: Option<&str>, html_body: Option<&str>) -> CleanedBody {
    let base = match text_body {
        Some(t) if !t.trim().is_empty() => t.to_string(),
        _ => html_body.map(html::html_to_text).unwrap_or_default(),
    };

    let text = quotes::strip_quote_chains(&base);
    let text = signature::strip_signature(&text);
    let text = noise::normalize(&text);
    let snippet = snippet(&text, SNIPPET_MAX_CHARS);

    CleanedBody { text, snippet }
}

/// Collapse whitespace and truncate to `cap` characters at a word boundary,
/// appending an ellipsis when truncated.
pub fn snippet(text: &str, cap: usize) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= cap {
        return collapsed;
    }

    let hard_cut: String = collapsed.chars().take(cap).collect();
    let floor = (cap as f64 * SNIPPET_BOUNDARY_FLOOR) as usize;

    let cut = match hard_cut.rfind(' ') {
        Some(pos) if hard_cut[..pos].chars().count() >= floor => hard_cut[..pos].to_string(),
        _ => hard_cut,
    };

    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_plain_text_over_html() {
        let cleaned = clean_message(Some("plain wins"), Some("<p>html loses</p>"));
        assert_eq!(cleaned.text, "plain wins");
    }

    #[test]
    fn test_html_fallback() {
        let cleaned = clean_message(None, Some("<p>from html</p>"));
        assert_eq!(cleaned.text, "from html");
    }

    #[test]
    fn test_empty_message() {
        let cleaned = clean_message(None, None);
        assert_eq!(cleaned.text, "");
        assert_eq!(cleaned.snippet, "");
    }

    #[test]
    fn test_full_pipeline_quote_and_signature() {
        let body = "That sounds reasonable. Let's go with the revised numbers.\n\
\n\
Can we schedule a call Thursday to finalize?\n\
\n\
On Mon, Feb 17, 2026 at 9:30 AM You <you@gmail.com> wrote:\n\
> How about we split the implementation into two phases?\n\
> Phase 1 at $8K and Phase 2 at $5K?";

        let cleaned = clean_message(Some(body), None);
        assert!(cleaned.text.contains("That sounds reasonable"));
        assert!(cleaned.text.contains("schedule a call Thursday"));
        assert!(!cleaned.text.contains("How about we split"));
        assert!(cleaned.snippet.starts_with("That sounds reasonable"));
    }

    #[test]
    fn test_snippet_short_text_unchanged() {
        assert_eq!(snippet("short text", 300), "short text");
    }

    #[test]
    fn test_snippet_collapses_whitespace() {
        assert_eq!(snippet("a\n\nb\t c", 300), "a b c");
    }

    #[test]
    fn test_snippet_truncates_at_word_boundary() {
        let words = "word ".repeat(100);
        let snip = snippet(&words, 300);
        assert!(snip.ends_with('…'));
        let without_ellipsis = snip.trim_end_matches('…');
        assert!(without_ellipsis.chars().count() <= 300);
        assert!(!without_ellipsis.ends_with("wor"));
    }

    #[test]
    fn test_snippet_hard_cut_without_spaces() {
        let long = "x".repeat(400);
        let snip = snippet(&long, 300);
        assert!(snip.ends_with('…'));
        assert_eq!(snip.trim_end_matches('…').chars().count(), 300);
    }
}
