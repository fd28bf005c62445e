//! Signature stripping.

use once_cell::sync::Lazy;
use regex::Regex;

const FALLBACK_INPUT_FLOOR: usize = 50;
/// If stripping removes more than this share of the input, keep the
/// original.
const FALLBACK_MAX_REMOVED: f64 = 0.80;

static SENT_FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^Sent from (my )?(iPhone|iPad|Android|Galaxy|Samsung|Pixel|BlackBerry|Windows Phone|mobile( device)?)\b",
    )
    .unwrap()
});
static OUTLOOK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^Get Outlook for\b").unwrap());
static LEGAL_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"CONFIDENTIAL|DISCLAIMER|PRIVILEGED|LEGAL NOTICE|INTENDED RECIPIENT").unwrap()
});

/// Cut the body at the first signature marker.
///
/// Markers: a delimiter line (`--` or `__`), mobile-client taglines,
/// Outlook promo lines, and long all-caps legal headers. If the cut would
/// remove more than 80% of a non-trivial input, the original is kept.
pub fn strip_signature(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut cut_at: Option<usize> = None;

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed == "--" || trimmed == "__" {
            cut_at = Some(i);
            break;
        }
        if SENT_FROM_RE.is_match(trimmed) || OUTLOOK_RE.is_match(trimmed) {
            cut_at = Some(i);
            break;
        }
        if is_legal_header(trimmed) {
            cut_at = Some(i);
            break;
        }
    }

    let Some(cut) = cut_at else {
        return input.to_string();
    };

    let result = lines[..cut].join("\n").trim_end().to_string();

    let input_len = input.trim().len();
    if input_len >= FALLBACK_INPUT_FLOOR {
        let removed = input_len.saturating_sub(result.trim().len()) as f64;
        if removed / input_len as f64 > FALLBACK_MAX_REMOVED {
            return input.to_string();
        }
    }
    result
}

/// A long, mostly-uppercase line carrying legal boilerplate keywords.
fn is_legal_header(line: &str) -> bool {
    if line.len() < 40 || !LEGAL_KEYWORD_RE.is_match(line) {
        return false;
    }
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return false;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper as f64 / letters.len() as f64 >= 0.9
}
