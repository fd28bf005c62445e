//! Quote-chain removal.

use once_cell::sync::Lazy;
use regex::Regex;

/// Inputs shorter than this are never subjected to the conservative
/// fallback check.
const FALLBACK_INPUT_FLOOR: usize = 50;
/// If removal leaves fewer characters than this, fall back to the original.
const FALLBACK_RESULT_FLOOR: usize = 10;

static ATTRIBUTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^On\b.{0,200}wrote:\s*$").unwrap());
static ATTRIBUTION_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^On\b.{0,200}$").unwrap());
static ORIGINAL_MESSAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^-{2,}\s*Original Message\s*-{2,}\s*$").unwrap());

/// Remove quoted reply material from a message body.
///
/// Drops `On <date>, <name> wrote:` attribution lines (including the wrapped
/// two-line form), everything from `-----Original Message-----` down, and
/// any line prefixed with `>`. Falls back to the original text when removal
/// leaves almost nothing of a non-trivial input.
pub fn strip_quote_chains(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());

    let mut i = 0;
    while i < lines.len() {
        let trimmed = lines[i].trim();

        if ORIGINAL_MESSAGE_RE.is_match(trimmed) {
            break;
        }

        if ATTRIBUTION_RE.is_match(trimmed) {
            i += 1;
            continue;
        }

        // Wrapped attribution: "On Mon, Feb 17, 2026 at 9:30 AM" /
        // "Someone <someone@host> wrote:".
        if ATTRIBUTION_START_RE.is_match(trimmed) && !trimmed.ends_with(':') {
            if let Some(next) = lines.get(i + 1) {
                if next.trim().to_lowercase().ends_with("wrote:") {
                    i += 2;
                    continue;
                }
            }
        }

        if trimmed.starts_with('>') {
            i += 1;
            continue;
        }

        kept.push(lines[i]);
        i += 1;
    }

    let result = kept.join("\n").trim().to_string();

    if result.len() < FALLBACK_RESULT_FLOOR && input.trim().len() >= FALLBACK_INPUT_FLOOR {
        return input.to_string();
    }
    result
}
