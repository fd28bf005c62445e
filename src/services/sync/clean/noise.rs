//! Noise normalization: unicode cleanup, image junk, oversized URLs,
//! tracking parameters, and trailing footers.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// URLs longer than this are shortened to `origin/<first-path>/...`.
const URL_SHORTEN_THRESHOLD: usize = 150;
/// Footer-boundary scan starts this far into the body.
const FOOTER_SCAN_START: f64 = 0.40;
/// A boundary cut must preserve at least this share of the text.
const FOOTER_MIN_KEPT: f64 = 0.20;

/// Query parameters recognized as tracking noise.
const TRACKING_PARAMS: &[&str] = &[
    "correlation_id",
    "ref_campaign",
    "ref_source",
    "token",
    "auto_token",
    "ct",
    "ec",
];

static IMAGE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\[(image|cid|inline image)[^\]]*\]$").unwrap());
static IMAGE_URL_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://\S+\.(png|jpe?g|gif|webp|svg|bmp)(\?\S*)?$").unwrap()
});
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s<>()\[\]]+").unwrap());
static MANY_NEWLINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

static FOOTER_BOUNDARY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^\s*(unsubscribe|manage (your )?preferences|update your preferences|email preferences|you are receiving this (e-?mail|message)|view (this email|it) in your browser|if you no longer wish to receive)",
    )
    .unwrap()
});

static FOOTER_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(unsubscribe\b.*|manage (your )?preferences.*|privacy policy.*|terms (of (service|use))?.*|all rights reserved.*|©.{0,80}|\(c\) \d{4}.{0,80}|sent with \w+.*|powered by \w+.*|\d{1,5} [\w .]+,\s*[\w .]+,?\s*[A-Z]{2} \d{5}.*)\s*$",
    )
    .unwrap()
});

/// Run the full normalization pass.
pub fn normalize(input: &str) -> String {
    let text: String = input.nfc().collect();
    let text = straighten_quotes(&text);
    let text = drop_image_lines(&text);
    let text = rewrite_urls(&text);
    let text = strip_footer(&text);
    let text = MANY_NEWLINES_RE.replace_all(&text, "\n\n").into_owned();
    text.trim().to_string()
}

fn straighten_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => '"',
            c => c,
        })
        .collect()
}

/// Remove lines that carry only an image reference.
fn drop_image_lines(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim();
            !(IMAGE_LINE_RE.is_match(trimmed) || IMAGE_URL_LINE_RE.is_match(trimmed))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip tracking query parameters everywhere and shorten very long URLs.
fn rewrite_urls(text: &str) -> String {
    URL_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let url = caps.get(0).map_or("", |m| m.as_str());
            let cleaned = strip_tracking_params(url);
            if cleaned.len() > URL_SHORTEN_THRESHOLD {
                shorten_url(&cleaned)
            } else {
                cleaned
            }
        })
        .into_owned()
}

fn strip_tracking_params(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    // A fragment rides along with the query when both are present.
    let (query, fragment) = match query.split_once('#') {
        Some((q, f)) => (q, Some(f)),
        None => (query, None),
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or("").to_ascii_lowercase();
            !(key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str()))
        })
        .collect();

    let mut out = base.to_string();
    if !kept.is_empty() {
        out.push('?');
        out.push_str(&kept.join("&"));
    }
    if let Some(f) = fragment {
        out.push('#');
        out.push_str(f);
    }
    out
}

/// Reduce an oversized URL to `scheme://host/<first-path-segment>/...`.
fn shorten_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let after_scheme = &url[scheme_end + 3..];
    let host_end = after_scheme.find('/').unwrap_or(after_scheme.len());
    let origin = &url[..scheme_end + 3 + host_end];

    let path = &after_scheme[host_end..];
    let first_segment = path
        .trim_start_matches('/')
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("");

    if first_segment.is_empty() {
        format!("{}/...", origin)
    } else {
        format!("{}/{}/...", origin, first_segment)
    }
}

/// Remove a trailing footer region using the two strategies from the
/// cleaning contract: a boundary-marker cut, then a backward line trim.
fn strip_footer(text: &str) -> String {
    let text = cut_at_footer_boundary(text);
    trim_trailing_footer_lines(&text)
}

/// Strategy (a): scan from 40% into the body for a known footer boundary
/// and cut there, provided the cut preserves at least 20% of the text.
fn cut_at_footer_boundary(text: &str) -> String {
    let scan_from = (text.len() as f64 * FOOTER_SCAN_START) as usize;
    let scan_from = ceil_char_boundary(text, scan_from);

    if let Some(m) = FOOTER_BOUNDARY_RE.find_at(text, scan_from) {
        let kept = &text[..m.start()];
        if kept.trim().len() as f64 >= text.trim().len() as f64 * FOOTER_MIN_KEPT {
            return kept.trim_end().to_string();
        }
    }
    text.to_string()
}

/// Strategy (b): walk backward dropping lines that look like footer
/// boilerplate.
fn trim_trailing_footer_lines(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    while let Some(last) = lines.last() {
        let trimmed = last.trim();
        if trimmed.is_empty() || FOOTER_LINE_RE.is_match(trimmed) {
            lines.pop();
        } else {
            break;
        }
    }
    lines.join("\n")
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}
