//! HTML to plain text conversion for message bodies.

use once_cell::sync::Lazy;
use regex::Regex;

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").unwrap());
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());
static HEAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<head\b[^>]*>.*?</head\s*>").unwrap());
static IMG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap());
static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?href\s*=\s*["']?([^"'\s>]+)["']?[^>]*>(.*?)</a\s*>"#).unwrap()
});
static BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(?:br\s*/?|/p|/div|/tr|/h[1-6]|/li|/blockquote)>").unwrap());
static LI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<li\b[^>]*>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static NUMERIC_ENTITY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#(\d+);").unwrap());

/// Convert an HTML body to readable plain text.
///
/// Style, script, and image markup is dropped; anchors keep their text as
/// `[text](url)`; block-level closers become newlines; the rest of the tags
/// are stripped and common entities decoded.
pub fn html_to_text(html: &str) -> String {
    let mut text = COMMENT_RE.replace_all(html, "").into_owned();
    text = HEAD_RE.replace_all(&text, "").into_owned();
    text = STYLE_RE.replace_all(&text, "").into_owned();
    text = SCRIPT_RE.replace_all(&text, "").into_owned();
    text = IMG_RE.replace_all(&text, "").into_owned();

    text = ANCHOR_RE
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            let url = caps.get(1).map_or("", |m| m.as_str());
            let inner = TAG_RE.replace_all(caps.get(2).map_or("", |m| m.as_str()), "");
            let inner = inner.trim();
            if inner.is_empty() {
                String::new()
            } else if inner == url {
                url.to_string()
            } else {
                format!("[{}]({})", inner, url)
            }
        })
        .into_owned();

    text = LI_RE.replace_all(&text, "\n- ").into_owned();
    text = BREAK_RE.replace_all(&text, "\n").into_owned();
    text = TAG_RE.replace_all(&text, "").into_owned();

    text = decode_entities(&text);
    collapse(&text)
}

fn decode_entities(text: &str) -> String {
    let mut out = text
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'");

    out = NUMERIC_ENTITY_RE
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            caps[1]
                .parse::<u32>()
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default()
        })
        .into_owned();

    // Ampersand last so freshly decoded entities are not re-decoded.
    out.replace("&amp;", "&")
}

/// Trim each line and cap blank runs at one empty line.
fn collapse(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run == 1 && !out.is_empty() {
                out.push('\n');
            }
        } else {
            blank_run = 0;
            out.push_str(trimmed);
            out.push('\n');
        }
    }
    out.trim().to_string()
}
