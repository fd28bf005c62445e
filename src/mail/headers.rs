//! Cheap header scan for thread grouping.
//!
//! The grouper only needs `Message-ID`, `In-Reply-To`, `References`, and
//! `Subject`, and it needs them for every message in a batch, so it scans
//! the first 8 KiB of raw bytes instead of running the full MIME parser.

/// How much of the raw message the scan looks at.
pub const HEADER_SCAN_LIMIT: usize = 8 * 1024;

/// Reference headers pulled out by [`scan_reference_headers`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderScan {
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub subject: Option<String>,
}

/// Scan the head of a raw RFC 822 message for reference headers.
///
/// Continuation lines (leading whitespace) are unfolded onto the previous
/// header. Message ids are returned without their angle brackets.
pub fn scan_reference_headers(raw: &[u8]) -> HeaderScan {
    let head = &raw[..raw.len().min(HEADER_SCAN_LIMIT)];
    let text = String::from_utf8_lossy(head);

    let mut scan = HeaderScan::default();

    for header in unfold_headers(&text) {
        let Some((name, value)) = header.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "message-id" => {
                if scan.message_id.is_none() {
                    scan.message_id = first_msg_id(value);
                }
            }
            "in-reply-to" => {
                if scan.in_reply_to.is_none() {
                    scan.in_reply_to = first_msg_id(value);
                }
            }
            "references" => {
                if scan.references.is_empty() {
                    scan.references = all_msg_ids(value);
                }
            }
            "subject" => {
                if scan.subject.is_none() && !value.is_empty() {
                    scan.subject = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    scan
}

/// Join folded header lines and stop at the blank line ending the header
/// block.
fn unfold_headers(text: &str) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = headers.last_mut() {
                last.push(' ');
                last.push_str(line.trim());
            }
        } else {
            headers.push(line.to_string());
        }
    }
    headers
}

/// First `<...>` token in a header value, brackets stripped. Falls back to
/// the bare value when no brackets are present.
fn first_msg_id(value: &str) -> Option<String> {
    all_msg_ids(value).into_iter().next()
}

/// Every message id in a whitespace-separated header value.
fn all_msg_ids(value: &str) -> Vec<String> {
    let bracketed: Vec<String> = value
        .split_whitespace()
        .filter(|tok| tok.starts_with('<') && tok.ends_with('>'))
        .map(|tok| tok[1..tok.len() - 1].to_string())
        .filter(|id| !id.is_empty())
        .collect();

    if !bracketed.is_empty() {
        return bracketed;
    }

    // Some producers omit the brackets; accept a lone bare id.
    let bare = value.trim().trim_matches(|c| c == '<' || c == '>');
    if !bare.is_empty() && !bare.contains(char::is_whitespace) {
        vec![bare.to_string()]
    } else {
        Vec::new()
    }
}
