//! Thread grouping for fetched batches.
//!
//! Messages are assigned to threads by their reply headers, falling back to
//! a hash of the normalized subject. The grouper is per-batch and
//! restartable: it is rebuilt from scratch on every fetch and does not join
//! threads across batches, so a late-arriving reply whose ancestors were
//! fetched earlier lands via the subject hash (which normally produces the
//! same thread id anyway). Cross-batch stitching is a known future feature.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::mail::headers::{self, HeaderScan};

static REPLY_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(re|fw|fwd)\s*:\s*").unwrap());

/// Batch-scoped grouper. Feed messages in fetch order.
#[derive(Debug, Default)]
pub struct ThreadGrouper {
    id_map: HashMap<String, String>,
}

impl ThreadGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a thread id to one raw message.
    ///
    /// Priority: inherit from `In-Reply-To`, then from the first matching
    /// entry of `References`, then hash the normalized subject. A message
    /// with no usable identifier at all forms a one-message thread keyed by
    /// its UID.
    pub fn assign(&mut self, raw: &[u8], uid: u64) -> String {
        let scan = headers::scan_reference_headers(raw);
        let thread_id = self.resolve(&scan, uid);

        if let Some(message_id) = &scan.message_id {
            self.id_map
                .insert(message_id.clone(), thread_id.clone());
        }

        thread_id
    }

    fn resolve(&self, scan: &HeaderScan, uid: u64) -> String {
        if let Some(parent) = &scan.in_reply_to {
            if let Some(tid) = self.id_map.get(parent) {
                return tid.clone();
            }
        }

        for reference in &scan.references {
            if let Some(tid) = self.id_map.get(reference) {
                return tid.clone();
            }
        }

        match scan.subject.as_deref().map(normalize_subject) {
            Some(subject) if !subject.is_empty() => subject_hash(&subject),
            _ => match &scan.message_id {
                Some(mid) => subject_hash(mid),
                None => subject_hash(&format!("uid-{}", uid)),
            },
        }
    }
}

/// Strip reply/forward prefixes (repeatedly), lowercase, and trim.
pub fn normalize_subject(subject: &str) -> String {
    let mut s = subject.trim().to_string();
    loop {
        let stripped = REPLY_PREFIX_RE.replace(&s, "").into_owned();
        if stripped == s {
            break;
        }
        s = stripped;
    }
    s.trim().to_lowercase()
}

/// Deterministic 32-bit hash, base-36, zero-padded to 8 characters.
pub fn subject_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let n = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    to_base36_padded(n)
}

fn to_base36_padded(mut n: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut buf = [b'0'; 8];
    let mut i = buf.len();
    while n > 0 && i > 0 {
        i -= 1;
        buf[i] = DIGITS[(n % 36) as usize];
        n /= 36;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(message_id: &str, in_reply_to: Option<&str>, subject: &str) -> Vec<u8> {
        let mut s = format!("Message-ID: <{}>\r\n", message_id);
        if let Some(parent) = in_reply_to {
            s.push_str(&format!("In-Reply-To: <{}>\r\n", parent));
        }
        s.push_str(&format!("Subject: {}\r\n\r\nbody\r\n", subject));
        s.into_bytes()
    }

    #[test]
    fn test_reply_inherits_thread() {
        let mut grouper = ThreadGrouper::new();
        let root = grouper.assign(&raw("m1@x", None, "Budget"), 1);
        let reply = grouper.assign(&raw("m2@x", Some("m1@x"), "Re: Budget"), 2);
        assert_eq!(root, reply);
    }

    #[test]
    fn test_references_fallback() {
        let mut grouper = ThreadGrouper::new();
        let root = grouper.assign(&raw("m1@x", None, "Budget"), 1);

        // No In-Reply-To, but References names the root.
        let raw_bytes =
            b"Message-ID: <m3@x>\r\nReferences: <missing@x> <m1@x>\r\nSubject: other\r\n\r\nbody\r\n";
        let by_refs = grouper.assign(raw_bytes, 3);
        assert_eq!(root, by_refs);
    }

    #[test]
    fn test_subject_hash_groups_without_references() {
        let mut grouper = ThreadGrouper::new();
        let a = grouper.assign(&raw("m1@x", None, "Project kickoff"), 1);
        let b = grouper.assign(&raw("m2@x", None, "Re: Project kickoff"), 2);
        let c = grouper.assign(&raw("m3@x", None, "Fwd: RE: project kickoff"), 3);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_unrelated_subjects_do_not_group() {
        let mut grouper = ThreadGrouper::new();
        let a = grouper.assign(&raw("m1@x", None, "Invoices"), 1);
        let b = grouper.assign(&raw("m2@x", None, "Standup notes"), 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_subject_uses_message_id() {
        let mut grouper = ThreadGrouper::new();
        let a = grouper.assign(b"Message-ID: <solo@x>\r\n\r\nbody\r\n", 7);
        let b = grouper.assign(b"Message-ID: <other@x>\r\n\r\nbody\r\n", 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_no_identifiers_forms_singleton_thread() {
        let mut grouper = ThreadGrouper::new();
        let a = grouper.assign(b"From: a@b.com\r\n\r\nbody\r\n", 41);
        let b = grouper.assign(b"From: a@b.com\r\n\r\nbody\r\n", 42);
        assert_ne!(a, b);
    }

    #[test]
    fn test_normalize_subject() {
        assert_eq!(normalize_subject("Re: Re: FWD: Hello  "), "hello");
        assert_eq!(normalize_subject("  Plain  "), "plain");
        assert_eq!(normalize_subject("fw: fwd:re: Deal"), "deal");
        assert_eq!(normalize_subject("Regarding the deal"), "regarding the deal");
    }

    #[test]
    fn test_hash_shape() {
        let h = subject_hash("hello");
        assert_eq!(h.len(), 8);
        assert!(h.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_eq!(h, subject_hash("hello"));
        assert_ne!(h, subject_hash("hello2"));
    }
}
