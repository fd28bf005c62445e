//! Storage writer: persists threads, messages, attachments, and indexes.
//!
//! Writes happen in dependency order (thread dir, messages, attachments,
//! thread.json, index entry) so an interrupted sync leaves every thread that
//! was touched in a readable, self-consistent state. All file writes go
//! through the atomic writer; index upserts are serialized by a
//! process-local mutex because the JSONL file is a shared resource within
//! the account.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::corpus::atomic;
use crate::corpus::jsonl::{self, UpsertOptions};
use crate::corpus::paths::{self, CorpusPaths};
use crate::error::Result;
use crate::mail::parser::ParsedAttachment;
use crate::types::{
    Address, AttachmentMeta, ContactEntry, Frontmatter, ThreadIndexEntry, ThreadMeta,
    FREQUENT_CONTACT_THRESHOLD,
};

/// Attachments above this size are recorded but not written to disk.
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Per-account storage writer.
pub struct StorageWriter {
    paths: CorpusPaths,
    email: String,
    index_lock: Mutex<()>,
}

impl StorageWriter {
    pub fn new(paths: CorpusPaths, email: &str) -> Self {
        Self {
            paths,
            email: email.to_string(),
            index_lock: Mutex::new(()),
        }
    }

    pub fn paths(&self) -> &CorpusPaths {
        &self.paths
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Create the account directory skeleton.
    pub fn ensure_account_tree(&self) -> Result<()> {
        for dir in [
            self.paths.index_dir(&self.email),
            self.paths.threads_dir(&self.email),
            self.paths.outbox_dir(&self.email),
            self.paths.sent_dir(&self.email),
            self.paths.failed_dir(&self.email),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Write `thread.json`, creating the thread directory as needed.
    pub fn write_thread_meta(&self, meta: &ThreadMeta) -> Result<()> {
        let dir = self.paths.thread_dir(&self.email, &meta.id);
        std::fs::create_dir_all(&dir)?;
        atomic::atomic_write_json(&self.paths.thread_meta_file(&self.email, &meta.id), meta)
    }

    /// Write one message `.md` file; returns the filename.
    ///
    /// The same `(frontmatter, body)` always produces the same filename and
    /// byte-identical contents, so re-writes after an interrupted sync are
    /// idempotent.
    pub fn write_message(
        &self,
        thread_id: &str,
        frontmatter: &Frontmatter,
        body: &str,
    ) -> Result<String> {
        let filename = paths::message_filename(&frontmatter.date, &frontmatter.message_id);
        let path = self.paths.message_file(&self.email, thread_id, &filename);

        // Messages are immutable once written; a duplicate is skipped by
        // filename.
        if path.exists() {
            return Ok(filename);
        }

        let mut content = String::with_capacity(body.len() + 512);
        content.push_str("---\n");
        content.push_str(&render_frontmatter(frontmatter));
        content.push_str("---\n\n");
        content.push_str(body.trim_end_matches('\n'));
        content.push('\n');

        atomic::atomic_write_file(&path, content.as_bytes())?;
        Ok(filename)
    }

    /// Persist attachment bytes, skipping oversized files.
    ///
    /// Returns the metadata to record in `thread.json`; skipped attachments
    /// carry `skipped: true` and leave no bytes on disk.
    pub fn write_attachments(
        &self,
        thread_id: &str,
        attachments: &[ParsedAttachment],
    ) -> Result<Vec<AttachmentMeta>> {
        let mut metas = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let filename = paths::sanitize_component(&attachment.filename);
            let skipped = attachment.size > MAX_ATTACHMENT_BYTES;

            if skipped {
                debug!(
                    filename = %filename,
                    size = attachment.size,
                    "skipping oversized attachment"
                );
            } else {
                let path = self
                    .paths
                    .attachment_file(&self.email, thread_id, &filename);
                atomic::atomic_write_file(&path, &attachment.bytes)?;
            }

            metas.push(AttachmentMeta {
                filename,
                mime_type: attachment.content_type.clone(),
                size_bytes: attachment.size,
                skipped,
            });
        }
        Ok(metas)
    }

    /// Upsert the thread's entry in `index/threads.jsonl`, keeping the file
    /// sorted by `last_date` descending.
    pub fn upsert_thread_index(&self, entry: &ThreadIndexEntry) -> Result<()> {
        let _guard = self.index_lock.lock().expect("index lock poisoned");
        jsonl::upsert(
            &self.paths.threads_index(&self.email),
            serde_json::to_value(entry)?,
            "id",
            &UpsertOptions {
                sort_by_field: Some("last_date".to_string()),
                max_records: None,
            },
        )
    }

    /// Merge a batch of sightings of an external sender into
    /// `index/contacts.jsonl`.
    pub fn record_contact(
        &self,
        email: &str,
        name: Option<&str>,
        first_seen: DateTime<Utc>,
        last_seen: DateTime<Utc>,
        labels: &[String],
        message_count: u64,
    ) -> Result<()> {
        let _guard = self.index_lock.lock().expect("index lock poisoned");
        let index_path = self.paths.contacts_index(&self.email);

        let existing = jsonl::read_all(&index_path)?
            .into_iter()
            .find(|r| r.get("email").and_then(|v| v.as_str()) == Some(email))
            .and_then(|v| serde_json::from_value::<ContactEntry>(v).ok());

        let merged = match existing {
            Some(mut entry) => {
                entry.first_seen = entry.first_seen.min(first_seen);
                entry.last_seen = entry.last_seen.max(last_seen);
                entry.msg_count += message_count;
                if entry.name.is_none() {
                    entry.name = name.map(String::from);
                }
                for label in labels {
                    if !entry.common_labels.contains(label) {
                        entry.common_labels.push(label.clone());
                    }
                }
                entry.is_frequent = entry.msg_count >= FREQUENT_CONTACT_THRESHOLD;
                entry
            }
            None => ContactEntry {
                email: email.to_string(),
                name: name.map(String::from),
                first_seen,
                last_seen,
                msg_count: message_count,
                common_labels: labels.to_vec(),
                is_frequent: message_count >= FREQUENT_CONTACT_THRESHOLD,
            },
        };

        jsonl::upsert(
            &index_path,
            serde_json::to_value(&merged)?,
            "email",
            &UpsertOptions::default(),
        )
    }
}

/// Render frontmatter as YAML lines (no surrounding `---` fences).
fn render_frontmatter(fm: &Frontmatter) -> String {
    let mut out = String::new();
    push_scalar(&mut out, "id", &fm.id);
    push_scalar(&mut out, "message_id", &fm.message_id);
    push_scalar(&mut out, "thread_id", &fm.thread_id);
    if let Some(rfc_id) = &fm.rfc822_message_id {
        push_scalar(&mut out, "rfc822_message_id", rfc_id);
    }
    if let Some(parent) = &fm.in_reply_to {
        push_scalar(&mut out, "in_reply_to", parent);
    }
    if !fm.references.is_empty() {
        push_list(&mut out, "references", fm.references.iter().cloned());
    }
    push_scalar(&mut out, "from", &fm.from.display());
    push_list(&mut out, "to", fm.to.iter().map(Address::display));
    if !fm.cc.is_empty() {
        push_list(&mut out, "cc", fm.cc.iter().map(Address::display));
    }
    push_scalar(
        &mut out,
        "date",
        &fm.date.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    );
    if let Some(uid) = fm.uid {
        out.push_str(&format!("uid: {}\n", uid));
    }
    out
}

fn push_scalar(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str(": ");
    out.push_str(&yaml_scalar(value));
    out.push('\n');
}

fn push_list(out: &mut String, key: &str, values: impl Iterator<Item = String>) {
    let rendered: Vec<String> = values.map(|v| yaml_scalar(&v)).collect();
    out.push_str(key);
    out.push_str(": [");
    out.push_str(&rendered.join(", "));
    out.push_str("]\n");
}

/// Quote a YAML scalar when it contains characters that would change its
/// meaning unquoted.
///
/// The recognized set: `:#[]{}|>&*!'`, double quotes, backslashes, commas,
/// a leading `-`, and leading/trailing whitespace. Quoting uses double
/// quotes with `\\` and `\"` escapes; embedded newlines and tabs are
/// escaped too.
fn yaml_scalar(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.starts_with('-')
        || value.starts_with(' ')
        || value.starts_with('\t')
        || value.ends_with(' ')
        || value
            .chars()
            .any(|c| ":#[]{}|>&*!'\",\\".contains(c) || c == '\n' || c == '\r' || c == '\t');

    if !needs_quotes {
        return value.to_string();
    }

    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped.push('"');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn writer(dir: &std::path::Path) -> StorageWriter {
        StorageWriter::new(
            CorpusPaths::new(Some(PathBuf::from(dir))),
            "me@gmail.com",
        )
    }

    fn sample_frontmatter() -> Frontmatter {
        Frontmatter {
            id: "1021".into(),
            message_id: "1021".into(),
            thread_id: "a1b2c3d4".into(),
            rfc822_message_id: Some("msg1@mail.example.com".into()),
            in_reply_to: None,
            references: vec!["root@mail.example.com".into()],
            from: Address::new("alice@example.com", Some("Alice Example".into())),
            to: vec![Address::new("me@gmail.com", None)],
            cc: vec![],
            date: Utc.with_ymd_and_hms(2026, 2, 17, 9, 30, 0).unwrap(),
            uid: Some(1021),
        }
    }

    #[test]
    fn test_yaml_scalar_quoting() {
        assert_eq!(yaml_scalar("plain"), "plain");
        assert_eq!(yaml_scalar("has: colon"), "\"has: colon\"");
        assert_eq!(yaml_scalar("-leading"), "\"-leading\"");
        assert_eq!(yaml_scalar("a[b]"), "\"a[b]\"");
        assert_eq!(yaml_scalar("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(yaml_scalar("back\\slash"), "\"back\\\\slash\"");
        assert_eq!(yaml_scalar(""), "\"\"");
        assert_eq!(yaml_scalar("line\nbreak"), "\"line\\nbreak\"");
    }

    #[test]
    fn test_write_message_layout() {
        let dir = tempfile::tempdir().unwrap();
        let w = writer(dir.path());

        let filename = w
            .write_message("a1b2c3d4", &sample_frontmatter(), "Body text here.")
            .unwrap();
        assert_eq!(filename, "20260217T093000Z__msg1021.md");

        let path = w
            .paths()
            .message_file("me@gmail.com", "a1b2c3d4", &filename);
        let text = std::fs::read_to_string(path).unwrap();

        assert!(text.starts_with("---\n"));
        assert!(text.contains("\n---\n\nBody text here.\n"));
        assert!(text.contains("id: \"1021\"") || text.contains("id: 1021"));
        assert!(text.contains("thread_id: a1b2c3d4"));
        assert!(text.contains("from: Alice Example <alice@example.com>"));
        assert!(text.contains("date: \"2026-02-17T09:30:00Z\"") || text.contains("date: 2026-02-17T09:30:00Z"));
        assert!(text.contains("uid: 1021"));
        assert!(text.ends_with("\n"));
    }

    #[test]
    fn test_write_message_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let w = writer(dir.path());
        let fm = sample_frontmatter();

        let f1 = w.write_message("t", &fm, "Body").unwrap();
        let p = w.paths().message_file("me@gmail.com", "t", &f1);
        let first = std::fs::read(&p).unwrap();

        let f2 = w.write_message("t", &fm, "Body").unwrap();
        let second = std::fs::read(&p).unwrap();

        assert_eq!(f1, f2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_filename_prefix_matches_frontmatter_date() {
        let dir = tempfile::tempdir().unwrap();
        let w = writer(dir.path());
        let fm = sample_frontmatter();

        let filename = w.write_message("t", &fm, "Body").unwrap();
        let (stamp, _) = paths::parse_message_filename(&filename).unwrap();
        assert_eq!(stamp, fm.date);
    }

    #[test]
    fn test_attachment_oversize_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let w = writer(dir.path());

        let attachments = vec![
            ParsedAttachment {
                filename: "big.bin".into(),
                content_type: "application/octet-stream".into(),
                bytes: Vec::new(),
                size: 12 * 1024 * 1024,
                content_id: None,
            },
            ParsedAttachment {
                filename: "small.txt".into(),
                content_type: "text/plain".into(),
                bytes: b"tiny".to_vec(),
                size: 4,
                content_id: None,
            },
        ];

        let metas = w.write_attachments("t1", &attachments).unwrap();
        assert!(metas[0].skipped);
        assert!(!metas[1].skipped);

        let big = w.paths().attachment_file("me@gmail.com", "t1", "big.bin");
        let small = w.paths().attachment_file("me@gmail.com", "t1", "small.txt");
        assert!(!big.exists());
        assert_eq!(std::fs::read(small).unwrap(), b"tiny");
    }

    #[test]
    fn test_contact_merging_and_frequency() {
        let dir = tempfile::tempdir().unwrap();
        let w = writer(dir.path());
        let d1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let d2 = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();

        w.record_contact("alice@example.com", Some("Alice"), d1, d1, &[], 2)
            .unwrap();
        w.record_contact("alice@example.com", None, d2, d2, &["work".into()], 3)
            .unwrap();

        let records = jsonl::read_all(&w.paths().contacts_index("me@gmail.com")).unwrap();
        assert_eq!(records.len(), 1);
        let contact: ContactEntry = serde_json::from_value(records[0].clone()).unwrap();
        assert_eq!(contact.msg_count, 5);
        assert!(contact.is_frequent);
        assert_eq!(contact.first_seen, d1);
        assert_eq!(contact.last_seen, d2);
        assert_eq!(contact.name.as_deref(), Some("Alice"));
        assert_eq!(contact.common_labels, vec!["work".to_string()]);
    }

    #[test]
    fn test_thread_index_unique_per_thread() {
        let dir = tempfile::tempdir().unwrap();
        let w = writer(dir.path());
        let date = Utc.with_ymd_and_hms(2026, 2, 17, 9, 30, 0).unwrap();

        let mut entry = ThreadIndexEntry {
            id: "t1".into(),
            subject: "Hello".into(),
            from: "alice@example.com".into(),
            from_name: None,
            participants: vec!["alice@example.com".into()],
            labels: vec![],
            unread: true,
            starred: false,
            msg_count: 1,
            last_date: date,
            first_date: date,
            snippet: "Hello".into(),
            has_attachments: false,
            size_bytes: 100,
        };

        w.upsert_thread_index(&entry).unwrap();
        entry.msg_count = 2;
        w.upsert_thread_index(&entry).unwrap();

        let records = jsonl::read_all(&w.paths().threads_index("me@gmail.com")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["msg_count"], 2);
    }
}
