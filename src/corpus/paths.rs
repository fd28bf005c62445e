//! Path resolution for the corpus.
//!
//! Every on-disk location the daemon touches is produced here; no other
//! module concatenates corpus paths. All externally-influenced name
//! components (emails, thread ids, attachment filenames, message ids) pass
//! through [`sanitize_component`] so nothing can escape the account subtree.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Directory name under the user's home that holds the corpus.
pub const DEFAULT_BASE_DIR: &str = ".maildeck";

/// Timestamp prefix format of message filenames, e.g. `20260217T093000Z`.
const MESSAGE_STAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Resolves every path in the corpus from a base directory.
#[derive(Debug, Clone)]
pub struct CorpusPaths {
    base: PathBuf,
}

impl CorpusPaths {
    /// Build a resolver rooted at `base`, falling back to
    /// `$HOME/.maildeck`.
    pub fn new(base: Option<PathBuf>) -> Self {
        let base = base.unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_BASE_DIR)
        });
        Self { base }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.base.join("daemon.pid")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir().join("sync.log")
    }

    pub fn accounts_dir(&self) -> PathBuf {
        self.base.join("accounts")
    }

    pub fn account_dir(&self, email: &str) -> PathBuf {
        self.accounts_dir().join(sanitize_component(email))
    }

    pub fn account_state_file(&self, email: &str) -> PathBuf {
        self.account_dir(email).join("account.json")
    }

    pub fn signature_file(&self, email: &str) -> PathBuf {
        self.account_dir(email).join("signature.txt")
    }

    pub fn index_dir(&self, email: &str) -> PathBuf {
        self.account_dir(email).join("index")
    }

    pub fn threads_index(&self, email: &str) -> PathBuf {
        self.index_dir(email).join("threads.jsonl")
    }

    pub fn contacts_index(&self, email: &str) -> PathBuf {
        self.index_dir(email).join("contacts.jsonl")
    }

    pub fn threads_dir(&self, email: &str) -> PathBuf {
        self.account_dir(email).join("threads")
    }

    pub fn thread_dir(&self, email: &str, thread_id: &str) -> PathBuf {
        self.threads_dir(email).join(sanitize_component(thread_id))
    }

    pub fn thread_meta_file(&self, email: &str, thread_id: &str) -> PathBuf {
        self.thread_dir(email, thread_id).join("thread.json")
    }

    pub fn messages_dir(&self, email: &str, thread_id: &str) -> PathBuf {
        self.thread_dir(email, thread_id).join("messages")
    }

    pub fn message_file(&self, email: &str, thread_id: &str, filename: &str) -> PathBuf {
        self.messages_dir(email, thread_id)
            .join(sanitize_component(filename))
    }

    pub fn attachments_dir(&self, email: &str, thread_id: &str) -> PathBuf {
        self.thread_dir(email, thread_id).join("attachments")
    }

    pub fn attachment_file(&self, email: &str, thread_id: &str, filename: &str) -> PathBuf {
        self.attachments_dir(email, thread_id)
            .join(sanitize_component(filename))
    }

    pub fn outbox_dir(&self, email: &str) -> PathBuf {
        self.account_dir(email).join("outbox")
    }

    pub fn sent_dir(&self, email: &str) -> PathBuf {
        self.account_dir(email).join("sent")
    }

    pub fn failed_dir(&self, email: &str) -> PathBuf {
        self.account_dir(email).join("failed")
    }

    pub fn outbox_file(&self, email: &str, name: &str) -> PathBuf {
        self.outbox_dir(email).join(sanitize_component(name))
    }

    pub fn sent_file(&self, email: &str, name: &str) -> PathBuf {
        self.sent_dir(email).join(sanitize_component(name))
    }

    pub fn failed_file(&self, email: &str, name: &str) -> PathBuf {
        self.failed_dir(email).join(sanitize_component(name))
    }
}

/// Replace filesystem-reserved characters with `_`.
///
/// Handles the reserved set `/\:*?"<>|`, a leading `-`, embedded `..`
/// sequences, and control characters. An empty (or fully-eaten) name
/// becomes `attachment`.
pub fn sanitize_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            c if c.is_control() => out.push('_'),
            c => out.push(c),
        }
    }
    while out.contains("..") {
        out = out.replace("..", "_");
    }
    let mut out = out.trim().to_string();
    if out.starts_with('-') {
        out.replace_range(..1, "_");
    }
    if out.is_empty() {
        "attachment".to_string()
    } else {
        out
    }
}

/// Build a message filename: `YYYYMMDDTHHMMSSZ__msg<id>.md`.
///
/// The timestamp prefix yields natural chronological sort; the prefix always
/// matches the frontmatter `date` to the second, UTC.
pub fn message_filename(date: &DateTime<Utc>, message_id: &str) -> String {
    format!(
        "{}__msg{}.md",
        date.format(MESSAGE_STAMP_FORMAT),
        sanitize_component(message_id)
    )
}

/// Inverse of [`message_filename`]. Returns `None` for names that were not
/// produced by it.
pub fn parse_message_filename(name: &str) -> Option<(DateTime<Utc>, String)> {
    let rest = name.strip_suffix(".md")?;
    let (stamp, id_part) = rest.split_once("__msg")?;
    let naive = NaiveDateTime::parse_from_str(stamp, MESSAGE_STAMP_FORMAT).ok()?;
    let date = Utc.from_utc_datetime(&naive);
    if id_part.is_empty() {
        return None;
    }
    Some((date, id_part.to_string()))
}
