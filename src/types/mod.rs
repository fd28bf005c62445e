//! Data model for the on-disk corpus.
//!
//! Everything here serializes with serde: `thread.json` and `account.json`
//! are pretty-printed JSON, the indexes are JSON Lines, and message
//! frontmatter is rendered by the storage writer from [`Frontmatter`].

pub mod draft;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An email address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Address {
    pub fn new(email: impl Into<String>, name: Option<String>) -> Self {
        Self {
            email: email.into(),
            name: name.filter(|n| !n.trim().is_empty()),
        }
    }

    /// Render as `Name <email>` or bare `email` when there is no name.
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// Whether a participant is the account owner or somebody else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    #[serde(rename = "self")]
    Owner,
    External,
}

/// A person appearing on a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: ParticipantRole,
}

/// Attachment metadata as recorded in `thread.json`.
///
/// Oversized attachments are listed with `skipped: true` and no bytes on
/// disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub skipped: bool,
}

/// Per-thread metadata persisted as `threads/<id>/thread.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMeta {
    pub id: String,
    pub subject: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub unread: bool,
    pub starred: bool,
    pub participants: Vec<Participant>,
    pub first_date: DateTime<Utc>,
    pub last_date: DateTime<Utc>,
    pub message_count: usize,
    pub has_attachments: bool,
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
}

/// Denormalized thread projection, one JSONL line in `index/threads.jsonl`.
///
/// The shape is optimized for grep: flat fields, ISO dates, a short snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadIndexEntry {
    pub id: String,
    pub subject: String,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    pub participants: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub unread: bool,
    pub starred: bool,
    pub msg_count: usize,
    pub last_date: DateTime<Utc>,
    pub first_date: DateTime<Utc>,
    pub snippet: String,
    pub has_attachments: bool,
    pub size_bytes: u64,
}

/// One record per unique external sender, one JSONL line in
/// `index/contacts.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactEntry {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub msg_count: u64,
    #[serde(default)]
    pub common_labels: Vec<String>,
    pub is_frequent: bool,
}

/// Number of messages from a sender at which they count as frequent.
pub const FREQUENT_CONTACT_THRESHOLD: u64 = 5;

/// YAML frontmatter of a message `.md` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frontmatter {
    pub id: String,
    pub message_id: String,
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rfc822_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
    pub from: Address,
    #[serde(default)]
    pub to: Vec<Address>,
    #[serde(default)]
    pub cc: Vec<Address>,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        let a = Address::new("a@b.com", Some("Alice".into()));
        assert_eq!(a.display(), "Alice <a@b.com>");

        let b = Address::new("b@c.com", None);
        assert_eq!(b.display(), "b@c.com");

        let c = Address::new("c@d.com", Some("  ".into()));
        assert_eq!(c.display(), "c@d.com");
    }

    #[test]
    fn test_participant_role_serialization() {
        let p = Participant {
            email: "me@gmail.com".into(),
            name: None,
            role: ParticipantRole::Owner,
        };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"self\""));
    }
}
