//! Typed outbound drafts.
//!
//! Drafts arrive as JSON files in the account outbox, written by external
//! producers (agents, editors). Parsing into a sum-typed [`Draft`] replaces
//! the shape checks a dynamic map would need: a reply without a `thread_id`
//! simply does not deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mail::address::split_display_address;

/// What the draft asks the daemon to do.
///
/// Serialized flat into the draft object via the `action` tag, so a reply
/// reads `{"action": "reply", "thread_id": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum DraftAction {
    Compose,
    Reply { thread_id: String },
}

/// Lifecycle state of a draft.
///
/// ```text
/// pending_review -> ready_to_send -> sending -> sent    (terminal)
///                                            -> failed  (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    PendingReview,
    ReadyToSend,
    Sending,
    Sent,
    Failed,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::PendingReview => "pending_review",
            DraftStatus::ReadyToSend => "ready_to_send",
            DraftStatus::Sending => "sending",
            DraftStatus::Sent => "sent",
            DraftStatus::Failed => "failed",
        }
    }

    /// Whether `self -> to` is in the allowed transition set.
    pub fn can_transition(self, to: DraftStatus) -> bool {
        matches!(
            (self, to),
            (DraftStatus::PendingReview, DraftStatus::ReadyToSend)
                | (DraftStatus::ReadyToSend, DraftStatus::Sending)
                | (DraftStatus::Sending, DraftStatus::Sent)
                | (DraftStatus::Sending, DraftStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DraftStatus::Sent | DraftStatus::Failed)
    }
}

impl std::fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An attachment referenced by a draft, read from an absolute path at send
/// time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftAttachment {
    pub filename: String,
    pub path: String,
    #[serde(default = "default_mime")]
    pub mime: String,
}

fn default_mime() -> String {
    "application/octet-stream".to_string()
}

/// A draft as it lives in `outbox/`, `sent/`, or `failed/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    #[serde(flatten)]
    pub action: DraftAction,
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<DraftAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub status: DraftStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Draft {
    /// Shape checks beyond what deserialization enforces.
    pub fn validate(&self) -> Result<()> {
        if self.to.is_empty() {
            return Err(Error::InvalidDraft("'to' must not be empty".into()));
        }
        for addr in &self.to {
            // Recipients may arrive as "Name <mailbox>"; the mailbox part
            // is what has to look like an address.
            let (_, mailbox) = split_display_address(addr);
            if !mailbox.contains('@') {
                return Err(Error::InvalidDraft(format!(
                    "recipient '{}' is not an email address",
                    addr
                )));
            }
        }
        if self.subject.trim().is_empty() {
            return Err(Error::InvalidDraft("'subject' must not be empty".into()));
        }
        if self.body.trim().is_empty() {
            return Err(Error::InvalidDraft("'body' must not be empty".into()));
        }
        if let DraftAction::Reply { thread_id } = &self.action {
            if thread_id.trim().is_empty() {
                return Err(Error::InvalidDraft(
                    "reply drafts require a 'thread_id'".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compose_draft() -> Draft {
        serde_json::from_value(serde_json::json!({
            "action": "compose",
            "to": ["a@b.com"],
            "subject": "Hi",
            "body": "Hello",
            "status": "pending_review"
        }))
        .unwrap()
    }

    #[test]
    fn test_compose_roundtrip() {
        let draft = compose_draft();
        assert_eq!(draft.action, DraftAction::Compose);
        assert_eq!(draft.status, DraftStatus::PendingReview);

        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["action"], "compose");
        assert_eq!(json["status"], "pending_review");
        assert!(json.get("thread_id").is_none());
    }

    #[test]
    fn test_reply_requires_thread_id() {
        let result: std::result::Result<Draft, _> = serde_json::from_value(serde_json::json!({
            "action": "reply",
            "to": ["a@b.com"],
            "subject": "Re: Hi",
            "body": "Hello again",
            "status": "pending_review"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_reply_carries_thread_id() {
        let draft: Draft = serde_json::from_value(serde_json::json!({
            "action": "reply",
            "thread_id": "a1b2c3d4",
            "to": ["a@b.com"],
            "subject": "Re: Hi",
            "body": "Hello again",
            "status": "ready_to_send"
        }))
        .unwrap();
        assert_eq!(
            draft.action,
            DraftAction::Reply {
                thread_id: "a1b2c3d4".into()
            }
        );
    }

    #[test]
    fn test_validate_rejects_bad_recipient() {
        let mut draft = compose_draft();
        draft.to = vec!["not-an-address".into()];
        assert!(draft.validate().is_err());

        let mut draft = compose_draft();
        draft.to = vec!["Empty Mailbox <>".into()];
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_display_form_recipient() {
        let mut draft = compose_draft();
        draft.to = vec!["Dana Reyes <dana@example.com>".into()];
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut draft = compose_draft();
        draft.subject = "".into();
        assert!(draft.validate().is_err());

        let mut draft = compose_draft();
        draft.body = "  ".into();
        assert!(draft.validate().is_err());

        let mut draft = compose_draft();
        draft.to = vec![];
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_transition_table() {
        use DraftStatus::*;
        let allowed = [
            (PendingReview, ReadyToSend),
            (ReadyToSend, Sending),
            (Sending, Sent),
            (Sending, Failed),
        ];
        for from in [PendingReview, ReadyToSend, Sending, Sent, Failed] {
            for to in [PendingReview, ReadyToSend, Sending, Sent, Failed] {
                let expected = allowed.contains(&(from, to));
                assert_eq!(from.can_transition(to), expected, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        let result: std::result::Result<Draft, _> = serde_json::from_value(serde_json::json!({
            "action": "compose",
            "to": ["a@b.com"],
            "subject": "Hi",
            "body": "Hello",
            "status": "queued"
        }));
        assert!(result.is_err());
    }
}
