//! Outbox state machine.
//!
//! Drafts advance through a constrained lifecycle; anything else is an
//! invalid transition and leaves the on-disk state untouched. Terminal
//! transitions move the file out of `outbox/` into `sent/` or `failed/`
//! with result metadata attached; the rename-based writers keep every
//! intermediate state invisible to readers.

use chrono::Utc;
use tracing::info;

use crate::corpus::atomic;
use crate::corpus::paths::CorpusPaths;
use crate::error::{Error, Result};
use crate::types::draft::{Draft, DraftStatus};

/// Result metadata merged into a draft on transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionMeta {
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

/// Read a draft from the account outbox.
pub fn read_draft(paths: &CorpusPaths, account: &str, filename: &str) -> Result<Draft> {
    let path = paths.outbox_file(account, filename);
    let text = std::fs::read_to_string(&path)?;
    let draft: Draft = serde_json::from_str(&text)
        .map_err(|e| Error::InvalidDraft(format!("{}: {}", filename, e)))?;
    Ok(draft)
}

/// Advance a draft to `new_status`.
///
/// Verifies the transition against the allowed set before any write. On
/// `sent` the draft moves to `sent/<filename>` with `sent_at`; on `failed`
/// it moves to `failed/<filename>` with `failed_at` and the error; other
/// transitions rewrite the outbox file in place.
pub fn transition(
    paths: &CorpusPaths,
    account: &str,
    filename: &str,
    new_status: DraftStatus,
    meta: TransitionMeta,
) -> Result<Draft> {
    let mut draft = read_draft(paths, account, filename)?;

    if !draft.status.can_transition(new_status) {
        return Err(Error::InvalidTransition {
            from: draft.status,
            to: new_status,
        });
    }

    let now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    draft.status = new_status;
    if let Some(id) = meta.provider_message_id {
        draft.provider_message_id = Some(id);
    }
    if let Some(error) = meta.error {
        draft.error = Some(error);
    }

    let outbox_path = paths.outbox_file(account, filename);
    match new_status {
        DraftStatus::Sent => {
            draft.sent_at = Some(now);
            atomic::atomic_write_json(&paths.sent_file(account, filename), &draft)?;
            std::fs::remove_file(&outbox_path)?;
            info!(account = %account, draft = %filename, "draft sent");
        }
        DraftStatus::Failed => {
            draft.failed_at = Some(now);
            if draft.error.is_none() {
                draft.error = Some("unknown error".to_string());
            }
            atomic::atomic_write_json(&paths.failed_file(account, filename), &draft)?;
            std::fs::remove_file(&outbox_path)?;
            info!(account = %account, draft = %filename, "draft failed");
        }
        _ => {
            atomic::atomic_write_json(&outbox_path, &draft)?;
        }
    }

    Ok(draft)
}
