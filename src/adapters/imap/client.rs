//! IMAP client operations for the sync passes.
//!
//! One client wraps one authenticated connection; connections are opened
//! per fetch pass and not pooled. Every mailbox operation holds the
//! process-local lock for that mailbox path for its whole duration,
//! including error exits, so concurrent tasks cannot interleave SELECTs on
//! the same mailbox.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_imap::types::{Fetch, Flag, Name};
use chrono::{Duration, Utc};
use futures::TryStreamExt;
use tracing::{debug, info, warn};

use super::connection::{self, ImapSession};
use crate::error::{Error, Result};

/// UID batch size for a single FETCH command.
const FETCH_CHUNK: usize = 500;

/// Connection settings for one account.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Preferred name of the all-mail mailbox; locale-dependent on Gmail.
    pub all_mail_mailbox: String,
}

/// One message as fetched from the server.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub uid: u64,
    pub raw: Vec<u8>,
    pub flags: Vec<String>,
}

impl FetchedMessage {
    pub fn is_seen(&self) -> bool {
        self.flags.iter().any(|f| f == "\\Seen")
    }

    pub fn is_flagged(&self) -> bool {
        self.flags.iter().any(|f| f == "\\Flagged")
    }
}

type MailboxLocks = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Authenticated IMAP client.
pub struct ImapClient {
    config: ImapConfig,
    session: Option<ImapSession>,
    locks: MailboxLocks,
    /// Resolved all-mail mailbox name, cached after the first lookup.
    all_mail: Option<String>,
}

impl ImapClient {
    pub fn new(config: ImapConfig) -> Self {
        Self {
            config,
            session: None,
            locks: Arc::new(Mutex::new(HashMap::new())),
            all_mail: None,
        }
    }

    /// Connect and authenticate. Idempotent: an existing session is kept.
    pub async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let session = connection::connect(
            &self.config.host,
            self.config.port,
            &self.config.username,
            &self.config.password,
        )
        .await?;
        self.session = Some(session);
        Ok(())
    }

    /// Log out and drop the connection. Tolerant of an already-closed
    /// session.
    pub async fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.logout().await {
                debug!("logout after use failed (ignored): {}", e);
            }
        }
    }

    fn session(&mut self) -> Result<&mut ImapSession> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::Imap("not connected".into()))
    }

    fn mailbox_lock(&self, mailbox: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("mailbox lock table poisoned");
        locks
            .entry(mailbox.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// List all mailbox paths on the server.
    pub async fn list_mailboxes(&mut self) -> Result<Vec<String>> {
        let session = self.session()?;
        let names: Vec<Name> = session
            .list(None, Some("*"))
            .await
            .map_err(|e| Error::Imap(format!("LIST failed: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| Error::Imap(format!("LIST collect failed: {}", e)))?;

        Ok(names.iter().map(|n| n.name().to_string()).collect())
    }

    /// Resolve the all-mail mailbox: the configured name when the server
    /// knows it, otherwise the first mailbox advertising the `\All`
    /// special-use attribute, otherwise INBOX.
    pub async fn resolve_all_mail(&mut self) -> Result<String> {
        if let Some(resolved) = &self.all_mail {
            return Ok(resolved.clone());
        }

        let configured = self.config.all_mail_mailbox.clone();
        let session = self.session()?;
        let names: Vec<Name> = session
            .list(None, Some("*"))
            .await
            .map_err(|e| Error::Imap(format!("LIST failed: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| Error::Imap(format!("LIST collect failed: {}", e)))?;

        let resolved = if names.iter().any(|n| n.name() == configured) {
            configured
        } else if let Some(all) = names.iter().find(|n| {
            n.attributes()
                .iter()
                .any(|attr| format!("{:?}", attr).contains("All"))
        }) {
            let name = all.name().to_string();
            info!(
                configured = %self.config.all_mail_mailbox,
                resolved = %name,
                "configured all-mail mailbox missing, using \\All special-use"
            );
            name
        } else {
            warn!(
                configured = %self.config.all_mail_mailbox,
                "no all-mail mailbox found, falling back to INBOX"
            );
            "INBOX".to_string()
        };

        self.all_mail = Some(resolved.clone());
        Ok(resolved)
    }

    /// Fetch messages from the last `days` days of all mail, newest `max`
    /// when capped.
    pub async fn fetch_recent(
        &mut self,
        days: i64,
        max: Option<usize>,
    ) -> Result<Vec<FetchedMessage>> {
        let mailbox = self.resolve_all_mail().await?;
        self.fetch_since_date(&mailbox, days, max).await
    }

    /// Same as [`Self::fetch_recent`] but over INBOX only.
    pub async fn fetch_inbox(
        &mut self,
        days: i64,
        max: Option<usize>,
    ) -> Result<Vec<FetchedMessage>> {
        self.fetch_since_date("INBOX", days, max).await
    }

    /// Fetch messages with UID strictly greater than `last_uid` from all
    /// mail.
    ///
    /// Servers are lax about `n:*` ranges (a range below the highest UID
    /// still returns the highest message), so results are filtered
    /// client-side.
    pub async fn fetch_since(&mut self, last_uid: u64) -> Result<Vec<FetchedMessage>> {
        let mailbox = self.resolve_all_mail().await?;
        let lock = self.mailbox_lock(&mailbox);
        let _guard = lock.lock().await;

        self.select(&mailbox).await?;

        let query = format!("UID {}:*", last_uid + 1);
        let session = self.session()?;
        let uid_set = session
            .uid_search(&query)
            .await
            .map_err(|e| Error::Imap(format!("SEARCH failed: {}", e)))?;

        let mut uids: Vec<u32> = uid_set
            .into_iter()
            .filter(|&uid| uid as u64 > last_uid)
            .collect();
        uids.sort_unstable();

        self.fetch_uids(&uids).await
    }

    /// Fetch every unseen message from all mail. No date or count bound.
    pub async fn fetch_unread(&mut self) -> Result<Vec<FetchedMessage>> {
        let mailbox = self.resolve_all_mail().await?;
        let lock = self.mailbox_lock(&mailbox);
        let _guard = lock.lock().await;

        self.select(&mailbox).await?;

        let session = self.session()?;
        let uid_set = session
            .uid_search("UNSEEN")
            .await
            .map_err(|e| Error::Imap(format!("SEARCH UNSEEN failed: {}", e)))?;

        let mut uids: Vec<u32> = uid_set.into_iter().collect();
        uids.sort_unstable();

        self.fetch_uids(&uids).await
    }

    /// Set `\Seen` on the given UIDs in all mail.
    pub async fn mark_seen(&mut self, uids: &[u64]) -> Result<()> {
        if uids.is_empty() {
            return Ok(());
        }

        let mailbox = self.resolve_all_mail().await?;
        let lock = self.mailbox_lock(&mailbox);
        let _guard = lock.lock().await;

        self.select(&mailbox).await?;

        let uid_list = uids
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let session = self.session()?;
        let _updates: Vec<Fetch> = session
            .uid_store(&uid_list, "+FLAGS (\\Seen)")
            .await
            .map_err(|e| Error::Imap(format!("STORE failed: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| Error::Imap(format!("STORE collect failed: {}", e)))?;

        debug!(count = uids.len(), "marked messages seen");
        Ok(())
    }

    async fn fetch_since_date(
        &mut self,
        mailbox: &str,
        days: i64,
        max: Option<usize>,
    ) -> Result<Vec<FetchedMessage>> {
        let lock = self.mailbox_lock(mailbox);
        let _guard = lock.lock().await;

        self.select(mailbox).await?;

        let since = (Utc::now() - Duration::days(days)).format("%d-%b-%Y");
        let query = format!("SINCE {}", since);

        let session = self.session()?;
        let uid_set = session
            .uid_search(&query)
            .await
            .map_err(|e| Error::Imap(format!("SEARCH failed: {}", e)))?;

        let mut uids: Vec<u32> = uid_set.into_iter().collect();
        uids.sort_unstable();

        // When capped, the highest (most recent) UIDs win.
        if let Some(cap) = max {
            if uids.len() > cap {
                uids = uids.split_off(uids.len() - cap);
            }
        }

        self.fetch_uids(&uids).await
    }

    async fn select(&mut self, mailbox: &str) -> Result<()> {
        let session = self.session()?;
        session
            .select(mailbox)
            .await
            .map_err(|e| Error::Imap(format!("SELECT {} failed: {}", mailbox, e)))?;
        Ok(())
    }

    /// UID-addressed fetch of full source plus flags, in chunks.
    async fn fetch_uids(&mut self, uids: &[u32]) -> Result<Vec<FetchedMessage>> {
        let mut messages = Vec::with_capacity(uids.len());

        for chunk in uids.chunks(FETCH_CHUNK) {
            let uid_list = chunk
                .iter()
                .map(|u| u.to_string())
                .collect::<Vec<_>>()
                .join(",");

            let session = self.session()?;
            let fetches: Vec<Fetch> = session
                .uid_fetch(&uid_list, "(UID FLAGS BODY.PEEK[])")
                .await
                .map_err(|e| Error::Imap(format!("FETCH failed: {}", e)))?
                .try_collect()
                .await
                .map_err(|e| Error::Imap(format!("FETCH collect failed: {}", e)))?;

            for fetch in &fetches {
                let Some(uid) = fetch.uid else {
                    continue;
                };
                let Some(body) = fetch.body() else {
                    warn!(uid = uid, "fetch returned no body, skipping");
                    continue;
                };

                messages.push(FetchedMessage {
                    uid: uid as u64,
                    raw: body.to_vec(),
                    flags: fetch.flags().map(|f| flag_to_string(&f)).collect(),
                });
            }
        }

        info!(count = messages.len(), "fetched messages");
        Ok(messages)
    }
}

fn flag_to_string(flag: &Flag<'_>) -> String {
    match flag {
        Flag::Seen => "\\Seen".to_string(),
        Flag::Answered => "\\Answered".to_string(),
        Flag::Flagged => "\\Flagged".to_string(),
        Flag::Deleted => "\\Deleted".to_string(),
        Flag::Draft => "\\Draft".to_string(),
        Flag::Recent => "\\Recent".to_string(),
        Flag::MayCreate => "\\*".to_string(),
        Flag::Custom(name) => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetched_message_flag_helpers() {
        let msg = FetchedMessage {
            uid: 1,
            raw: Vec::new(),
            flags: vec!["\\Seen".into(), "\\Flagged".into()],
        };
        assert!(msg.is_seen());
        assert!(msg.is_flagged());

        let unseen = FetchedMessage {
            uid: 2,
            raw: Vec::new(),
            flags: Vec::new(),
        };
        assert!(!unseen.is_seen());
        assert!(!unseen.is_flagged());
    }

    #[test]
    fn test_flag_to_string() {
        assert_eq!(flag_to_string(&Flag::Seen), "\\Seen");
        assert_eq!(flag_to_string(&Flag::Flagged), "\\Flagged");
        assert_eq!(
            flag_to_string(&Flag::Custom(std::borrow::Cow::Borrowed("$Label1"))),
            "$Label1"
        );
    }
}
