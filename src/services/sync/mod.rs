//! Sync operations: full, incremental, and unread-only passes.
//!
//! A pass drives IMAP fetch through the cleaning pipeline and the thread
//! grouper into the storage writer. Within a thread, messages are written
//! in ascending date order; the timestamp-prefixed filenames make the
//! on-disk order self-describing regardless. A pass interrupted mid-batch
//! leaves already-written threads intact and the high-water mark
//! un-advanced; the next run re-fetches the tail and overwrites message
//! files idempotently.

pub mod clean;
pub mod scheduler;
pub mod threading;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::adapters::imap::{FetchedMessage, ImapClient};
use crate::corpus::paths::CorpusPaths;
use crate::corpus::writer::StorageWriter;
use crate::error::{Error, Result};
use crate::mail::address::is_self;
use crate::mail::parser::{self, ParsedMessage};
use crate::types::{
    Address, AttachmentMeta, Frontmatter, Participant, ParticipantRole, ThreadIndexEntry,
    ThreadMeta,
};

/// Which pass the scheduler (or a one-shot command) selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPass {
    Full { days: i64, max: Option<usize> },
    Incremental { last_uid: u64 },
    UnreadOnly,
}

/// What a completed pass reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub threads_touched: usize,
    pub messages_written: usize,
    /// Highest UID seen, for advancing the account high-water mark. `None`
    /// for empty batches and unread-only passes.
    pub last_uid: Option<u64>,
}

/// One account's sync pipeline.
pub struct SyncOps {
    account: String,
    writer: StorageWriter,
    cancel: Arc<AtomicBool>,
}

impl SyncOps {
    pub fn new(paths: CorpusPaths, account: &str) -> Self {
        Self {
            account: account.to_string(),
            writer: StorageWriter::new(paths, account),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a cancellation flag with the caller; the pipeline checks it
    /// between threads and between messages.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn writer(&self) -> &StorageWriter {
        &self.writer
    }

    /// Run one pass over a connected client.
    pub async fn run(&self, client: &mut ImapClient, pass: SyncPass) -> Result<SyncOutcome> {
        self.writer.ensure_account_tree()?;
        client.connect().await?;

        let (fetched, advance) = match pass {
            SyncPass::Full { days, max } => (client.fetch_recent(days, max).await?, true),
            SyncPass::Incremental { last_uid } => (client.fetch_since(last_uid).await?, true),
            SyncPass::UnreadOnly => (client.fetch_unread().await?, false),
        };

        info!(
            account = %self.account,
            pass = ?pass,
            fetched = fetched.len(),
            "sync pass fetched"
        );

        self.process_batch(&fetched, advance)
    }

    /// Group, clean, and persist one fetched batch.
    ///
    /// Public so one-shot commands and tests can drive the pipeline with a
    /// prepared batch.
    pub fn process_batch(
        &self,
        messages: &[FetchedMessage],
        advance_high_water: bool,
    ) -> Result<SyncOutcome> {
        if messages.is_empty() {
            return Ok(SyncOutcome::default());
        }

        let batch_max_uid = messages.iter().map(|m| m.uid).max();

        // Group by reply headers, preserving first-seen thread order.
        let mut grouper = threading::ThreadGrouper::new();
        let mut thread_order: Vec<String> = Vec::new();
        let mut by_thread: HashMap<String, Vec<&FetchedMessage>> = HashMap::new();

        for message in messages {
            let thread_id = grouper.assign(&message.raw, message.uid);
            if !by_thread.contains_key(&thread_id) {
                thread_order.push(thread_id.clone());
            }
            by_thread.entry(thread_id).or_default().push(message);
        }

        let mut outcome = SyncOutcome {
            last_uid: advance_high_water.then_some(batch_max_uid).flatten(),
            ..SyncOutcome::default()
        };
        let mut contacts: HashMap<String, ContactSighting> = HashMap::new();

        for thread_id in &thread_order {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }

            let batch = &by_thread[thread_id];
            match self.write_thread(thread_id, batch, &mut contacts) {
                Ok(written) => {
                    outcome.threads_touched += 1;
                    outcome.messages_written += written;
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    // A broken thread does not abort the pass.
                    warn!(
                        account = %self.account,
                        thread = %thread_id,
                        "thread write failed: {}", e
                    );
                }
            }
        }

        for (email, sighting) in contacts {
            self.writer.record_contact(
                &email,
                sighting.name.as_deref(),
                sighting.first_seen,
                sighting.last_seen,
                &sighting.labels,
                sighting.count,
            )?;
        }

        info!(
            account = %self.account,
            threads = outcome.threads_touched,
            messages = outcome.messages_written,
            "batch persisted"
        );

        Ok(outcome)
    }

    /// Parse, clean, and write one thread's messages plus its metadata and
    /// index entry.
    fn write_thread(
        &self,
        thread_id: &str,
        batch: &[&FetchedMessage],
        contacts: &mut HashMap<String, ContactSighting>,
    ) -> Result<usize> {
        let mut parsed: Vec<(&FetchedMessage, ParsedMessage)> = Vec::with_capacity(batch.len());
        for fetched in batch {
            match parser::parse(&fetched.raw) {
                Ok(message) => parsed.push((fetched, message)),
                Err(e) => {
                    // A broken message does not abort its thread.
                    warn!(uid = fetched.uid, "unparseable message skipped: {}", e);
                }
            }
        }

        if parsed.is_empty() {
            return Err(Error::Parse("no parseable messages in thread".into()));
        }

        parsed.sort_by_key(|(_, m)| m.date);

        // The first message processed sets the thread subject; later
        // messages never retitle it.
        let subject = parsed[0].1.subject.clone();
        let first_date = parsed[0].1.date;
        let last_date = parsed[parsed.len() - 1].1.date;

        let mut written = 0usize;
        let mut attachments: Vec<AttachmentMeta> = Vec::new();
        let mut participants: Vec<Participant> = Vec::new();
        let mut labels: Vec<String> = Vec::new();
        let mut unread = false;
        let mut starred = false;
        let mut size_bytes = 0u64;
        let mut snippet = String::new();

        for (fetched, message) in &parsed {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }

            unread |= !fetched.is_seen();
            starred |= fetched.is_flagged();
            size_bytes += fetched.raw.len() as u64;

            // IMAP keyword flags (anything that is not a \System flag)
            // surface as thread labels.
            for flag in &fetched.flags {
                if !flag.starts_with('\\') && !labels.contains(flag) {
                    labels.push(flag.clone());
                }
            }

            let cleaned = clean::clean_message(
                message.text_body.as_deref(),
                message.html_body.as_deref(),
            );
            // The newest message's snippet represents the thread.
            snippet = cleaned.snippet.clone();

            let frontmatter = self.frontmatter_for(thread_id, fetched, message);
            self.writer
                .write_message(thread_id, &frontmatter, &cleaned.text)?;
            written += 1;

            let metas = self
                .writer
                .write_attachments(thread_id, &message.attachments)?;
            attachments.extend(metas);

            self.collect_participants(&mut participants, message);
            self.collect_contact(contacts, message, &fetched.flags);
        }

        let has_attachments = !attachments.is_empty();
        let newest = &parsed[parsed.len() - 1].1;

        let meta = ThreadMeta {
            id: thread_id.to_string(),
            subject: subject.clone(),
            labels: labels.clone(),
            unread,
            starred,
            participants: participants.clone(),
            first_date,
            last_date,
            message_count: written,
            has_attachments,
            attachments,
        };
        self.writer.write_thread_meta(&meta)?;

        self.writer.upsert_thread_index(&ThreadIndexEntry {
            id: thread_id.to_string(),
            subject,
            from: newest.from.email.clone(),
            from_name: newest.from.name.clone(),
            participants: participants.iter().map(|p| p.email.clone()).collect(),
            labels,
            unread,
            starred,
            msg_count: written,
            last_date,
            first_date,
            snippet,
            has_attachments,
            size_bytes,
        })?;

        Ok(written)
    }

    fn frontmatter_for(
        &self,
        thread_id: &str,
        fetched: &FetchedMessage,
        message: &ParsedMessage,
    ) -> Frontmatter {
        // On the IMAP path the provider message id is the UID.
        let message_id = fetched.uid.to_string();
        Frontmatter {
            id: message_id.clone(),
            message_id,
            thread_id: thread_id.to_string(),
            rfc822_message_id: message.message_id.clone(),
            in_reply_to: message.in_reply_to.clone(),
            references: message.references.clone(),
            from: message.from.clone(),
            to: message.to.clone(),
            cc: message.cc.clone(),
            date: message.date,
            uid: Some(fetched.uid),
        }
    }

    fn collect_participants(&self, participants: &mut Vec<Participant>, message: &ParsedMessage) {
        let mut push = |address: &Address| {
            if address.email.is_empty() {
                return;
            }
            let email = address.email.to_lowercase();
            if participants.iter().any(|p| p.email == email) {
                return;
            }
            let role = if is_self(&email, &self.account) {
                ParticipantRole::Owner
            } else {
                ParticipantRole::External
            };
            participants.push(Participant {
                email,
                name: address.name.clone(),
                role,
            });
        };

        push(&message.from);
        for addr in &message.to {
            push(addr);
        }
        for addr in &message.cc {
            push(addr);
        }
    }

    fn collect_contact(
        &self,
        contacts: &mut HashMap<String, ContactSighting>,
        message: &ParsedMessage,
        flags: &[String],
    ) {
        let email = message.from.email.to_lowercase();
        if email.is_empty() || is_self(&email, &self.account) {
            return;
        }

        let entry = contacts.entry(email).or_insert_with(|| ContactSighting {
            name: message.from.name.clone(),
            first_seen: message.date,
            last_seen: message.date,
            count: 0,
            labels: Vec::new(),
        });
        entry.first_seen = entry.first_seen.min(message.date);
        entry.last_seen = entry.last_seen.max(message.date);
        entry.count += 1;
        if entry.name.is_none() {
            entry.name = message.from.name.clone();
        }
        for flag in flags {
            if !flag.starts_with('\\') && !entry.labels.contains(flag) {
                entry.labels.push(flag.clone());
            }
        }
    }
}

/// Overrides for a one-shot (foreground) pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassOverrides {
    pub days: Option<i64>,
    pub max: Option<usize>,
    pub full: bool,
    pub unread: bool,
}

/// Run one pass for one account outside the scheduler, persisting state
/// the same way the scheduler would.
///
/// Unread-only passes neither advance the high-water mark nor update
/// `last_sync`.
pub async fn run_one_shot(
    paths: &CorpusPaths,
    config: &crate::config::Config,
    credentials: &dyn crate::config::CredentialProvider,
    account: &str,
    overrides: &PassOverrides,
) -> Result<SyncOutcome> {
    let mut state = crate::corpus::account_state::AccountState::load(paths, account)?;
    state.sync_state = crate::corpus::account_state::SyncState::Syncing;
    state.store(paths)?;

    let pass = if overrides.unread {
        SyncPass::UnreadOnly
    } else if overrides.full || state.last_uid.unwrap_or(0) == 0 {
        SyncPass::Full {
            days: overrides.days.unwrap_or(state.sync_depth_days),
            max: overrides.max,
        }
    } else {
        SyncPass::Incremental {
            last_uid: state.last_uid.unwrap_or(0),
        }
    };

    let result = async {
        let password = credentials.password_for(account)?;
        let mut client = ImapClient::new(crate::adapters::imap::ImapConfig {
            host: config.imap_host.clone(),
            port: config.imap_port,
            username: account.to_string(),
            password,
            all_mail_mailbox: config.all_mail_mailbox.clone(),
        });
        let ops = SyncOps::new(paths.clone(), account);
        let outcome = ops.run(&mut client, pass).await;
        client.disconnect().await;
        outcome
    }
    .await;

    match &result {
        Ok(outcome) => {
            if let Some(uid) = outcome.last_uid {
                state.advance_last_uid(uid);
            }
            if !overrides.unread {
                state.last_sync = Some(Utc::now());
            }
            state.sync_state = crate::corpus::account_state::SyncState::Idle;
        }
        Err(_) => {
            state.sync_state = crate::corpus::account_state::SyncState::Error;
        }
    }
    state.store(paths)?;

    result
}

/// Batch-local aggregation of one external sender.
struct ContactSighting {
    name: Option<String>,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    count: u64,
    labels: Vec<String>,
}
