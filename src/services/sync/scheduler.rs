//! Per-account polling scheduler.
//!
//! One scheduler owns one account's sync lifecycle: an immediate pass on
//! start (incremental when a high-water mark exists, full otherwise), then
//! a periodic timer at the account's poll interval. Ticks are single-flight:
//! a tick that finds a sync already in progress skips without queueing.
//! `stop()` lets an in-flight pass finish but cancels its remaining work at
//! the next boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use super::{SyncOps, SyncOutcome, SyncPass};
use crate::adapters::imap::{ImapClient, ImapConfig};
use crate::config::{Config, CredentialProvider};
use crate::corpus::account_state::{AccountState, SyncState};
use crate::corpus::paths::CorpusPaths;
use crate::error::Result;

/// Errors surfaced to the supervisor, alongside the owning account.
pub type ErrorSink = flume::Sender<(String, String)>;

pub struct Scheduler {
    account: String,
    paths: CorpusPaths,
    config: Config,
    credentials: Arc<dyn CredentialProvider>,
    running: AtomicBool,
    cancel: Arc<AtomicBool>,
    syncing: tokio::sync::Mutex<()>,
    stop_tx: flume::Sender<()>,
    stop_rx: flume::Receiver<()>,
    errors: Option<ErrorSink>,
}

impl Scheduler {
    pub fn new(
        paths: CorpusPaths,
        config: Config,
        credentials: Arc<dyn CredentialProvider>,
        account: &str,
        errors: Option<ErrorSink>,
    ) -> Self {
        let (stop_tx, stop_rx) = flume::bounded(1);
        Self {
            account: account.to_string(),
            paths,
            config,
            credentials,
            running: AtomicBool::new(false),
            cancel: Arc::new(AtomicBool::new(false)),
            syncing: tokio::sync::Mutex::new(()),
            stop_tx,
            stop_rx,
            errors,
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the polling loop on the runtime.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_loop().await })
    }

    /// Stop the loop. An in-flight sync completes its current write and
    /// bails at the next cancellation point.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.stop_tx.try_send(());
    }

    async fn run_loop(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!(account = %self.account, "scheduler started");

        // One pass immediately, then the timer.
        self.tick().await;

        while self.running.load(Ordering::SeqCst) {
            let interval = self.poll_interval();
            tokio::select! {
                _ = self.stop_rx.recv_async() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.tick().await;
        }

        info!(account = %self.account, "scheduler stopped");
    }

    fn poll_interval(&self) -> Duration {
        let seconds = AccountState::load(&self.paths, &self.account)
            .map(|s| s.poll_interval_seconds)
            .unwrap_or(60);
        Duration::from_secs(seconds.max(1))
    }

    /// Single-flight tick: skip when a sync is already in progress.
    async fn tick(&self) {
        let Ok(_guard) = self.syncing.try_lock() else {
            debug!(account = %self.account, "sync already in flight, skipping tick");
            return;
        };

        match self.run_pass().await {
            Ok(outcome) => {
                debug!(
                    account = %self.account,
                    threads = outcome.threads_touched,
                    messages = outcome.messages_written,
                    "sync pass complete"
                );
            }
            Err(e) => {
                error!(account = %self.account, "sync pass failed: {}", e);
                self.mark_error();
                if let Some(errors) = &self.errors {
                    let _ = errors.try_send((self.account.clone(), e.to_string()));
                }
                if e.is_fatal_for_account() {
                    // Auth failures are not retried; the account stays in
                    // error state until reconfigured.
                    self.running.store(false, Ordering::SeqCst);
                }
            }
        }
    }

    async fn run_pass(&self) -> Result<SyncOutcome> {
        let mut state = AccountState::load(&self.paths, &self.account)?;
        state.sync_state = SyncState::Syncing;
        state.store(&self.paths)?;

        let password = self.credentials.password_for(&self.account)?;
        let mut client = ImapClient::new(ImapConfig {
            host: self.config.imap_host.clone(),
            port: self.config.imap_port,
            username: self.account.clone(),
            password,
            all_mail_mailbox: self.config.all_mail_mailbox.clone(),
        });

        let pass = match state.last_uid {
            Some(last_uid) if last_uid > 0 => SyncPass::Incremental { last_uid },
            _ => SyncPass::Full {
                days: state.sync_depth_days,
                max: None,
            },
        };

        let ops = SyncOps::new(self.paths.clone(), &self.account)
            .with_cancel(Arc::clone(&self.cancel));
        let result = ops.run(&mut client, pass).await;
        client.disconnect().await;

        let outcome = result?;

        if let Some(uid) = outcome.last_uid {
            state.advance_last_uid(uid);
        }
        state.last_sync = Some(Utc::now());
        state.sync_state = SyncState::Idle;
        state.store(&self.paths)?;

        Ok(outcome)
    }

    fn mark_error(&self) {
        if let Ok(mut state) = AccountState::load(&self.paths, &self.account) {
            state.sync_state = SyncState::Error;
            if let Err(e) = state.store(&self.paths) {
                error!(account = %self.account, "could not persist error state: {}", e);
            }
        }
    }
}
