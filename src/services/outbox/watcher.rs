//! Outbox directory watcher.
//!
//! Watches `outbox/` for draft JSON files, debounces until a file's size
//! has been stable for at least 500 ms (external producers write
//! non-atomically), then runs each settled draft through validation, the
//! optional auto-promotion, and dispatch. A startup sweep processes files
//! that were already present, which is how dispatch recovers after a crash.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};

use super::machine::{self, TransitionMeta};
use crate::adapters::smtp::{SmtpConfig, SmtpSender};
use crate::config::{Config, CredentialProvider};
use crate::corpus::paths::CorpusPaths;
use crate::error::{Error, Result};
use crate::types::draft::DraftStatus;

/// Required window of size stability before a draft is touched.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);
/// Give up waiting for a file to settle after this many windows.
const DEBOUNCE_MAX_WINDOWS: u32 = 60;

pub struct OutboxWatcher {
    account: String,
    paths: CorpusPaths,
    config: Config,
    credentials: Arc<dyn CredentialProvider>,
    running: AtomicBool,
    stop_tx: flume::Sender<()>,
    stop_rx: flume::Receiver<()>,
    /// Draft filenames with a dispatch in flight; the filename is the lock
    /// key.
    in_flight: Mutex<HashSet<String>>,
    errors: Option<flume::Sender<(String, String)>>,
}

impl OutboxWatcher {
    pub fn new(
        paths: CorpusPaths,
        config: Config,
        credentials: Arc<dyn CredentialProvider>,
        account: &str,
        errors: Option<flume::Sender<(String, String)>>,
    ) -> Self {
        let (stop_tx, stop_rx) = flume::bounded(1);
        Self {
            account: account.to_string(),
            paths,
            config,
            credentials,
            running: AtomicBool::new(false),
            stop_tx,
            stop_rx,
            in_flight: Mutex::new(HashSet::new()),
            errors,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.run_loop().await {
                error!(account = %this.account, "outbox watcher failed: {}", e);
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.try_send(());
    }

    async fn run_loop(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);

        let outbox_dir = self.paths.outbox_dir(&self.account);
        std::fs::create_dir_all(&outbox_dir)?;

        info!(account = %self.account, dir = %outbox_dir.display(), "outbox watcher started");

        self.startup_sweep(&outbox_dir).await;

        let (tx, rx) = flume::unbounded::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        watcher
            .watch(&outbox_dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

        while self.running.load(Ordering::SeqCst) {
            let event = tokio::select! {
                _ = self.stop_rx.recv_async() => break,
                event = rx.recv_async() => event,
            };

            let event = match event {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => {
                    warn!(account = %self.account, "watch event error: {}", e);
                    continue;
                }
                // Watcher thread gone; nothing more will arrive.
                Err(_) => break,
            };

            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                continue;
            }

            for path in event.paths {
                if !is_draft_file(&path) {
                    continue;
                }
                self.settle_and_process(&path).await;
            }
        }

        info!(account = %self.account, "outbox watcher stopped");
        Ok(())
    }

    /// Process drafts that were already in the outbox when the watcher
    /// started, as though a fresh event had arrived for each.
    async fn startup_sweep(&self, outbox_dir: &Path) {
        let entries = match std::fs::read_dir(outbox_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(account = %self.account, "cannot sweep outbox: {}", e);
                return;
            }
        };

        let pending: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| is_draft_file(p))
            .collect();

        if pending.is_empty() {
            return;
        }

        info!(
            account = %self.account,
            count = pending.len(),
            "sweeping existing outbox drafts"
        );

        for path in pending {
            self.settle_and_process(&path).await;
        }
    }

    /// Wait for the file size to hold still for a full debounce window,
    /// then process. A file that disappears while settling is ignored.
    async fn settle_and_process(&self, path: &Path) {
        let mut last_size: Option<u64> = None;

        for _ in 0..DEBOUNCE_MAX_WINDOWS {
            let size = match std::fs::metadata(path) {
                Ok(meta) => meta.len(),
                Err(_) => return,
            };
            if last_size == Some(size) && size > 0 {
                self.process_draft(path).await;
                return;
            }
            last_size = Some(size);
            tokio::time::sleep(DEBOUNCE_WINDOW).await;
        }

        warn!(
            account = %self.account,
            path = %path.display(),
            "draft never settled, giving up"
        );
    }

    async fn process_draft(&self, path: &Path) {
        let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(String::from)
        else {
            return;
        };

        // One in-flight send per draft filename.
        {
            let mut in_flight = self.in_flight.lock().expect("in-flight set poisoned");
            if !in_flight.insert(filename.clone()) {
                debug!(draft = %filename, "dispatch already in flight, skipping");
                return;
            }
        }

        let result = self.handle_draft(&filename).await;

        self.in_flight
            .lock()
            .expect("in-flight set poisoned")
            .remove(&filename);

        if let Err(e) = result {
            error!(account = %self.account, draft = %filename, "draft error: {}", e);
            if let Some(errors) = &self.errors {
                let _ = errors.try_send((self.account.clone(), format!("{}: {}", filename, e)));
            }
        }
    }

    async fn handle_draft(&self, filename: &str) -> Result<()> {
        let mut draft = machine::read_draft(&self.paths, &self.account, filename)?;
        draft.validate()?;

        if draft.status == DraftStatus::PendingReview && !self.config.review_before_send {
            draft = machine::transition(
                &self.paths,
                &self.account,
                filename,
                DraftStatus::ReadyToSend,
                TransitionMeta::default(),
            )?;
            debug!(draft = %filename, "auto-promoted to ready_to_send");
        }

        if draft.status != DraftStatus::ReadyToSend {
            if draft.status == DraftStatus::Sending {
                warn!(
                    draft = %filename,
                    "draft stuck in 'sending' (crashed mid-dispatch?), leaving untouched"
                );
            }
            return Ok(());
        }

        // Resolve credentials before touching the draft state so a missing
        // password cannot strand it in `sending`.
        let sender = self.build_sender()?;

        machine::transition(
            &self.paths,
            &self.account,
            filename,
            DraftStatus::Sending,
            TransitionMeta::default(),
        )?;

        match sender.send(&draft).await {
            Ok(outcome) => {
                machine::transition(
                    &self.paths,
                    &self.account,
                    filename,
                    DraftStatus::Sent,
                    TransitionMeta {
                        provider_message_id: Some(outcome.provider_message_id),
                        error: None,
                    },
                )?;
            }
            Err(e) => {
                machine::transition(
                    &self.paths,
                    &self.account,
                    filename,
                    DraftStatus::Failed,
                    TransitionMeta {
                        provider_message_id: None,
                        error: Some(e.to_string()),
                    },
                )?;
            }
        }

        Ok(())
    }

    fn build_sender(&self) -> Result<SmtpSender> {
        let password = self.credentials.password_for(&self.account)?;
        Ok(SmtpSender::new(
            SmtpConfig {
                host: self.config.smtp_host.clone(),
                port: self.config.smtp_port,
                username: self.account.clone(),
                password,
            },
            &self.account,
        ))
    }
}

/// Drafts are `*.json`; anything ending in `.tmp` is a writer's scratch
/// file.
fn is_draft_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".json") && !name.ends_with(".tmp")
}
