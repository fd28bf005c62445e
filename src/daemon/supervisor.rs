//! Daemon supervisor.
//!
//! Owns the per-account schedulers and outbox watchers: config load, PID
//! file, startup, and signal-driven orderly shutdown.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::pidfile::PidFile;
use crate::config::{Config, CredentialProvider};
use crate::corpus::paths::CorpusPaths;
use crate::error::{Error, Result};
use crate::services::outbox::OutboxWatcher;
use crate::services::sync::scheduler::Scheduler;

/// How long shutdown waits for in-flight work per task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub struct Supervisor {
    paths: CorpusPaths,
    config: Config,
    credentials: Arc<dyn CredentialProvider>,
}

impl Supervisor {
    pub fn new(
        paths: CorpusPaths,
        config: Config,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            paths,
            config,
            credentials,
        }
    }

    /// Run until a termination signal arrives. Holds the PID file for the
    /// whole lifetime.
    pub async fn run(&self, only_account: Option<&str>) -> Result<()> {
        let _pid_file = PidFile::acquire(&self.paths)?;

        let accounts: Vec<String> = self
            .config
            .accounts
            .iter()
            .filter(|email| only_account.map_or(true, |only| only == email.as_str()))
            .cloned()
            .collect();

        if accounts.is_empty() {
            return Err(match only_account {
                Some(email) => Error::AccountNotFound(email.to_string()),
                None => Error::Config("no accounts configured".into()),
            });
        }

        info!(accounts = accounts.len(), "daemon starting");

        // Per-account errors funnel here; the daemon outlives them all.
        let (error_tx, error_rx) = flume::unbounded::<(String, String)>();
        let error_logger = tokio::spawn(async move {
            while let Ok((account, message)) = error_rx.recv_async().await {
                error!(account = %account, "surfaced: {}", message);
            }
        });

        let mut schedulers: Vec<Arc<Scheduler>> = Vec::new();
        let mut watchers: Vec<Arc<OutboxWatcher>> = Vec::new();
        let mut handles = Vec::new();

        for email in &accounts {
            let scheduler = Arc::new(Scheduler::new(
                self.paths.clone(),
                self.config.clone(),
                Arc::clone(&self.credentials),
                email,
                Some(error_tx.clone()),
            ));
            handles.push(scheduler.spawn());
            schedulers.push(scheduler);

            let watcher = Arc::new(OutboxWatcher::new(
                self.paths.clone(),
                self.config.clone(),
                Arc::clone(&self.credentials),
                email,
                Some(error_tx.clone()),
            ));
            handles.push(watcher.spawn());
            watchers.push(watcher);
        }

        wait_for_shutdown_signal().await;
        info!("shutdown signal received");

        for scheduler in &schedulers {
            scheduler.stop();
        }
        for watcher in &watchers {
            watcher.stop();
        }

        for handle in handles {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("task did not stop within grace period");
            }
        }

        drop(error_tx);
        let _ = tokio::time::timeout(Duration::from_secs(1), error_logger).await;

        info!("daemon stopped");
        Ok(())
    }
}

/// Block until SIGINT or SIGTERM (ctrl-c only on non-unix platforms).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                error!("cannot install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
