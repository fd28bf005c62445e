//! Persisted per-account sync state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::corpus::atomic;
use crate::corpus::paths::CorpusPaths;
use crate::error::Result;

/// Where an account's scheduler currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Syncing,
    Error,
}

/// Contents of `accounts/<email>/account.json`.
///
/// Owned exclusively by the scheduler for that account; concurrent writers
/// are ruled out by the daemon PID file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountState {
    pub email: String,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    /// High-water mark for incremental sync; monotonically non-decreasing
    /// across successful syncs.
    #[serde(default)]
    pub last_uid: Option<u64>,
    #[serde(default = "default_sync_depth_days")]
    pub sync_depth_days: i64,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_sync_state")]
    pub sync_state: SyncState,
}

fn default_sync_depth_days() -> i64 {
    30
}

fn default_poll_interval_seconds() -> u64 {
    60
}

fn default_sync_state() -> SyncState {
    SyncState::Idle
}

impl AccountState {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            last_sync: None,
            last_uid: None,
            sync_depth_days: default_sync_depth_days(),
            poll_interval_seconds: default_poll_interval_seconds(),
            sync_state: default_sync_state(),
        }
    }

    /// Load the state file, or a fresh default when none exists yet.
    pub fn load(paths: &CorpusPaths, email: &str) -> Result<Self> {
        let path = paths.account_state_file(email);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new(email)),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist atomically.
    pub fn store(&self, paths: &CorpusPaths) -> Result<()> {
        atomic::atomic_write_json(&paths.account_state_file(&self.email), self)
    }

    /// Raise the high-water mark. Lower values are ignored so the mark never
    /// regresses.
    pub fn advance_last_uid(&mut self, uid: u64) {
        match self.last_uid {
            Some(current) if current >= uid => {}
            _ => self.last_uid = Some(uid),
        }
    }
}
