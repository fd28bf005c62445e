use crate::types::draft::DraftStatus;

/// Crate-wide error type.
///
/// The variants map onto the failure classes the daemon distinguishes at
/// runtime: `Auth` parks an account until it is reconfigured, `Imap`/`Smtp`
/// are retried on the next scheduler tick, `Parse` skips the offending item,
/// and `Io`/`Json` abort the current pass.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid draft: {0}")]
    InvalidDraft(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: DraftStatus, to: DraftStatus },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Daemon already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("Sync cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures that should not be retried on the next tick.
    pub fn is_fatal_for_account(&self) -> bool {
        matches!(self, Error::Auth(_))
    }
}
