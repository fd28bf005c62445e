//! Daemon configuration.
//!
//! `config.json` lives at the corpus base and is written by the external
//! setup flow; the daemon only reads it (and `status` re-reads it per
//! invocation). Provider fields default to the Gmail endpoints and exist
//! mostly so tests can point at a local server.

use serde::{Deserialize, Serialize};

use crate::corpus::atomic;
use crate::corpus::paths::CorpusPaths;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// When false, drafts in `pending_review` are auto-promoted to
    /// `ready_to_send` by the outbox watcher.
    #[serde(default = "default_true")]
    pub review_before_send: bool,

    /// Connected account addresses.
    #[serde(default)]
    pub accounts: Vec<String>,

    #[serde(default = "default_imap_host")]
    pub imap_host: String,
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Locale-dependent; when the configured name is missing the IMAP client
    /// falls back to the mailbox advertising the `\All` special use.
    #[serde(default = "default_all_mail")]
    pub all_mail_mailbox: String,
}

fn default_true() -> bool {
    true
}

fn default_imap_host() -> String {
    "imap.gmail.com".to_string()
}

fn default_imap_port() -> u16 {
    993
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    465
}

fn default_all_mail() -> String {
    "[Gmail]/All Mail".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            review_before_send: true,
            accounts: Vec::new(),
            imap_host: default_imap_host(),
            imap_port: default_imap_port(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            all_mail_mailbox: default_all_mail(),
        }
    }
}

impl Config {
    pub fn load(paths: &CorpusPaths) -> Result<Self> {
        let path = paths.config_file();
        let text = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Config(format!(
                    "no config at {} (run setup first)",
                    path.display()
                ))
            } else {
                Error::Io(e)
            }
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn store(&self, paths: &CorpusPaths) -> Result<()> {
        atomic::atomic_write_json(&paths.config_file(), self)
    }
}

/// Seam for the out-of-scope credential store.
///
/// The setup CLI keeps app passwords in the OS keychain; the daemon only
/// needs a way to ask for one.
pub trait CredentialProvider: Send + Sync {
    fn password_for(&self, email: &str) -> Result<String>;
}

/// Environment-backed credentials: `MAILDECK_APP_PASSWORD_<MANGLED_EMAIL>`
/// first, then the account-agnostic `MAILDECK_APP_PASSWORD`.
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn password_for(&self, email: &str) -> Result<String> {
        let mangled: String = email
            .to_uppercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();

        std::env::var(format!("MAILDECK_APP_PASSWORD_{}", mangled))
            .or_else(|_| std::env::var("MAILDECK_APP_PASSWORD"))
            .map_err(|_| {
                Error::Auth(format!("no app password available for {}", email))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.review_before_send);
        assert!(config.accounts.is_empty());
        assert_eq!(config.imap_host, "imap.gmail.com");
        assert_eq!(config.imap_port, 993);
        assert_eq!(config.smtp_host, "smtp.gmail.com");
        assert_eq!(config.smtp_port, 465);
        assert_eq!(config.all_mail_mailbox, "[Gmail]/All Mail");
    }

    #[test]
    fn test_store_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = CorpusPaths::new(Some(PathBuf::from(dir.path())));

        let config = Config {
            review_before_send: false,
            accounts: vec!["me@gmail.com".into()],
            ..Config::default()
        };
        config.store(&paths).unwrap();

        let loaded = Config::load(&paths).unwrap();
        assert!(!loaded.review_before_send);
        assert_eq!(loaded.accounts, vec!["me@gmail.com".to_string()]);
    }

    #[test]
    fn test_load_missing_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = CorpusPaths::new(Some(PathBuf::from(dir.path())));
        match Config::load(&paths) {
            Err(Error::Config(_)) => {}
            other => panic!("expected Config error, got {:?}", other.map(|_| ())),
        }
    }
}
