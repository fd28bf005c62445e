//! maildeck - an agent-native local email client.
//!
//! A background daemon continuously mirrors a remote mailbox (Gmail over
//! IMAP/SMTP) onto the local filesystem as a human- and machine-readable
//! corpus, and watches a filesystem outbox for outbound drafts to ship
//! through the provider. The filesystem layout is the API surface:
//! downstream programs read JSONL indexes, per-thread JSON, and Markdown
//! messages, and drop JSON drafts to send.
//!
//! ## Module Organization
//!
//! - `adapters/`: IMAP and SMTP provider adapters
//! - `corpus/`: paths, atomic writers, JSONL indexes, account state,
//!   storage writer
//! - `mail/`: MIME decoding, header scanning, address handling
//! - `services/sync/`: sync passes, cleaning pipeline, thread grouper,
//!   scheduler
//! - `services/outbox/`: draft state machine and directory watcher
//! - `daemon/`: PID file and supervisor
//! - `types/`: corpus data model and typed drafts
//! - `config/`: configuration and the credential seam

pub mod adapters;
pub mod config;
pub mod corpus;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod mail;
pub mod services;
pub mod types;

pub use error::{Error, Result};
