//! IMAP adapter.

pub mod client;
pub mod connection;

pub use client::{FetchedMessage, ImapClient, ImapConfig};
