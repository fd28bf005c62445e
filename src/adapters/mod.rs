//! Provider adapters: IMAP for the mirror, SMTP for the outbox.

pub mod imap;
pub mod smtp;
