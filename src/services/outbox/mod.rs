//! The outbox: a watched directory of draft JSON files, a constrained
//! state machine, and SMTP dispatch with durable success/failure
//! quarantine.
//!
//! External producers drop drafts into `outbox/`; terminal transitions move
//! them to `sent/` or `failed/`, so a draft file exists in exactly one of
//! the three directories at any time.

pub mod machine;
pub mod watcher;

pub use machine::{transition, TransitionMeta};
pub use watcher::OutboxWatcher;
