//! The on-disk corpus: path resolution, atomic writers, JSONL indexes,
//! account state, and the storage writer.
//!
//! The filesystem layout is the API surface of the daemon; downstream
//! programs read the JSONL indexes, per-thread JSON, and Markdown messages
//! directly. Everything written here is whole-file atomic so those readers
//! never observe a partial write.

pub mod account_state;
pub mod atomic;
pub mod jsonl;
pub mod paths;
pub mod writer;

pub use account_state::{AccountState, SyncState};
pub use paths::CorpusPaths;
pub use writer::StorageWriter;
