//! Daemon process plumbing: PID file and supervisor.

pub mod pidfile;
pub mod supervisor;

pub use supervisor::Supervisor;
