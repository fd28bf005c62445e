//! Exclusive PID file.
//!
//! One daemon per corpus: acquisition refuses to proceed while a live
//! process still holds the file. A stale file left by a dead process is
//! replaced silently.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::corpus::atomic;
use crate::corpus::paths::CorpusPaths;
use crate::error::{Error, Result};

/// Held for the life of the daemon; removing the file on drop.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write our PID, refusing if a live process already holds the file.
    pub fn acquire(paths: &CorpusPaths) -> Result<PidFile> {
        let path = paths.pid_file();

        if let Some(existing) = read_pid(paths) {
            if process_alive(existing) {
                return Err(Error::AlreadyRunning(existing));
            }
            debug!(pid = existing, "replacing stale pid file");
        }

        let pid = std::process::id();
        atomic::atomic_write_file(&path, format!("{}\n", pid).as_bytes())?;
        info!(pid = pid, path = %path.display(), "pid file acquired");
        Ok(PidFile { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Read the recorded PID, if any.
pub fn read_pid(paths: &CorpusPaths) -> Option<u32> {
    std::fs::read_to_string(paths.pid_file())
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Whether a process with this PID exists.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        // EPERM: the process exists but belongs to someone else.
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    // No cheap probe; assume alive and let the operator clean up.
    true
}

/// Ask a running daemon to shut down.
#[cfg(unix)]
pub fn signal_stop(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|e| Error::Config(format!("cannot signal pid {}: {}", pid, e)))
}

#[cfg(not(unix))]
pub fn signal_stop(pid: u32) -> Result<()> {
    Err(Error::Config(format!(
        "cannot signal pid {} on this platform",
        pid
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn paths(dir: &std::path::Path) -> CorpusPaths {
        CorpusPaths::new(Some(PathBuf::from(dir)))
    }

    #[test]
    fn test_acquire_writes_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(dir.path());

        let pidfile = PidFile::acquire(&paths).unwrap();
        assert_eq!(read_pid(&paths), Some(std::process::id()));
        drop(pidfile);
        assert!(read_pid(&paths).is_none());
    }

    #[test]
    fn test_acquire_refuses_live_holder() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(dir.path());

        // Our own (very much alive) process holds the file.
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(paths.pid_file(), format!("{}\n", std::process::id())).unwrap();

        match PidFile::acquire(&paths) {
            Err(Error::AlreadyRunning(pid)) => assert_eq!(pid, std::process::id()),
            other => panic!("expected AlreadyRunning, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_acquire_replaces_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(dir.path());

        // PID 0 is never a live user process from kill()'s perspective;
        // use an implausible value instead.
        std::fs::write(paths.pid_file(), "999999999\n").unwrap();

        let _pidfile = PidFile::acquire(&paths).unwrap();
        assert_eq!(read_pid(&paths), Some(std::process::id()));
    }
}
