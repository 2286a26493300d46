//! Local process helpers: liveness checks and tool discovery.

use std::path::PathBuf;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

use crate::error::{MigrateError, Result};

/// Check if a process is alive by sending it signal 0.
///
/// `EPERM` means the process exists but belongs to someone else, so it
/// still counts as alive. Any other error (usually `ESRCH`) means it is gone.
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Answers whether a tracked process is still running.
pub trait LivenessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by the OS process table.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsLivenessProbe;

impl LivenessProbe for OsLivenessProbe {
    fn is_alive(&self, pid: u32) -> bool {
        is_process_alive(pid)
    }
}

/// Resolve a required local binary on `PATH`.
pub fn require_binary(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| {
        MigrateError::Config(format!(
            "'{}' was not found on PATH; install it before migrating",
            name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_current_process() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(u32::MAX));
        assert!(!is_process_alive(0));
    }

    #[tokio::test]
    async fn test_exited_child_is_not_alive() {
        let mut child = tokio::process::Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();
        assert!(!is_process_alive(pid));
    }

    #[test]
    fn test_require_binary() {
        assert!(require_binary("sh").is_ok());
        assert!(require_binary("definitely-not-a-real-binary-prestaops").is_err());
    }
}
