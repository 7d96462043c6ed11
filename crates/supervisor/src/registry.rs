//! ProcessRegistry - tracked process ids for later cleanup.
//!
//! Explicit shared state passed by handle instead of a process-global list;
//! every spawned external process is tracked here so the attempt loop and
//! the interrupt path can tear everything down.

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::liveness;

/// Shared registry of spawned process ids
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    pids: Arc<Mutex<Vec<u32>>>,
}

impl ProcessRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a process id for later cleanup
    pub fn track(&self, pid: u32) {
        self.pids.lock().unwrap().push(pid);
    }

    /// Currently tracked pids
    pub fn tracked(&self) -> Vec<u32> {
        self.pids.lock().unwrap().clone()
    }

    /// Whether a pid is still alive
    pub fn pid_exists(&self, pid: u32) -> bool {
        liveness::pid_exists(pid)
    }

    /// SIGKILL a single tracked or untracked pid
    pub fn kill(&self, pid: u32) {
        liveness::kill_pid(pid);
    }

    /// SIGKILL every tracked process and forget them.
    ///
    /// Best-effort: kill failures are logged inside [`liveness::kill_pid`],
    /// never escalated.
    pub fn kill_all(&self) {
        let pids: Vec<u32> = std::mem::take(&mut *self.pids.lock().unwrap());
        for pid in pids {
            info!(pid, "killing tracked process");
            liveness::kill_pid(pid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn kill_all_clears_tracked_processes() {
        let registry = ProcessRegistry::new();

        let mut children: Vec<_> = (0..2)
            .map(|_| Command::new("sleep").arg("30").spawn().unwrap())
            .collect();
        for child in &children {
            registry.track(child.id());
        }
        assert_eq!(registry.tracked().len(), 2);

        registry.kill_all();
        for child in &mut children {
            let _ = child.wait();
        }

        assert!(registry.tracked().is_empty());
        for child in &children {
            assert!(!registry.pid_exists(child.id()));
        }
    }

    #[test]
    fn clones_share_the_pid_list() {
        let registry = ProcessRegistry::new();
        let clone = registry.clone();
        registry.track(12345);
        assert_eq!(clone.tracked(), vec![12345]);
    }
}
