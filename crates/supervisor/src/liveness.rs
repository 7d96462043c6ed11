//! OS process liveness probes and kills, via sysinfo.

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{info, warn};

/// Whether a process with the given pid currently exists
pub fn pid_exists(pid: u32) -> bool {
    let target = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    sys.process(target).is_some()
}

/// SIGKILL a single process. Returns false when the process was not found
/// or refused the signal; failures are logged, never escalated.
///
/// Refuses to kill the calling process: in mock mode our own pid stands in
/// for the server's in liveness polls, and a cascading kill must not take
/// the recorder down with it.
pub fn kill_pid(pid: u32) -> bool {
    if pid == std::process::id() {
        warn!(pid, "refusing to kill own process");
        return false;
    }
    let target = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    match sys.process(target) {
        Some(process) => {
            let killed = process.kill();
            if !killed {
                warn!(pid, "not able to kill process");
            }
            killed
        }
        None => false,
    }
}

/// SIGKILL every process whose name contains `name`.
///
/// Enforces the at-most-one-instance invariant before launching a fresh
/// server. Returns the number of processes killed.
pub fn kill_processes_named(name: &str) -> usize {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    let mut killed = 0;
    for (pid, process) in sys.processes() {
        if process.name().to_string_lossy().contains(name) {
            info!(pid = pid.as_u32(), name, "killing already-running server instance");
            if process.kill() {
                killed += 1;
            } else {
                warn!(pid = pid.as_u32(), "not able to kill process");
            }
        }
    }
    killed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::Duration;

    #[test]
    fn pid_exists_tracks_real_processes() {
        // Our own pid always exists
        assert!(pid_exists(std::process::id()));

        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        assert!(pid_exists(pid));

        assert!(kill_pid(pid));
        let _ = child.wait();
        // Reaped: the pid is gone
        std::thread::sleep(Duration::from_millis(50));
        assert!(!pid_exists(pid));
    }

    #[test]
    fn kill_unknown_pid_reports_false() {
        // Pids wrap around well below this on Linux
        assert!(!kill_pid(u32::MAX - 1));
    }

    #[test]
    fn own_process_is_never_killed() {
        assert!(!kill_pid(std::process::id()));
        assert!(pid_exists(std::process::id()));
    }
}
