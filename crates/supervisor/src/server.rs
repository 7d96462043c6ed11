//! Server launch and startup detection.
//!
//! The server is spawned detached with its output redirected to a fresh log
//! file. The log's line count is the only "has it begun accepting
//! connections" signal the server offers this early, so startup is detected
//! by polling it; the client connection is then retried with short
//! per-attempt timeouts inside the overall wait budget.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use contracts::{SessionError, SessionResult};
use sim_client::SimulatorClient;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::liveness::kill_processes_named;
use crate::registry::ProcessRegistry;

/// Log lines that must appear before the server is considered started
const STARTUP_LOG_LINES: usize = 2;

/// Poll interval for the log file and connection retries
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Per-attempt connection timeout
const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Server launch configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server executable
    pub executable: PathBuf,

    /// RPC port passed on the command line
    pub rpc_port: u16,

    /// Show the simulator window instead of off-screen rendering
    pub show_window: bool,

    /// Log file receiving stdout + stderr, truncated at launch
    pub log_path: PathBuf,

    /// Overall wall-clock budget for startup + first connection
    pub wait_budget: Duration,
}

impl ServerConfig {
    /// Build a config from a CARLA install directory, validating that the
    /// expected server executable is present.
    pub fn from_install_dir(
        install_dir: &Path,
        rpc_port: u16,
        show_window: bool,
        log_path: PathBuf,
    ) -> SessionResult<Self> {
        if !install_dir.is_dir() {
            return Err(SessionError::server_launch(format!(
                "the given CARLA path doesn't exist: {}",
                install_dir.display()
            )));
        }
        let executable = install_dir
            .join("CarlaUE4")
            .join("Binaries")
            .join("Linux")
            .join("CarlaUE4-Linux-Shipping");
        if !executable.is_file() {
            return Err(SessionError::server_launch(format!(
                "cannot find the server executable at {}",
                executable.display()
            )));
        }
        Ok(Self {
            executable,
            rpc_port,
            show_window,
            log_path,
            wait_budget: Duration::from_secs(100),
        })
    }

    fn process_name(&self) -> String {
        self.executable
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "CarlaUE4-Linux-Shipping".to_string())
    }
}

/// Handle to the launched server process
#[derive(Debug)]
pub struct ServerHandle {
    pid: u32,
    child: Child,
}

impl ServerHandle {
    /// OS process id of the server
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the process has exited (non-blocking)
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }
}

/// Launches the simulator server and waits until it accepts connections
pub struct ServerSupervisor;

impl ServerSupervisor {
    /// Launch the server process.
    ///
    /// Pre-kills any identically-named process already running, truncates
    /// the log file, spawns the server with output redirected to it, then
    /// polls the log until startup or the child's early death.
    ///
    /// On budget exhaustion the process is left running: the caller decides
    /// whether to kill it via the registry.
    #[instrument(name = "server_launch", skip(config, registry), fields(port = config.rpc_port))]
    pub async fn launch(
        config: &ServerConfig,
        registry: &ProcessRegistry,
    ) -> SessionResult<ServerHandle> {
        let killed = kill_processes_named(&config.process_name());
        if killed > 0 {
            info!(killed, "another server instance was running and has been killed");
        }

        let log_file = prepare_log_file(&config.log_path)?;
        let err_file = log_file.try_clone()?;

        let mut command = Command::new(&config.executable);
        command
            .arg("-nosound")
            .arg(format!("-carla-rpc-port={}", config.rpc_port))
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(err_file));
        if !config.show_window {
            command.arg("-RenderOffScreen");
        }

        let mut child = command.spawn().map_err(|e| {
            SessionError::server_launch(format!(
                "failed to spawn {}: {e}",
                config.executable.display()
            ))
        })?;
        let pid = child.id();
        registry.track(pid);
        info!(pid, log = %config.log_path.display(), "server process spawned");

        let deadline = Instant::now() + config.wait_budget;
        wait_for_startup_lines(&config.log_path, &mut child, deadline).await?;

        Ok(ServerHandle { pid, child })
    }
}

fn prepare_log_file(log_path: &Path) -> SessionResult<File> {
    if let Some(dir) = log_path.parent() {
        fs::create_dir_all(dir)?;
    }
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)?)
}

/// Poll the log file's line count as a crude startup signal.
///
/// Fails immediately if the child exits first (the process died before
/// logging), or when the deadline passes with the log never growing.
pub(crate) async fn wait_for_startup_lines(
    log_path: &Path,
    child: &mut Child,
    deadline: Instant,
) -> SessionResult<()> {
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;

        let lines = count_lines(log_path)?;
        if lines >= STARTUP_LOG_LINES {
            debug!(lines, "server log shows startup output");
            return Ok(());
        }

        if let Some(status) = child.try_wait()? {
            return Err(SessionError::server_launch(format!(
                "server process exited with {status} before logging started"
            )));
        }

        if Instant::now() >= deadline {
            return Err(SessionError::server_launch(
                "server log never grew within the wait budget",
            ));
        }
    }
}

fn count_lines(path: &Path) -> SessionResult<usize> {
    let file = File::open(path)?;
    Ok(BufReader::new(file).lines().count())
}

/// Repeatedly attempt to connect until success or the deadline passes.
///
/// Each attempt uses a short timeout so a hung RPC endpoint cannot eat the
/// whole budget.
pub async fn connect_with_budget<C: SimulatorClient>(
    client: &mut C,
    host: &str,
    port: u16,
    deadline: Instant,
) -> SessionResult<()> {
    let started = Instant::now();
    loop {
        match client.connect(host, port, CONNECT_ATTEMPT_TIMEOUT).await {
            Ok(()) => {
                info!(host, port, "connected to simulator");
                return Ok(());
            }
            Err(e) => {
                if Instant::now() >= deadline {
                    return Err(SessionError::ServerConnect {
                        host: host.to_string(),
                        port,
                        waited_secs: started.elapsed().as_secs(),
                    });
                }
                debug!(error = %e, "connection attempt failed, retrying");
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}
