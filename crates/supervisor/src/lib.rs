//! # Supervisor
//!
//! Launches and monitors the simulator server process and drives the
//! blocking world-load request.
//!
//! All crash detection is OS-process-id existence polling; there is no
//! heartbeat protocol. A dead peer is detected by `pid_exists`, not by
//! message timeout alone.

mod liveness;
mod registry;
mod server;
mod world;

pub use liveness::{kill_pid, kill_processes_named, pid_exists};
pub use registry::ProcessRegistry;
pub use server::{connect_with_budget, ServerConfig, ServerHandle, ServerSupervisor};
pub use world::WorldInitializer;
