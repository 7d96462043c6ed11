//! World initialization, raced against server liveness.
//!
//! A partially-initialized world is unsafe to proceed with, so a failed
//! load kills the whole server session (cascading failure policy).

use std::time::Duration;

use contracts::{SessionError, SessionResult};
use sim_client::SimulatorClient;
use sync_protocol::ReadySignal;
use tracing::{info, instrument, warn};

use crate::registry::ProcessRegistry;

/// Long fixed timeout for the blocking load-map request; there is no retry
/// within an attempt, only at the top-level attempt loop.
const WORLD_LOAD_TIMEOUT: Duration = Duration::from_secs(1000);

/// Liveness poll interval while the load runs
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Issues the load-world request on a worker task and polls it against
/// server liveness.
pub struct WorldInitializer;

impl WorldInitializer {
    /// Load a map, racing the request against the server's liveness.
    ///
    /// Polls two conditions: the server pid disappearing (the worker is
    /// aborted and the attempt fails) and the worker finishing (success is
    /// signalled via a one-shot flag; if unset, the server is killed and
    /// the attempt fails).
    #[instrument(name = "world_load", skip(client, registry), fields(town = %town, server_pid))]
    pub async fn load_world<C>(
        client: &C,
        town: &str,
        server_pid: u32,
        registry: &ProcessRegistry,
    ) -> SessionResult<()>
    where
        C: SimulatorClient + Clone,
    {
        let loaded = ReadySignal::new();
        let flag = loaded.clone();
        let worker_client = client.clone();
        let town_owned = town.to_string();

        let worker = tokio::spawn(async move {
            match worker_client.load_world(&town_owned, WORLD_LOAD_TIMEOUT).await {
                Ok(()) => flag.set(),
                Err(e) => warn!(error = %e, "load-world request failed"),
            }
        });

        loop {
            if !registry.pid_exists(server_pid) {
                worker.abort();
                return Err(SessionError::SimulatorCrashed {
                    pid: server_pid,
                    message: "simulator died while loading the world".into(),
                });
            }

            if worker.is_finished() {
                let _ = worker.await;
                if loaded.is_set() {
                    info!("world set up");
                    return Ok(());
                }
                // A half-loaded world cannot be recovered; take the server
                // down with the attempt.
                registry.kill(server_pid);
                return Err(SessionError::WorldLoad {
                    town: town.to_string(),
                    message: "load request did not complete; simulator killed".into(),
                });
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_client::{MockConfig, MockSimulator};

    async fn connected(config: MockConfig) -> MockSimulator {
        let mut sim = MockSimulator::with_config(config);
        sim.connect("127.0.0.1", 2000, Duration::from_secs(1))
            .await
            .unwrap();
        sim
    }

    #[tokio::test]
    async fn successful_load_sets_the_map() {
        let sim = connected(MockConfig::default()).await;
        let registry = ProcessRegistry::new();
        // Our own pid stands in for a live server
        let self_pid = std::process::id();

        WorldInitializer::load_world(&sim, "Town10HD", self_pid, &registry)
            .await
            .unwrap();
        assert_eq!(sim.loaded_map().as_deref(), Some("Town10HD"));
    }

    #[tokio::test]
    async fn failed_load_kills_the_server() {
        let sim = connected(MockConfig {
            fail_world_load: true,
            ..Default::default()
        })
        .await;
        let registry = ProcessRegistry::new();

        // A real process stands in for the server so the cascading kill
        // is observable.
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let server_pid = child.id();

        let err = WorldInitializer::load_world(&sim, "Town03", server_pid, &registry)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::WorldLoad { .. }));

        let _ = child.wait();
        assert!(!registry.pid_exists(server_pid));
    }

    #[tokio::test]
    async fn dead_server_aborts_the_load() {
        let sim = connected(MockConfig {
            // Long enough that the liveness poll fires first
            world_load_delay: Duration::from_secs(30),
            ..Default::default()
        })
        .await;
        let registry = ProcessRegistry::new();

        // A pid that is already gone
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        let _ = child.wait();

        let err = WorldInitializer::load_world(&sim, "Town03", dead_pid, &registry)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::SimulatorCrashed { .. }));
    }
}
