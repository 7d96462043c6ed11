//! Pipeline orchestrator: the top-level attempt loop and the per-attempt
//! session wiring (server, world, traffic, capture, monitor loop).
//!
//! Supports the real CARLA client and mock mode via feature flags. When
//! `real-carla` is disabled, the whole protocol runs against the mock
//! simulator and no server process is launched.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use capture::{CaptureSession, PersistedArtifacts, SessionEvents};
use contracts::{town_name, SessionBlueprint, SessionError, SessionResult};
use sim_client::SimulatorClient;
use storage::AttemptLayout;
use supervisor::{ProcessRegistry, WorldInitializer};
use sync_protocol::{Handshake, ReadySignal};
use traffic::{TrafficCoordinator, TrafficParams, TrafficTiming};
use tracing::{info, warn};

use super::SessionStats;

/// Bound on locating the hero vehicle before the attempt is failed
const HERO_DEADLINE: Duration = Duration::from_secs(10);

/// Monitor loop poll interval
const MONITOR_POLL: Duration = Duration::from_millis(100);

/// How long the traffic task gets to tear down before being aborted
const TRAFFIC_WIND_DOWN: Duration = Duration::from_secs(5);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The session blueprint
    pub blueprint: SessionBlueprint,

    /// CARLA install directory (real client only)
    pub carla_install: Option<PathBuf>,

    /// Dataset root directory
    pub dataset_path: PathBuf,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// Mock simulator configuration (mock mode only)
    #[cfg_attr(feature = "real-carla", allow(dead_code))]
    pub mock: sim_client::MockConfig,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline: up to `max_attempts` tries, each against a fresh
    /// output directory, incrementing the RPC port after every recoverable
    /// failure to dodge a possibly still-exiting prior server.
    pub async fn run(self) -> Result<SessionStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;
        let town = town_name(blueprint.world.town)
            .context("blueprint passed validation with an unknown town")?;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!(port, "Metrics endpoint available");
        }

        let layout = AttemptLayout::new(self.config.dataset_path.clone(), town)?;
        let registry = ProcessRegistry::new();
        let mut stats = SessionStats::default();
        let mut rpc_port = blueprint.world.rpc_port;
        let mut previous_dir: Option<PathBuf> = None;
        let mut last_error: Option<SessionError> = None;

        for attempt in 0..blueprint.max_attempts {
            // Not the first attempt: drop the previous failed data first
            if let Some(prev) = previous_dir.take() {
                layout.remove_attempt_dir(&prev);
            }
            let attempt_dir = layout.create_attempt_dir(attempt)?;

            observability::record_attempt_started(attempt + 1, rpc_port);
            stats.aggregator.attempt_started();
            info!(
                attempt = attempt + 1,
                max = blueprint.max_attempts,
                rpc_port,
                "ATTEMPT starting"
            );

            match self.run_attempt(rpc_port, &attempt_dir, &registry).await {
                Ok(artifacts) => {
                    registry.kill_all();
                    fold_artifacts(&mut stats, &artifacts);
                    stats.dataset_dir = Some(attempt_dir);
                    stats.duration = start_time.elapsed();
                    return Ok(stats);
                }
                Err(e) if e.is_recoverable() => {
                    warn!(attempt = attempt + 1, error = %e, "attempt failed");
                    stats.aggregator.attempt_failed();
                    registry.kill_all();
                    rpc_port += 1;
                    previous_dir = Some(attempt_dir);
                    last_error = Some(e);
                }
                Err(e) => {
                    registry.kill_all();
                    return Err(e).context("unrecoverable pipeline failure");
                }
            }
        }

        let exhausted = last_error
            .map(|e| anyhow::Error::new(e))
            .unwrap_or_else(|| anyhow::anyhow!("no attempts were made"));
        Err(exhausted.context(format!(
            "all {} attempts exhausted",
            blueprint.max_attempts
        )))
    }

    /// One attempt against the real CARLA server
    #[cfg(feature = "real-carla")]
    async fn run_attempt(
        &self,
        rpc_port: u16,
        attempt_dir: &Path,
        registry: &ProcessRegistry,
    ) -> SessionResult<PersistedArtifacts> {
        use sim_client::RealSimulator;
        use supervisor::{connect_with_budget, ServerConfig, ServerSupervisor};

        let blueprint = &self.config.blueprint;
        let install = self.config.carla_install.as_deref().ok_or_else(|| {
            SessionError::server_launch("--carla-path is required with the real client")
        })?;

        let log_path = self.config.dataset_path.join("logs").join("carla_server_logs.log");
        let server_config = ServerConfig::from_install_dir(
            install,
            rpc_port,
            blueprint.world.show_window,
            log_path,
        )?;

        let handle = ServerSupervisor::launch(&server_config, registry).await?;
        info!(pid = handle.pid(), "(1/3) Carla Server is UP");

        let mut client = RealSimulator::new();
        let deadline = tokio::time::Instant::now() + server_config.wait_budget;
        connect_with_budget(&mut client, &blueprint.world.carla_host, rpc_port, deadline).await?;

        self.run_session(client, handle.pid(), attempt_dir, registry)
            .await
    }

    /// One attempt against the mock simulator (no server process)
    #[cfg(not(feature = "real-carla"))]
    async fn run_attempt(
        &self,
        rpc_port: u16,
        attempt_dir: &Path,
        registry: &ProcessRegistry,
    ) -> SessionResult<PersistedArtifacts> {
        use sim_client::MockSimulator;
        use supervisor::connect_with_budget;

        let blueprint = &self.config.blueprint;
        info!("Running in MOCK mode (no CARLA server required)");

        let mut client = MockSimulator::with_config(self.config.mock.clone());
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        connect_with_budget(&mut client, &blueprint.world.carla_host, rpc_port, deadline).await?;
        info!("(1/3) Mock simulator is UP");

        // Our own pid stands in for the server's in every liveness poll
        self.run_session(client, std::process::id(), attempt_dir, registry)
            .await
    }

    /// Common session wiring shared between real and mock modes
    async fn run_session<C>(
        &self,
        client: C,
        server_pid: u32,
        attempt_dir: &Path,
        registry: &ProcessRegistry,
    ) -> SessionResult<PersistedArtifacts>
    where
        C: SimulatorClient + Clone,
    {
        let blueprint = &self.config.blueprint;
        let town = town_name(blueprint.world.town)
            .ok_or_else(|| SessionError::config_validation("world.town", "unknown town"))?;

        WorldInitializer::load_world(&client, town, server_pid, registry).await?;
        info!("(2/3) World was correctly set up");

        let handshake = Handshake::new();
        let traffic_shutdown = ReadySignal::new();
        let traffic_params = TrafficParams {
            vehicles: blueprint.traffic.vehicles,
            walkers: blueprint.traffic.walkers,
            tm_port: blueprint.world.tm_port,
            tuning: Default::default(),
            timing: TrafficTiming {
                pre_warm_frames: blueprint.capture.pre_warm_frames,
                warm_up_frames: blueprint.capture.warm_up_frames,
                settle: Duration::from_secs_f64(blueprint.capture.settle_seconds),
                ..Default::default()
            },
            tick_seconds: blueprint.capture.tick_seconds,
            shutdown: traffic_shutdown.clone(),
        };

        let startup = TrafficCoordinator::start(&client, traffic_params, handshake.clone(), {
            let registry = registry.clone();
            move || registry.pid_exists(server_pid)
        })
        .await;

        if !startup.simulator_ok {
            return Err(SessionError::SimulatorCrashed {
                pid: server_pid,
                message: "simulator died while setting up traffic".into(),
            });
        }
        if !startup.traffic_ok {
            // A dead coordinator takes the server down with it
            registry.kill(server_pid);
            return Err(SessionError::TrafficSetup {
                message: "traffic coordinator died during startup".into(),
            });
        }
        info!("(3/3) Traffic set up properly");

        let traffic_handle = Arc::new(startup.handle);
        let events = SessionEvents::new();

        let capture_liveness = {
            let registry = registry.clone();
            let traffic = traffic_handle.clone();
            let finished = events.finished.clone();
            move || {
                if !registry.pid_exists(server_pid) {
                    return Err(SessionError::SimulatorCrashed {
                        pid: server_pid,
                        message: "simulator died mid-capture".into(),
                    });
                }
                if traffic.is_finished() && !finished.is_set() {
                    return Err(SessionError::worker_crashed(
                        "traffic",
                        "coordinator task exited mid-capture",
                    ));
                }
                Ok(())
            }
        };

        let session = CaptureSession::new(
            client.clone(),
            blueprint.capture.clone(),
            blueprint.sensors.clone(),
            attempt_dir.to_path_buf(),
            handshake.clone(),
            events.clone(),
            capture_liveness,
            blueprint.world.random_weather,
        );
        let capture_handle = tokio::spawn(session.run());

        info!(
            frames = blueprint.capture.frames_to_take,
            "STARTING TO TAKE DATA"
        );

        // Monitor loop: every tracked party is polled for liveness; the
        // capture side's finished flag ends the watch.
        let started = Instant::now();
        loop {
            if !registry.pid_exists(server_pid) {
                capture_handle.abort();
                traffic_handle.abort();
                return Err(SessionError::SimulatorCrashed {
                    pid: server_pid,
                    message: "Carla crashed".into(),
                });
            }
            if traffic_handle.is_finished() && !events.finished.is_set() {
                capture_handle.abort();
                return Err(SessionError::worker_crashed("traffic", "Traffic crashed"));
            }
            if capture_handle.is_finished() {
                break;
            }
            if !events.hero_found.is_set() && started.elapsed() > HERO_DEADLINE {
                capture_handle.abort();
                traffic_handle.abort();
                return Err(SessionError::HeroNotFound {
                    waited_secs: HERO_DEADLINE.as_secs(),
                });
            }
            tokio::time::sleep(MONITOR_POLL).await;
        }

        let capture_result = capture_handle
            .await
            .map_err(|e| SessionError::worker_crashed("capture", e.to_string()))?;

        let artifacts = match capture_result {
            Ok(artifacts) => artifacts,
            Err(e) => {
                traffic_handle.abort();
                return Err(e);
            }
        };
        info!("FINISHED TAKING DATA");

        // Let the traffic task run its teardown before everything is killed
        traffic_shutdown.set();
        let wind_down = Instant::now();
        while !traffic_handle.is_finished() && wind_down.elapsed() < TRAFFIC_WIND_DOWN {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        traffic_handle.abort();

        Ok(artifacts)
    }
}

/// Fold one attempt's persisted artifacts into the session stats
fn fold_artifacts(stats: &mut SessionStats, artifacts: &PersistedArtifacts) {
    let image_frames: u64 = artifacts.image_sequences.iter().map(|(_, n)| n).sum();
    let events: u64 = artifacts.event_archives.iter().map(|(_, n)| n).sum();
    observability::record_capture_artifacts(artifacts.window_len, image_frames, events);

    for (sensor_id, frames) in &artifacts.image_sequences {
        stats.aggregator.add_image_sequence(sensor_id, *frames);
    }
    for (sensor_id, count) in &artifacts.event_archives {
        stats.aggregator.add_event_stream(sensor_id, *count);
    }
    stats.window_start = Some(artifacts.window_start);
    stats.window_len = artifacts.window_len;
}
