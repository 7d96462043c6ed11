//! Traffic coordinator startup race and phase driving.

use std::time::Duration;

use contracts::{ActorId, ActorRoster, SessionError, SessionResult, Transform};
use sim_client::{SimulatorClient, SyncSettings, TrafficTuning};
use sync_protocol::{wait_for, Handshake, PollConfig, ReadySignal};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

/// Poll interval of the startup race
const RACE_POLL: Duration = Duration::from_millis(50);

/// Overhead viewpoint offset above the hero
const SPECTATOR_HEIGHT: f64 = 30.0;

/// Phase timing of the coordinator
#[derive(Debug, Clone)]
pub struct TrafficTiming {
    /// Steps run before signalling warm-up readiness
    pub pre_warm_frames: u64,

    /// Steps of the second warm-up phase
    pub warm_up_frames: u64,

    /// Pause after each handshake phase
    pub settle: Duration,

    /// Step period of the indefinite keep-alive phase
    pub keep_alive_interval: Duration,
}

impl Default for TrafficTiming {
    fn default() -> Self {
        Self {
            pre_warm_frames: 100,
            warm_up_frames: 30,
            settle: Duration::from_secs(3),
            keep_alive_interval: Duration::from_secs(5),
        }
    }
}

/// Everything the coordinator task needs
#[derive(Debug, Clone)]
pub struct TrafficParams {
    pub vehicles: u32,
    pub walkers: u32,
    pub tm_port: u16,
    pub tuning: TrafficTuning,
    pub timing: TrafficTiming,
    /// Fixed simulation step claimed as clock master
    pub tick_seconds: f64,
    /// Set by the orchestrator to let the keep-alive phase wind down and
    /// run teardown before processes are killed
    pub shutdown: ReadySignal,
}

/// Outcome of the startup race, classifying the three terminal states
pub struct TrafficStartup {
    /// False when the simulator died during population
    pub simulator_ok: bool,

    /// False when the coordinator task died before its readiness signal
    pub traffic_ok: bool,

    /// The coordinator's readiness signal
    pub ready: ReadySignal,

    /// The running coordinator task
    pub handle: JoinHandle<()>,
}

/// Spawns the population task and resolves its startup race.
pub struct TrafficCoordinator;

impl TrafficCoordinator {
    /// Start the coordinator and wait until it is up, the simulator dies,
    /// or the coordinator dies - evaluated in that priority order.
    #[instrument(name = "traffic_start", skip_all, fields(vehicles = params.vehicles, walkers = params.walkers))]
    pub async fn start<C, F>(
        client: &C,
        params: TrafficParams,
        handshake: Handshake,
        server_alive: F,
    ) -> TrafficStartup
    where
        C: SimulatorClient + Clone,
        F: Fn() -> bool,
    {
        let ready = ReadySignal::new();
        let task_ready = ready.clone();
        let task_client = client.clone();
        let task_params = params.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = run_population(task_client, task_params, handshake, task_ready).await {
                error!(error = %e, "traffic coordinator failed");
            }
        });

        loop {
            if !server_alive() {
                handle.abort();
                return TrafficStartup {
                    simulator_ok: false,
                    traffic_ok: true,
                    ready,
                    handle,
                };
            }
            if handle.is_finished() {
                return TrafficStartup {
                    simulator_ok: true,
                    traffic_ok: false,
                    ready,
                    handle,
                };
            }
            if ready.is_set() {
                return TrafficStartup {
                    simulator_ok: true,
                    traffic_ok: true,
                    ready,
                    handle,
                };
            }
            tokio::time::sleep(RACE_POLL).await;
        }
    }
}

/// The coordinator task body: claim the clock, populate, drive the phases.
/// Teardown runs on every exit path.
async fn run_population<C: SimulatorClient + Clone>(
    client: C,
    params: TrafficParams,
    handshake: Handshake,
    ready: ReadySignal,
) -> SessionResult<()> {
    // Single clock master: only this task sets synchronous mode
    client
        .apply_sync_settings(SyncSettings::for_tick(params.tick_seconds))
        .await?;

    client
        .configure_traffic_manager(params.tm_port, &params.tuning)
        .await?;

    let roster = match crate::spawn_population(&client, params.vehicles, params.walkers).await {
        Ok(roster) => roster,
        Err(e) => {
            teardown(&client, &ActorRoster::new()).await;
            return Err(e);
        }
    };

    ready.set();

    let result = drive_phases(&client, &params, &handshake, &roster).await;
    teardown(&client, &roster).await;
    result
}

/// Warm-up, take-data and keep-alive phases, locked to the capture side by
/// the handshake.
async fn drive_phases<C: SimulatorClient>(
    client: &C,
    params: &TrafficParams,
    handshake: &Handshake,
    roster: &ActorRoster,
) -> SessionResult<()> {
    let poll = PollConfig::default();
    let alive = || -> SessionResult<()> { Ok(()) };
    let hero = roster.hero.ok_or_else(|| SessionError::TrafficSetup {
        message: "no hero in roster".into(),
    })?;

    for _ in 0..params.timing.pre_warm_frames {
        client.tick().await?;
    }
    handshake.traffic_ready_to_warm_up.set();
    info!(frames = params.timing.pre_warm_frames, "pre-warm complete");

    wait_for(&handshake.capture_ready_to_warm_up, &alive, poll).await?;
    tokio::time::sleep(params.timing.settle).await;

    for _ in 0..params.timing.warm_up_frames {
        client.tick().await?;
        recenter_spectator(client, hero).await?;
    }
    handshake.traffic_ready_to_take_data.set();
    info!(frames = params.timing.warm_up_frames, "warm-up complete");

    wait_for(&handshake.capture_ready_to_take_data, &alive, poll).await?;
    tokio::time::sleep(params.timing.settle).await;

    // Free-running step loop until the capture side has its window
    while !handshake.capture_wants_to_stop.is_set() {
        client.tick().await?;
        recenter_spectator(client, hero).await?;
    }
    info!("capture side asked to stop taking data");

    // Low-frequency stepping keeps the liveness watchdog fed while the
    // capture side validates and persists. The shutdown signal is polled
    // more often than the step period so wind-down stays responsive.
    let mut last_step = tokio::time::Instant::now();
    while !params.shutdown.is_set() {
        tokio::time::sleep(RACE_POLL).await;
        if last_step.elapsed() >= params.timing.keep_alive_interval {
            client.tick().await?;
            last_step = tokio::time::Instant::now();
        }
    }
    Ok(())
}

/// Overhead viewpoint centered on the hero
async fn recenter_spectator<C: SimulatorClient>(client: &C, hero: ActorId) -> SessionResult<()> {
    let mut transform: Transform = client.actor_transform(hero).await?;
    transform.location.z += SPECTATOR_HEIGHT;
    transform.rotation.pitch = -90.0;
    client.set_spectator_transform(transform).await
}

/// Restore free-running mode and destroy every spawned actor.
///
/// Best-effort on every exit path; controllers are stopped before their
/// walkers are destroyed.
async fn teardown<C: SimulatorClient>(client: &C, roster: &ActorRoster) {
    if let Err(e) = client.restore_async_settings().await {
        warn!(error = %e, "failed to restore free-running settings");
    }

    for (controller, _) in &roster.walkers {
        if let Err(e) = client.stop_walker(*controller).await {
            warn!(controller, error = %e, "failed to stop walker controller");
        }
    }

    if roster.is_empty() {
        return;
    }
    info!(actors = roster.len(), "destroying spawned actors");
    if let Err(e) = client.destroy_actors(&roster.destroy_order()).await {
        warn!(error = %e, "actor teardown failed");
    }
}
