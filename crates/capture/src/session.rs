//! The capture session: handshake steps 2-5, buffering, validation and
//! finalize.

use std::path::PathBuf;
use std::time::Duration;

use contracts::{ActorId, CaptureConfig, SensorSpec, SessionError, SessionResult};
use sim_client::SimulatorClient;
use sync_protocol::{wait_for, CaptureWindow, Handshake, LivenessProbe, PollConfig, ReadySignal};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::finalize::{finalize, PersistedArtifacts};
use crate::rig::SensorRig;
use crate::state::SessionState;
use crate::validate::validate_window;
use crate::weather::draw_weather_preset;

/// Upper bound on waiting for the delivery ledgers to cover the window
const LEDGER_WAIT_BUDGET: Duration = Duration::from_secs(120);

/// Signals the capture side raises for the supervising monitor loop
#[derive(Debug, Clone, Default)]
pub struct SessionEvents {
    /// Set once the tracked vehicle has been located
    pub hero_found: ReadySignal,

    /// Set once the dataset is validated and persisted
    pub finished: ReadySignal,
}

impl SessionEvents {
    /// Create with both signals unset
    pub fn new() -> Self {
        Self::default()
    }
}

/// One capture run against a prepared world.
pub struct CaptureSession<C, L> {
    client: C,
    capture: CaptureConfig,
    sensors: Vec<SensorSpec>,
    attempt_dir: PathBuf,
    handshake: Handshake,
    events: SessionEvents,
    liveness: L,
    apply_weather: bool,
}

impl<C, L> CaptureSession<C, L>
where
    C: SimulatorClient + Clone,
    L: LivenessProbe,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: C,
        capture: CaptureConfig,
        sensors: Vec<SensorSpec>,
        attempt_dir: PathBuf,
        handshake: Handshake,
        events: SessionEvents,
        liveness: L,
        apply_weather: bool,
    ) -> Self {
        Self {
            client,
            capture,
            sensors,
            attempt_dir,
            handshake,
            events,
            liveness,
            apply_weather,
        }
    }

    /// Run the capture to completion: locate the hero, attach the rig,
    /// phase-lock with the traffic side, buffer the window, validate and
    /// persist. The rig is torn down on every exit path.
    #[instrument(name = "capture_run", skip(self), fields(sensors = self.sensors.len()))]
    pub async fn run(self) -> SessionResult<PersistedArtifacts> {
        let hero = self.find_hero().await?;
        self.events.hero_found.set();
        info!(hero, "ego vehicle found");

        let preset = draw_weather_preset();
        if self.apply_weather {
            self.client.set_weather(preset).await?;
            info!(preset, "weather preset applied");
        } else {
            info!(preset, "weather preset drawn (application disabled)");
        }

        let (rig, rx) = SensorRig::attach(&self.client, &self.sensors, hero, &self.attempt_dir).await?;
        storage::write_sensor_rig(&self.attempt_dir, &self.sensors)?;
        let mut state = SessionState::new(&self.attempt_dir, &self.sensors, rx);

        let result = self.run_protocol(&rig, &mut state).await;
        rig.teardown(&self.client).await;
        result
    }

    async fn find_hero(&self) -> SessionResult<ActorId> {
        loop {
            if let Some(id) = self.client.find_vehicle_by_role("hero").await? {
                return Ok(id);
            }
            info!("waiting for the ego vehicle...");
            self.liveness.check()?;
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn run_protocol(
        &self,
        rig: &SensorRig,
        state: &mut SessionState,
    ) -> SessionResult<PersistedArtifacts> {
        let poll = PollConfig::default();
        let step_timeout = Duration::from_millis(self.capture.step_timeout_ms);

        // Step 1: the traffic side finishes its pre-warm and signals.
        wait_for(&self.handshake.traffic_ready_to_warm_up, &self.liveness, poll).await?;
        self.handshake.capture_ready_to_warm_up.set();
        metrics::counter!("capture_phase_transitions_total", "phase" => "warm_up").increment(1);
        info!("warm-up phase entered");

        // Step 2: count warm-up steps, keeping each tick as a provisional
        // start-frame candidate, until the traffic side stops stepping. The
        // step-wait timing out is the phase-change detection, not an error.
        let mut provisional_start = None;
        loop {
            if self.handshake.traffic_ready_to_take_data.is_set() {
                break;
            }
            match self.client.wait_for_tick(step_timeout).await {
                Ok(tick) => {
                    provisional_start = Some(tick);
                    state.drain()?;
                }
                Err(SessionError::StepTimeout { .. }) => {
                    self.liveness.check()?;
                }
                Err(e) => return Err(e),
            }
        }
        debug!(?provisional_start, "warm-up complete, traffic ready to take data");

        // Step 3: enable delivery and let the traffic side free-run.
        rig.listen_all();
        self.handshake.capture_ready_to_take_data.set();
        metrics::counter!("capture_phase_transitions_total", "phase" => "take").increment(1);

        // Step 4: observe the take phase plus safety margin, then fix the
        // window from the last observed tick and signal stop.
        let span = self.capture.take_phase_ticks();
        let mut observed = 0u64;
        let mut last_tick = 0;
        while observed < span {
            match self.client.wait_for_tick(step_timeout).await {
                Ok(tick) => {
                    last_tick = tick;
                    observed += 1;
                    state.drain()?;
                }
                Err(SessionError::StepTimeout { .. }) => {
                    self.liveness.check()?;
                }
                Err(e) => return Err(e),
            }
        }

        let window = CaptureWindow::from_last_tick(
            last_tick,
            self.capture.frames_to_take,
            self.capture.margin,
        )
        .ok_or_else(|| {
            SessionError::Other(format!(
                "take phase ended at tick {last_tick}, too early for a {span}-tick span"
            ))
        })?;
        self.handshake.capture_wants_to_stop.set();
        metrics::counter!("capture_phase_transitions_total", "phase" => "stop").increment(1);
        info!(
            start_frame = window.start_frame(),
            frames = window.len(),
            "capture window established"
        );

        // Step 5: wait until every sensor's delivery run covers the whole
        // span, so every in-window tick produced a callback before the
        // buffers are trusted.
        let deadline = Instant::now() + LEDGER_WAIT_BUDGET;
        loop {
            state.drain()?;
            if state.min_run_length() >= span {
                break;
            }
            if Instant::now() >= deadline {
                return Err(SessionError::StepTimeout {
                    waited_ms: LEDGER_WAIT_BUDGET.as_millis() as u64,
                });
            }
            self.liveness.check()?;
            tokio::time::sleep(poll.interval).await;
        }

        validate_window(state, &window)?;
        let artifacts = finalize(state, &window, &self.attempt_dir)?;
        info!(events = state.total_events(), "capture complete");
        self.events.finished.set();
        Ok(artifacts)
    }
}
