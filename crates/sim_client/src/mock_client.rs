//! Mock simulator
//!
//! Shared-state mock of the simulator RPC surface with failure injection.
//! One clone acts as the clock master stepping the world; other clones wait
//! on the same clock, exactly like independent client connections against a
//! real server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{
    ActorId, Location, SensorKind, SensorSource, SessionError, SessionResult, SimTick, Transform,
};
use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::client::{SimulatorClient, SyncSettings, TrafficTuning};
use crate::mock_sensor::{MockFrameShape, MockSensorSource};

/// Mock simulator configuration with failure injection
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Refuse connections
    pub fail_connect: bool,

    /// Fail the load-world request
    pub fail_world_load: bool,

    /// Artificial load-world latency
    pub world_load_delay: Duration,

    /// Roles whose vehicle spawn should fail
    pub fail_spawn_roles: Vec<String>,

    /// Sensor id -> ticks whose delivery is silently dropped
    pub drop_ticks: HashMap<String, Vec<SimTick>>,

    /// Simulated duration of one step (the real server paces `tick`)
    pub tick_duration: Duration,

    /// Events generated per DVS tick
    pub events_per_tick: usize,

    /// Generated image width
    pub image_width: u32,

    /// Generated image height
    pub image_height: u32,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            fail_connect: false,
            fail_world_load: false,
            world_load_delay: Duration::from_millis(5),
            fail_spawn_roles: Vec::new(),
            drop_ticks: HashMap::new(),
            tick_duration: Duration::from_millis(2),
            events_per_tick: 4,
            image_width: 64,
            image_height: 48,
        }
    }
}

struct MockActor {
    blueprint: String,
    role: Option<String>,
    transform: Transform,
    sensor: Option<MockSensorSource>,
}

#[derive(Default)]
struct WorldState {
    connected: bool,
    map_name: Option<String>,
    sync: Option<SyncSettings>,
    actors: HashMap<ActorId, MockActor>,
    spectator: Transform,
    weather: Option<String>,
    tm_port: Option<u16>,
}

/// Mock simulator client
pub struct MockSimulator {
    config: MockConfig,
    state: Arc<Mutex<WorldState>>,
    next_actor_id: Arc<AtomicU32>,
    frame_tx: Arc<watch::Sender<SimTick>>,
}

impl Clone for MockSimulator {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: self.state.clone(),
            next_actor_id: self.next_actor_id.clone(),
            frame_tx: self.frame_tx.clone(),
        }
    }
}

impl Default for MockSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSimulator {
    /// Create a default mock simulator
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    /// Create a mock simulator with failure injection
    pub fn with_config(config: MockConfig) -> Self {
        let (frame_tx, _) = watch::channel(0u64);
        Self {
            config,
            state: Arc::new(Mutex::new(WorldState::default())),
            // Start above zero so mock ids are recognizable
            next_actor_id: Arc::new(AtomicU32::new(1000)),
            frame_tx: Arc::new(frame_tx),
        }
    }

    /// Current simulation tick
    pub fn current_tick(&self) -> SimTick {
        *self.frame_tx.borrow()
    }

    /// Number of live actors
    pub fn actor_count(&self) -> usize {
        self.state.lock().unwrap().actors.len()
    }

    /// Whether a clock master currently holds synchronous mode
    pub fn is_sync_mode(&self) -> bool {
        self.state.lock().unwrap().sync.is_some()
    }

    /// Map loaded via `load_world`, if any
    pub fn loaded_map(&self) -> Option<String> {
        self.state.lock().unwrap().map_name.clone()
    }

    /// Last applied weather preset
    pub fn weather(&self) -> Option<String> {
        self.state.lock().unwrap().weather.clone()
    }

    /// Current spectator transform
    pub fn spectator(&self) -> Transform {
        self.state.lock().unwrap().spectator
    }

    fn allocate_actor_id(&self) -> ActorId {
        self.next_actor_id.fetch_add(1, Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> SessionResult<()> {
        if self.state.lock().unwrap().connected {
            Ok(())
        } else {
            Err(SessionError::Other("not connected".into()))
        }
    }

    fn should_drop(&self, sensor_id: &str, tick: SimTick) -> bool {
        self.config
            .drop_ticks
            .get(sensor_id)
            .is_some_and(|ticks| ticks.contains(&tick))
    }

    fn frame_shape(&self) -> MockFrameShape {
        MockFrameShape {
            width: self.config.image_width,
            height: self.config.image_height,
            events_per_tick: self.config.events_per_tick,
        }
    }
}

impl SimulatorClient for MockSimulator {
    #[instrument(name = "mock_sim_connect", skip(self, _timeout), fields(host = %host, port))]
    async fn connect(&mut self, host: &str, port: u16, _timeout: Duration) -> SessionResult<()> {
        let _ = (host, port);
        if self.config.fail_connect {
            return Err(SessionError::Other("mock connection refused".into()));
        }
        self.state.lock().unwrap().connected = true;
        Ok(())
    }

    #[instrument(name = "mock_sim_load_world", skip(self, _timeout), fields(map = %map_name))]
    async fn load_world(&self, map_name: &str, _timeout: Duration) -> SessionResult<()> {
        self.ensure_connected()?;
        tokio::time::sleep(self.config.world_load_delay).await;
        if self.config.fail_world_load {
            return Err(SessionError::WorldLoad {
                town: map_name.to_string(),
                message: "mock load failure".into(),
            });
        }
        self.state.lock().unwrap().map_name = Some(map_name.to_string());
        Ok(())
    }

    async fn apply_sync_settings(&self, settings: SyncSettings) -> SessionResult<()> {
        self.ensure_connected()?;
        let mut state = self.state.lock().unwrap();
        if state.sync.is_some() {
            return Err(SessionError::Other(
                "synchronous mode already owned by another clock master".into(),
            ));
        }
        state.sync = Some(settings);
        Ok(())
    }

    async fn restore_async_settings(&self) -> SessionResult<()> {
        self.state.lock().unwrap().sync = None;
        Ok(())
    }

    async fn configure_traffic_manager(
        &self,
        tm_port: u16,
        _tuning: &TrafficTuning,
    ) -> SessionResult<()> {
        self.ensure_connected()?;
        self.state.lock().unwrap().tm_port = Some(tm_port);
        Ok(())
    }

    async fn spawn_points(&self) -> SessionResult<Vec<Transform>> {
        self.ensure_connected()?;
        // Deterministic grid stands in for the map's recommended points
        Ok((0..64)
            .map(|i| Transform {
                location: Location {
                    x: (i % 8) as f64 * 20.0,
                    y: (i / 8) as f64 * 20.0,
                    z: 0.3,
                },
                ..Default::default()
            })
            .collect())
    }

    async fn random_nav_location(&self) -> SessionResult<Option<Location>> {
        self.ensure_connected()?;
        let tick = self.current_tick() as f64;
        Ok(Some(Location {
            x: 5.0 + tick,
            y: 12.0,
            z: 0.3,
        }))
    }

    #[instrument(name = "mock_sim_spawn_vehicle", skip(self, transform), fields(blueprint = %blueprint, role = %role))]
    async fn spawn_vehicle(
        &self,
        blueprint: &str,
        transform: Transform,
        role: &str,
        _autopilot: bool,
    ) -> SessionResult<ActorId> {
        self.ensure_connected()?;
        if self.config.fail_spawn_roles.iter().any(|r| r == role) {
            return Err(SessionError::actor_spawn(role, "mock spawn failure"));
        }
        let actor_id = self.allocate_actor_id();
        self.state.lock().unwrap().actors.insert(
            actor_id,
            MockActor {
                blueprint: blueprint.to_string(),
                role: Some(role.to_string()),
                transform,
                sensor: None,
            },
        );
        Ok(actor_id)
    }

    async fn spawn_walker(&self, transform: Transform) -> SessionResult<ActorId> {
        self.ensure_connected()?;
        let actor_id = self.allocate_actor_id();
        self.state.lock().unwrap().actors.insert(
            actor_id,
            MockActor {
                blueprint: "walker.pedestrian.0001".to_string(),
                role: None,
                transform,
                sensor: None,
            },
        );
        Ok(actor_id)
    }

    async fn spawn_walker_controller(&self, walker: ActorId) -> SessionResult<ActorId> {
        self.ensure_connected()?;
        let mut state = self.state.lock().unwrap();
        if !state.actors.contains_key(&walker) {
            return Err(SessionError::actor_spawn(
                format!("controller for walker {walker}"),
                "walker not found",
            ));
        }
        let actor_id = self.next_actor_id.fetch_add(1, Ordering::SeqCst);
        state.actors.insert(
            actor_id,
            MockActor {
                blueprint: "controller.ai.walker".to_string(),
                role: None,
                transform: Transform::default(),
                sensor: None,
            },
        );
        Ok(actor_id)
    }

    async fn start_walker(
        &self,
        controller: ActorId,
        _target: Location,
        _speed: f64,
    ) -> SessionResult<()> {
        self.ensure_connected()?;
        if self.state.lock().unwrap().actors.contains_key(&controller) {
            Ok(())
        } else {
            Err(SessionError::Other(format!(
                "walker controller {controller} not found"
            )))
        }
    }

    async fn stop_walker(&self, _controller: ActorId) -> SessionResult<()> {
        Ok(())
    }

    #[instrument(name = "mock_sim_spawn_sensor", skip(self, transform, _attributes), fields(blueprint = %blueprint, parent))]
    async fn spawn_sensor(
        &self,
        blueprint: &str,
        transform: Transform,
        parent: ActorId,
        _attributes: &HashMap<String, String>,
    ) -> SessionResult<ActorId> {
        self.ensure_connected()?;
        let mut state = self.state.lock().unwrap();
        if !state.actors.contains_key(&parent) {
            return Err(SessionError::actor_spawn(blueprint, "parent actor not found"));
        }
        let actor_id = self.next_actor_id.fetch_add(1, Ordering::SeqCst);
        state.actors.insert(
            actor_id,
            MockActor {
                blueprint: blueprint.to_string(),
                role: None,
                transform,
                sensor: None,
            },
        );
        Ok(actor_id)
    }

    async fn destroy_actors(&self, ids: &[ActorId]) -> SessionResult<()> {
        let mut state = self.state.lock().unwrap();
        for id in ids {
            if let Some(actor) = state.actors.remove(id) {
                if let Some(sensor) = actor.sensor {
                    sensor.stop();
                }
                debug!(actor_id = id, "mock actor destroyed");
            }
        }
        Ok(())
    }

    async fn find_vehicle_by_role(&self, role: &str) -> SessionResult<Option<ActorId>> {
        self.ensure_connected()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .actors
            .iter()
            .find(|(_, actor)| {
                actor.blueprint.starts_with("vehicle.") && actor.role.as_deref() == Some(role)
            })
            .map(|(id, _)| *id))
    }

    async fn actor_transform(&self, actor: ActorId) -> SessionResult<Transform> {
        let state = self.state.lock().unwrap();
        state
            .actors
            .get(&actor)
            .map(|a| a.transform)
            .ok_or_else(|| SessionError::Other(format!("actor {actor} not found")))
    }

    async fn set_spectator_transform(&self, transform: Transform) -> SessionResult<()> {
        self.state.lock().unwrap().spectator = transform;
        Ok(())
    }

    async fn set_weather(&self, preset: &str) -> SessionResult<()> {
        self.state.lock().unwrap().weather = Some(preset.to_string());
        Ok(())
    }

    async fn tick(&self) -> SessionResult<SimTick> {
        tokio::time::sleep(self.config.tick_duration).await;
        let (frame, tick_ns, sources) = {
            let state = self.state.lock().unwrap();
            let sync = state.sync.ok_or_else(|| {
                SessionError::Other("tick issued without synchronous mode".into())
            })?;
            let sources: Vec<(String, MockSensorSource)> = state
                .actors
                .values()
                .filter_map(|a| {
                    a.sensor
                        .as_ref()
                        .map(|s| (s.sensor_id().to_string(), s.clone()))
                })
                .collect();
            (
                *self.frame_tx.borrow() + 1,
                (sync.fixed_delta_seconds * 1e9) as i64,
                sources,
            )
        };

        let _ = self.frame_tx.send(frame);

        let shape = self.frame_shape();
        for (sensor_id, source) in sources {
            if self.should_drop(&sensor_id, frame) {
                debug!(sensor_id = %sensor_id, tick = frame, "mock delivery dropped");
                continue;
            }
            source.deliver(frame, tick_ns, shape);
        }

        Ok(frame)
    }

    async fn wait_for_tick(&self, timeout: Duration) -> SessionResult<SimTick> {
        let mut rx = self.frame_tx.subscribe();
        match tokio::time::timeout(timeout, rx.changed()).await {
            Ok(Ok(())) => Ok(*rx.borrow()),
            Ok(Err(_)) => Err(SessionError::Other("tick channel closed".into())),
            Err(_) => Err(SessionError::StepTimeout {
                waited_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn get_sensor_source(
        &self,
        actor: ActorId,
        sensor_id: String,
        kind: SensorKind,
    ) -> Option<Box<dyn SensorSource>> {
        let mut state = self.state.lock().unwrap();
        let entry = state.actors.get_mut(&actor)?;
        if !entry.blueprint.starts_with("sensor.") {
            return None;
        }
        let source = entry
            .sensor
            .get_or_insert_with(|| MockSensorSource::new(sensor_id, kind))
            .clone();
        Some(Box::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::FramePayload;
    use std::sync::atomic::AtomicU64;

    async fn connected() -> MockSimulator {
        let mut sim = MockSimulator::new();
        sim.connect("127.0.0.1", 2000, Duration::from_secs(1))
            .await
            .unwrap();
        sim
    }

    #[tokio::test]
    async fn tick_requires_clock_master() {
        let sim = connected().await;
        assert!(sim.tick().await.is_err());

        sim.apply_sync_settings(SyncSettings::for_tick(0.05))
            .await
            .unwrap();
        assert_eq!(sim.tick().await.unwrap(), 1);
        assert_eq!(sim.tick().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn second_clock_master_rejected() {
        let sim = connected().await;
        sim.apply_sync_settings(SyncSettings::for_tick(0.05))
            .await
            .unwrap();
        let other = sim.clone();
        assert!(other
            .apply_sync_settings(SyncSettings::for_tick(0.05))
            .await
            .is_err());

        sim.restore_async_settings().await.unwrap();
        assert!(other
            .apply_sync_settings(SyncSettings::for_tick(0.05))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn wait_for_tick_times_out_without_steps() {
        let sim = connected().await;
        let err = sim.wait_for_tick(Duration::from_millis(30)).await;
        assert!(matches!(
            err.unwrap_err(),
            SessionError::StepTimeout { .. }
        ));
    }

    #[tokio::test]
    async fn observer_sees_master_steps() {
        let sim = connected().await;
        sim.apply_sync_settings(SyncSettings::for_tick(0.05))
            .await
            .unwrap();

        let observer = sim.clone();
        let waiter = tokio::spawn(async move {
            observer.wait_for_tick(Duration::from_secs(1)).await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        sim.tick().await.unwrap();

        let seen = waiter.await.unwrap().unwrap();
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn sensor_delivery_follows_ticks_and_drops() {
        let mut config = MockConfig::default();
        config.drop_ticks.insert("dvs_front".into(), vec![2]);
        let mut sim = MockSimulator::with_config(config);
        sim.connect("127.0.0.1", 2000, Duration::from_secs(1))
            .await
            .unwrap();
        sim.apply_sync_settings(SyncSettings::for_tick(0.05))
            .await
            .unwrap();

        let hero = sim
            .spawn_vehicle("vehicle.ford.mustang", Transform::default(), "hero", true)
            .await
            .unwrap();
        let sensor_actor = sim
            .spawn_sensor(
                "sensor.camera.dvs",
                Transform::default(),
                hero,
                &HashMap::new(),
            )
            .await
            .unwrap();
        let source = sim
            .get_sensor_source(sensor_actor, "dvs_front".into(), SensorKind::Dvs)
            .unwrap();

        let ticks = Arc::new(Mutex::new(Vec::new()));
        let ticks_clone = ticks.clone();
        source.listen(Arc::new(move |frame| {
            assert!(matches!(frame.payload, FramePayload::Dvs(_)));
            ticks_clone.lock().unwrap().push(frame.tick);
        }));

        for _ in 0..3 {
            sim.tick().await.unwrap();
        }

        // tick 2 was configured to drop
        assert_eq!(*ticks.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn hero_discovery_by_role() {
        let sim = connected().await;
        assert_eq!(sim.find_vehicle_by_role("hero").await.unwrap(), None);

        sim.spawn_vehicle("vehicle.audi.tt", Transform::default(), "autopilot", true)
            .await
            .unwrap();
        let hero = sim
            .spawn_vehicle("vehicle.ford.mustang", Transform::default(), "hero", true)
            .await
            .unwrap();

        assert_eq!(sim.find_vehicle_by_role("hero").await.unwrap(), Some(hero));
    }

    #[tokio::test]
    async fn failed_spawn_role_injection() {
        let config = MockConfig {
            fail_spawn_roles: vec!["hero".into()],
            ..Default::default()
        };
        let mut sim = MockSimulator::with_config(config);
        sim.connect("127.0.0.1", 2000, Duration::from_secs(1))
            .await
            .unwrap();
        let err = sim
            .spawn_vehicle("vehicle.ford.mustang", Transform::default(), "hero", true)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ActorSpawn { .. }));
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let sim = connected().await;
        let id = sim
            .spawn_vehicle("vehicle.audi.tt", Transform::default(), "autopilot", true)
            .await
            .unwrap();
        sim.destroy_actors(&[id]).await.unwrap();
        sim.destroy_actors(&[id]).await.unwrap();
        assert_eq!(sim.actor_count(), 0);
    }

    #[tokio::test]
    async fn callbacks_count_across_many_ticks() {
        let sim = connected().await;
        sim.apply_sync_settings(SyncSettings::for_tick(0.05))
            .await
            .unwrap();
        let hero = sim
            .spawn_vehicle("vehicle.ford.mustang", Transform::default(), "hero", true)
            .await
            .unwrap();
        let actor = sim
            .spawn_sensor(
                "sensor.camera.depth",
                Transform::default(),
                hero,
                &HashMap::new(),
            )
            .await
            .unwrap();
        let source = sim
            .get_sensor_source(actor, "depth_front".into(), SensorKind::Depth)
            .unwrap();

        let count = Arc::new(AtomicU64::new(0));
        let count_clone = count.clone();
        source.listen(Arc::new(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        for _ in 0..25 {
            sim.tick().await.unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 25);
    }
}
