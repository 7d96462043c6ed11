//! Simulator client abstraction
//!
//! Defines the trait the recorder consumes from the simulator, supporting a
//! real CARLA implementation and a mock for tests.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use contracts::{
    ActorId, Location, SensorKind, SensorSource, SessionResult, SimTick, Transform,
};

/// Synchronous-mode settings.
///
/// Only one task may hold these applied at a time (the clock master);
/// concurrent masters produce undefined simulator behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSettings {
    /// Fixed simulation step (seconds)
    pub fixed_delta_seconds: f64,

    /// Enable physics substepping
    pub substepping: bool,

    /// Maximum physics substep length (seconds)
    pub max_substep_delta_time: f64,

    /// Maximum substeps per step
    pub max_substeps: u32,
}

impl SyncSettings {
    /// Settings for a given step length, with the physics substepping the
    /// simulator needs for stable dynamics (delta <= substep * max_substeps).
    pub fn for_tick(tick_seconds: f64) -> Self {
        Self {
            fixed_delta_seconds: tick_seconds,
            substepping: true,
            max_substep_delta_time: 0.01,
            max_substeps: 10,
        }
    }
}

/// Traffic manager tuning applied once at population time
#[derive(Debug, Clone, Copy)]
pub struct TrafficTuning {
    /// Global distance to leading vehicle (meters)
    pub distance_to_leading: f64,

    /// Hybrid physics mode (full physics only near the hero)
    pub hybrid_physics: bool,

    /// Hybrid physics radius (meters)
    pub hybrid_physics_radius: f64,

    /// Respawn vehicles that go dormant
    pub respawn_dormant: bool,

    /// Global percentage speed reduction
    pub speed_difference_pct: f64,
}

impl Default for TrafficTuning {
    fn default() -> Self {
        Self {
            distance_to_leading: 2.5,
            hybrid_physics: true,
            hybrid_physics_radius: 70.0,
            respawn_dormant: true,
            speed_difference_pct: 30.0,
        }
    }
}

/// Simulator client trait
///
/// Abstracts the simulator RPC surface for testing and implementation
/// replacement. Methods are `&self` so clones of one client can be handed
/// to independent tasks; only `connect` mutates.
pub trait SimulatorClient: Send + Sync + 'static {
    /// Connect to the simulator with a per-attempt timeout
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = SessionResult<()>> + Send;

    /// Issue a blocking load-map request with a long timeout
    fn load_world(
        &self,
        map_name: &str,
        timeout: Duration,
    ) -> impl Future<Output = SessionResult<()>> + Send;

    /// Claim the clock-master role by applying synchronous settings
    fn apply_sync_settings(
        &self,
        settings: SyncSettings,
    ) -> impl Future<Output = SessionResult<()>> + Send;

    /// Release the clock-master role, returning the simulator to
    /// free-running variable-step mode
    fn restore_async_settings(&self) -> impl Future<Output = SessionResult<()>> + Send;

    /// Apply traffic-manager tuning
    fn configure_traffic_manager(
        &self,
        tm_port: u16,
        tuning: &TrafficTuning,
    ) -> impl Future<Output = SessionResult<()>> + Send;

    /// Recommended vehicle spawn points of the loaded map
    fn spawn_points(&self) -> impl Future<Output = SessionResult<Vec<Transform>>> + Send;

    /// A random navigable location for walker targets, if any
    fn random_nav_location(&self) -> impl Future<Output = SessionResult<Option<Location>>> + Send;

    /// Spawn a vehicle; `role` lands in the actor's `role_name` attribute
    fn spawn_vehicle(
        &self,
        blueprint: &str,
        transform: Transform,
        role: &str,
        autopilot: bool,
    ) -> impl Future<Output = SessionResult<ActorId>> + Send;

    /// Spawn a walker
    fn spawn_walker(&self, transform: Transform)
        -> impl Future<Output = SessionResult<ActorId>> + Send;

    /// Spawn an AI controller attached to a walker
    fn spawn_walker_controller(
        &self,
        walker: ActorId,
    ) -> impl Future<Output = SessionResult<ActorId>> + Send;

    /// Start a walker controller towards a target at the given speed (m/s)
    fn start_walker(
        &self,
        controller: ActorId,
        target: Location,
        speed: f64,
    ) -> impl Future<Output = SessionResult<()>> + Send;

    /// Stop a walker controller
    fn stop_walker(&self, controller: ActorId) -> impl Future<Output = SessionResult<()>> + Send;

    /// Spawn a sensor attached to a parent actor
    fn spawn_sensor(
        &self,
        blueprint: &str,
        transform: Transform,
        parent: ActorId,
        attributes: &HashMap<String, String>,
    ) -> impl Future<Output = SessionResult<ActorId>> + Send;

    /// Destroy actors in a batch. Best-effort: failures are logged per
    /// entry, never escalated. Idempotent for unknown ids.
    fn destroy_actors(&self, ids: &[ActorId]) -> impl Future<Output = SessionResult<()>> + Send;

    /// Find a vehicle by its `role_name` attribute
    fn find_vehicle_by_role(
        &self,
        role: &str,
    ) -> impl Future<Output = SessionResult<Option<ActorId>>> + Send;

    /// Current world transform of an actor
    fn actor_transform(
        &self,
        actor: ActorId,
    ) -> impl Future<Output = SessionResult<Transform>> + Send;

    /// Move the spectator viewpoint
    fn set_spectator_transform(
        &self,
        transform: Transform,
    ) -> impl Future<Output = SessionResult<()>> + Send;

    /// Apply a named weather preset
    fn set_weather(&self, preset: &str) -> impl Future<Output = SessionResult<()>> + Send;

    /// Advance the simulation one step. Clock master only.
    fn tick(&self) -> impl Future<Output = SessionResult<SimTick>> + Send;

    /// Wait for the next simulation step, raising
    /// [`contracts::SessionError::StepTimeout`] on overrun
    fn wait_for_tick(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = SessionResult<SimTick>> + Send;

    /// Get the data source for a spawned sensor.
    ///
    /// Returns None if the actor is unknown or not a sensor.
    fn get_sensor_source(
        &self,
        actor: ActorId,
        sensor_id: String,
        kind: SensorKind,
    ) -> Option<Box<dyn SensorSource>>;
}
