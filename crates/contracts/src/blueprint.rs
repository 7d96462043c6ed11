//! SessionBlueprint - Config Loader output
//!
//! Describes a full recording session: server endpoint, town, traffic
//! population, capture timing, and the sensor rig.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::SensorKind;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete session blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Server / world settings
    pub world: WorldConfig,

    /// Traffic population
    #[serde(default)]
    pub traffic: TrafficConfig,

    /// Capture timing parameters
    pub capture: CaptureConfig,

    /// Sensor rig attached to the tracked vehicle
    pub sensors: Vec<SensorSpec>,

    /// Attempt bound for the top-level retry loop
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Server and world settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Town index (see [`town_name`])
    pub town: u8,

    /// Simulator RPC host
    #[serde(default = "default_host")]
    pub carla_host: String,

    /// Simulator RPC port
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Traffic manager port
    #[serde(default = "default_tm_port")]
    pub tm_port: u16,

    /// Show the simulator window instead of rendering off-screen
    #[serde(default)]
    pub show_window: bool,

    /// Draw and apply a random weather preset at session start
    #[serde(default)]
    pub random_weather: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rpc_port() -> u16 {
    2000
}

fn default_tm_port() -> u16 {
    8000
}

fn default_max_attempts() -> u32 {
    3
}

/// Traffic population settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficConfig {
    /// Number of autopilot vehicles (the hero is extra)
    #[serde(default = "default_vehicles")]
    pub vehicles: u32,

    /// Number of walkers
    #[serde(default = "default_walkers")]
    pub walkers: u32,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            vehicles: default_vehicles(),
            walkers: default_walkers(),
        }
    }
}

fn default_vehicles() -> u32 {
    30
}

fn default_walkers() -> u32 {
    30
}

/// Capture timing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Fixed simulation step (seconds)
    pub tick_seconds: f64,

    /// Size of the capture window (ticks)
    pub frames_to_take: u64,

    /// Safety margin of extra ticks stepped past the window
    #[serde(default = "default_margin")]
    pub margin: u64,

    /// Warm-up steps run by the traffic side between the two handshakes
    #[serde(default = "default_warm_up_frames")]
    pub warm_up_frames: u64,

    /// Steps the traffic side runs before signalling warm-up readiness
    #[serde(default = "default_pre_warm_frames")]
    pub pre_warm_frames: u64,

    /// Pause between handshake phases (seconds)
    #[serde(default = "default_settle_seconds")]
    pub settle_seconds: f64,

    /// Step-wait timeout used to detect the peer's phase change (milliseconds)
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
}

fn default_margin() -> u64 {
    10
}

fn default_warm_up_frames() -> u64 {
    30
}

fn default_pre_warm_frames() -> u64 {
    100
}

fn default_settle_seconds() -> f64 {
    3.0
}

fn default_step_timeout_ms() -> u64 {
    2000
}

impl CaptureConfig {
    /// Ticks the capture side must observe in the take phase
    pub fn take_phase_ticks(&self) -> u64 {
        self.frames_to_take + self.margin
    }
}

/// One sensor in the rig
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSpec {
    /// Unique identifier, also the artifact name on disk
    pub id: String,

    /// Sensor kind
    pub kind: SensorKind,

    /// Mount pose relative to the tracked vehicle
    pub transform: Transform,

    /// Sensor-specific blueprint attributes (image_size_x, fov, ...)
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// 3D transform: location + rotation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Transform {
    /// Position (x, y, z) in meters
    pub location: Location,

    /// Rotation (pitch, yaw, roll) in degrees
    pub rotation: Rotation,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

/// Town catalogue: index to CARLA map name
pub fn town_name(index: u8) -> Option<&'static str> {
    match index {
        1 => Some("Town01"),
        2 => Some("Town02"),
        3 => Some("Town03"),
        4 => Some("Town04"),
        5 => Some("Town05"),
        6 => Some("Town06"),
        7 => Some("Town07"),
        10 => Some("Town10HD"),
        11 => Some("Town11"),
        12 => Some("Town12"),
        _ => None,
    }
}

/// All valid town indices, for error reporting
pub fn town_indices() -> impl Iterator<Item = u8> {
    [1, 2, 3, 4, 5, 6, 7, 10, 11, 12].into_iter()
}
