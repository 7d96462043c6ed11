//! SensorSource trait - sensor data source abstraction
//!
//! Unified interface over real CARLA sensors and mock sensors, decoupling
//! the capture rig from concrete sensor implementations.
//!
//! Callbacks fire on the simulator's delivery path, independent of the
//! capture loop's step waits. The only ordering guarantee is that a
//! delivered frame carries the tick that produced it.

use std::sync::Arc;

use crate::{SensorFrame, SensorKind};

/// Sensor frame callback type
///
/// `Arc` so the callback can be shared across delivery contexts.
pub type SensorFrameCallback = Arc<dyn Fn(SensorFrame) + Send + Sync>;

/// Sensor data source trait
pub trait SensorSource: Send + Sync {
    /// Sensor configuration ID
    fn sensor_id(&self) -> &str;

    /// Sensor kind
    fn kind(&self) -> SensorKind;

    /// Register the frame callback.
    ///
    /// Idempotent: a second call while listening is ignored.
    fn listen(&self, callback: SensorFrameCallback);

    /// Stop delivery. For real sensors this calls `sensor.stop()`.
    fn stop(&self);

    /// Whether a callback is currently registered
    fn is_listening(&self) -> bool;
}
