//! SensorFrame - one sensor callback's payload, tagged by the tick at
//! which it arrived.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::SensorId;

/// One discrete simulation step, uniquely numbered, monotonically increasing.
pub type SimTick = u64;

/// A single callback invocation's payload
#[derive(Debug, Clone)]
pub struct SensorFrame {
    /// Sensor configuration ID
    pub sensor_id: SensorId,

    /// Sensor kind
    pub kind: SensorKind,

    /// Simulation tick the data belongs to - the universal correlation key
    pub tick: SimTick,

    /// Simulation timestamp (nanoseconds)
    pub timestamp_ns: i64,

    /// Data payload
    pub payload: FramePayload,
}

/// Sensor kind
///
/// Tagged-variant dispatch: each kind shares the capability set
/// {on_frame, validate, finalize} implemented in the capture crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Image-like: one 2D array per tick
    Depth,
    /// Event-like: a variable-length set of (x, y, t, polarity) tuples per tick
    Dvs,
}

impl SensorKind {
    /// CARLA blueprint name for this kind
    pub fn blueprint(self) -> &'static str {
        match self {
            SensorKind::Depth => "sensor.camera.depth",
            SensorKind::Dvs => "sensor.camera.dvs",
        }
    }
}

/// Sensor data payload
#[derive(Debug, Clone)]
pub enum FramePayload {
    /// Depth camera frame (raw BGRA-encoded depth)
    Depth(DepthImage),

    /// DVS event slice for one tick
    Dvs(EventSlice),
}

/// Raw depth camera frame
#[derive(Debug, Clone)]
pub struct DepthImage {
    /// Image width (pixels)
    pub width: u32,

    /// Image height (pixels)
    pub height: u32,

    /// Horizontal field of view (degrees)
    pub fov_deg: f64,

    /// BGRA-encoded depth, 4 bytes per pixel
    pub data: Bytes,
}

/// Variable-length event batch delivered for a single tick.
///
/// Columns are parallel: `x[i]`, `y[i]`, `t_ns[i]`, `pol[i]` describe one
/// event. Timestamps are non-decreasing within a slice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventSlice {
    pub x: Vec<u16>,
    pub y: Vec<u16>,
    /// Nanoseconds of simulation time
    pub t_ns: Vec<i64>,
    /// +1 brightness increase, -1 decrease
    pub pol: Vec<i8>,
}

impl EventSlice {
    /// Number of events in the slice
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// True when the slice carries no events
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Append another slice, preserving column order
    pub fn extend(&mut self, other: &EventSlice) {
        self.x.extend_from_slice(&other.x);
        self.y.extend_from_slice(&other.y);
        self.t_ns.extend_from_slice(&other.t_ns);
        self.pol.extend_from_slice(&other.pol);
    }
}
