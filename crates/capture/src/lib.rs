//! # Capture
//!
//! The data capture component: attaches the sensor rig to the tracked
//! vehicle, receives per-tick callbacks over a channel, buffers frames
//! keyed by simulation tick, and at shutdown reconciles and validates the
//! buffered data against the capture window before persisting it.

mod disparity;
mod finalize;
mod ms_index;
mod rig;
mod session;
mod state;
mod validate;
mod weather;

pub use disparity::disparity_from_depth;
pub use finalize::PersistedArtifacts;
pub use ms_index::build_ms_to_idx;
pub use rig::SensorRig;
pub use session::{CaptureSession, SessionEvents};
pub use weather::draw_weather_preset;
