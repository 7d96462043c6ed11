//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-crate data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - The simulation tick (`SimTick`, monotonically increasing `u64`) is the
//!   universal key correlating all sensor data
//! - Event timestamps are nanoseconds of simulation time

mod blueprint;
mod error;
mod runtime;
mod sensor;
mod sensor_id;
mod sensor_source;

pub use blueprint::*;
pub use error::*;
pub use runtime::*;
pub use sensor::*;
pub use sensor_id::SensorId;
pub use sensor_source::{SensorFrameCallback, SensorSource};
