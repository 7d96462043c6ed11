//! # Traffic
//!
//! The traffic coordinator: populates the world with the hero vehicle, an
//! autopilot fleet and walkers, claims the clock-master role, and drives
//! the simulation through the warm-up / take-data / keep-alive phases of
//! the capture handshake. Teardown restores free-running mode and destroys
//! every spawned actor.

mod coordinator;
mod spawn;

pub use coordinator::{TrafficCoordinator, TrafficParams, TrafficStartup, TrafficTiming};
pub use spawn::spawn_population;
