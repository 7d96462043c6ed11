//! # Sim Client
//!
//! Simulator client abstraction: the capability set the recorder consumes
//! from CARLA (connect-with-timeout, load-world, synchronous-mode settings,
//! actor spawn/attach/destroy, step-and-wait-for-tick, sensor callbacks),
//! with a mock implementation for development and tests and a real client
//! behind the `real-carla` feature.

mod client;
mod mock_client;
mod mock_sensor;

#[cfg(feature = "real-carla")]
mod carla_client;

pub use client::{SimulatorClient, SyncSettings, TrafficTuning};
pub use mock_client::{MockConfig, MockSimulator};
pub use mock_sensor::MockSensorSource;

#[cfg(feature = "real-carla")]
pub use carla_client::RealSimulator;
