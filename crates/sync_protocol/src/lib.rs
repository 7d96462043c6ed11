//! # Sync Protocol
//!
//! The cross-task synchronization primitives that phase-lock the traffic
//! coordinator and the data capture side around the shared simulation clock:
//!
//! - [`ReadySignal`]: one-way, set-once boolean flag, read via polling
//! - [`Handshake`]: the five named signals of the capture handshake
//! - [`wait_for`]: polling wait that re-checks peer liveness every iteration
//! - [`CaptureWindow`]: the immutable tick range kept as the final dataset
//! - [`FrameLedger`]: per-sensor run length of uninterrupted tick delivery
//!
//! Every wait here is a bounded or polling loop, never an indefinite block:
//! a dead peer is detected by the liveness probe, not by message timeout
//! alone.

mod ledger;
mod poll;
mod signal;
mod window;

pub use ledger::FrameLedger;
pub use poll::{wait_for, LivenessProbe, PollConfig};
pub use signal::{Handshake, ReadySignal};
pub use window::CaptureWindow;
