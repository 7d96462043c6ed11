//! One-shot readiness signals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A one-way, set-once boolean flag shared between two tasks.
///
/// Once set it remains set for the signal's lifetime; there is no reset and
/// no payload. Readers poll [`ReadySignal::is_set`].
#[derive(Debug, Clone, Default)]
pub struct ReadySignal(Arc<AtomicBool>);

impl ReadySignal {
    /// Create an unset signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal. Idempotent.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the signal has been set
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The five one-shot signals ordering the traffic coordinator and the data
/// capture side around the three phase transitions.
///
/// Strict order, each step blocking on the prior signal from the other side:
///
/// 1. traffic sets `traffic_ready_to_warm_up` after its pre-warm steps
/// 2. capture answers with `capture_ready_to_warm_up`
/// 3. traffic sets `traffic_ready_to_take_data` after the warm-up steps
/// 4. capture answers with `capture_ready_to_take_data`
/// 5. capture sets `capture_wants_to_stop` once its window is full
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub traffic_ready_to_warm_up: ReadySignal,
    pub capture_ready_to_warm_up: ReadySignal,
    pub traffic_ready_to_take_data: ReadySignal,
    pub capture_ready_to_take_data: ReadySignal,
    pub capture_wants_to_stop: ReadySignal,
}

impl Handshake {
    /// Create a handshake with all signals unset
    pub fn new() -> Self {
        Self::default()
    }
}
