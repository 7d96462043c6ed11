//! Liveness-checked polling waits.
//!
//! Polling with one-shot flags (rather than blocking waits) avoids deadlock
//! when a monitored peer dies mid-wait: every poll iteration re-checks peer
//! liveness before sleeping again.

use std::time::Duration;

use contracts::{SessionError, SessionResult};
use tracing::trace;

use crate::ReadySignal;

/// A probe that fails when a monitored peer has died.
///
/// Implementations poll OS process existence or task completion; they must
/// be cheap since they run once per poll interval.
pub trait LivenessProbe {
    /// Ok while every monitored peer is alive
    fn check(&self) -> SessionResult<()>;
}

impl<F> LivenessProbe for F
where
    F: Fn() -> SessionResult<()>,
{
    fn check(&self) -> SessionResult<()> {
        self()
    }
}

/// Polling parameters
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Sleep between polls
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
        }
    }
}

/// Wait until `signal` is set, failing fast if `liveness` reports a dead peer.
///
/// The signal is checked before liveness on every iteration, so a peer that
/// signals and then exits still counts as having signalled.
pub async fn wait_for(
    signal: &ReadySignal,
    liveness: &impl LivenessProbe,
    config: PollConfig,
) -> SessionResult<()> {
    loop {
        if signal.is_set() {
            return Ok(());
        }
        liveness.check()?;
        trace!("signal not yet set, polling again");
        tokio::time::sleep(config.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn always_alive() -> impl LivenessProbe {
        || -> SessionResult<()> { Ok(()) }
    }

    #[tokio::test]
    async fn returns_once_signal_set() {
        let signal = ReadySignal::new();
        let setter = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            setter.set();
        });

        wait_for(&signal, &always_alive(), PollConfig::default())
            .await
            .unwrap();
        assert!(signal.is_set());
    }

    #[tokio::test]
    async fn fails_when_peer_dies() {
        let signal = ReadySignal::new();
        let dead = move || -> SessionResult<()> {
            Err(SessionError::SimulatorCrashed {
                pid: 1234,
                message: "gone".into(),
            })
        };

        let err = wait_for(&signal, &dead, PollConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::SimulatorCrashed { .. }));
    }

    #[tokio::test]
    async fn set_signal_wins_over_dead_peer() {
        // A peer that signals and then exits still counts as signalled.
        let signal = ReadySignal::new();
        signal.set();

        let probed = Arc::new(AtomicBool::new(false));
        let probed_clone = probed.clone();
        let dying = move || -> SessionResult<()> {
            probed_clone.store(true, Ordering::SeqCst);
            Err(SessionError::worker_crashed("traffic", "exited"))
        };

        wait_for(&signal, &dying, PollConfig::default())
            .await
            .unwrap();
        assert!(!probed.load(Ordering::SeqCst));
    }
}
