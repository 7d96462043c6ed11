//! Capture-window validation.
//!
//! Every tick of the window must have produced data for every sensor. A
//! missing tick is a hard failure naming the smallest such tick, with the
//! neighboring ticks' status included for diagnosis. There is no
//! partial-window recovery.

use contracts::{SessionError, SessionResult, SimTick};
use sync_protocol::CaptureWindow;
use tracing::info;

use crate::state::{SensorBuffer, SessionState};

pub(crate) fn validate_window(
    state: &SessionState,
    window: &CaptureWindow,
) -> SessionResult<()> {
    for (sensor_id, buffer) in state.sensors() {
        if let Some(missing) = window.ticks().find(|&tick| !buffer.has_tick(tick)) {
            return Err(SessionError::MissingFrame {
                sensor_id: sensor_id.clone(),
                tick: missing,
                context: neighbor_report(buffer, window, missing),
            });
        }
    }
    info!(
        start_frame = window.start_frame(),
        len = window.len(),
        "capture window validated"
    );
    Ok(())
}

/// Status of the ticks around the failure, for diagnosis
fn neighbor_report(buffer: &SensorBuffer, window: &CaptureWindow, missing: SimTick) -> String {
    let from = missing.saturating_sub(2);
    let to = missing + 2;
    let mut lines = Vec::new();
    for tick in from..=to {
        let status = if buffer.has_tick(tick) {
            "present"
        } else {
            "MISSING"
        };
        let in_window = if window.contains(tick) { "" } else { " (outside window)" };
        lines.push(format!("  tick {tick}: {status}{in_window}"));
    }
    lines.join("\n")
}
