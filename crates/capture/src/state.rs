//! Per-session capture state.
//!
//! All mutable buffering lives in one struct owned by the capture task.
//! Sensor callbacks never touch it directly: they enqueue frames on a
//! channel that [`SessionState::drain`] consumes, so there is no shared
//! mutable state between the delivery context and the capture loop.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_channel::Receiver;
use contracts::{
    EventSlice, FramePayload, SensorFrame, SensorKind, SensorSpec, SessionResult, SimTick,
};
use sync_protocol::FrameLedger;
use tracing::warn;

use crate::disparity::disparity_from_depth;

/// Buffered data for one sensor
pub(crate) struct SensorBuffer {
    pub kind: SensorKind,
    pub ledger: FrameLedger,
    /// Tick -> simulation timestamp of its callback
    pub tick_timestamps: BTreeMap<SimTick, i64>,
    /// Tick -> event slice (event sensors)
    pub events: BTreeMap<SimTick, EventSlice>,
    /// On-disk directory for per-tick images (image sensors)
    pub dir: PathBuf,
}

impl SensorBuffer {
    /// Whether a callback arrived for the tick
    pub fn has_tick(&self, tick: SimTick) -> bool {
        self.tick_timestamps.contains_key(&tick)
    }
}

/// Capture-side session state, constructed at capture start and discarded
/// at capture end.
pub(crate) struct SessionState {
    sensors: BTreeMap<String, SensorBuffer>,
    rx: Receiver<SensorFrame>,
    total_events: u64,
}

impl SessionState {
    pub fn new(attempt_dir: &Path, specs: &[SensorSpec], rx: Receiver<SensorFrame>) -> Self {
        let sensors = specs
            .iter()
            .map(|spec| {
                (
                    spec.id.clone(),
                    SensorBuffer {
                        kind: spec.kind,
                        ledger: FrameLedger::new(),
                        tick_timestamps: BTreeMap::new(),
                        events: BTreeMap::new(),
                        dir: attempt_dir.join(&spec.id),
                    },
                )
            })
            .collect();
        Self {
            sensors,
            rx,
            total_events: 0,
        }
    }

    /// Process every frame currently queued on the channel.
    pub fn drain(&mut self) -> SessionResult<usize> {
        let mut processed = 0;
        while let Ok(frame) = self.rx.try_recv() {
            self.on_frame(frame)?;
            processed += 1;
        }
        Ok(processed)
    }

    fn on_frame(&mut self, frame: SensorFrame) -> SessionResult<()> {
        let Some(buffer) = self.sensors.get_mut(frame.sensor_id.as_str()) else {
            warn!(sensor_id = %frame.sensor_id, "frame from unknown sensor dropped");
            return Ok(());
        };

        buffer.ledger.record(frame.tick);
        buffer.tick_timestamps.insert(frame.tick, frame.timestamp_ns);

        match frame.payload {
            FramePayload::Depth(image) => {
                // Written immediately under the absolute tick name; finalize
                // renames the window into a zero-based sequence.
                let disparity = disparity_from_depth(&image)?;
                let path = storage::tick_image_path(&buffer.dir, frame.tick);
                storage::write_disparity_png(&path, image.width, image.height, &disparity)?;
                metrics::counter!(
                    "capture_frames_total",
                    "sensor_id" => frame.sensor_id.to_string()
                )
                .increment(1);
            }
            FramePayload::Dvs(slice) => {
                let count = slice.len() as u64;
                metrics::counter!(
                    "capture_events_total",
                    "sensor_id" => frame.sensor_id.to_string()
                )
                .increment(count);
                buffer
                    .events
                    .entry(frame.tick)
                    .and_modify(|existing| existing.extend(&slice))
                    .or_insert(slice);
                self.total_events += count;
            }
        }
        Ok(())
    }

    /// The shortest unbroken delivery run across all sensors
    pub fn min_run_length(&self) -> u64 {
        self.sensors
            .values()
            .map(|buffer| buffer.ledger.run_length())
            .min()
            .unwrap_or(0)
    }

    /// Sensors in deterministic order
    pub fn sensors(&self) -> impl Iterator<Item = (&String, &SensorBuffer)> {
        self.sensors.iter()
    }

    /// Total events accumulated across event sensors
    pub fn total_events(&self) -> u64 {
        self.total_events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Transform;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn dvs_spec(id: &str) -> SensorSpec {
        SensorSpec {
            id: id.to_string(),
            kind: SensorKind::Dvs,
            transform: Transform::default(),
            attributes: HashMap::new(),
        }
    }

    fn dvs_frame(id: &str, tick: SimTick, t_ns: i64) -> SensorFrame {
        SensorFrame {
            sensor_id: id.into(),
            kind: SensorKind::Dvs,
            tick,
            timestamp_ns: t_ns,
            payload: FramePayload::Dvs(EventSlice {
                x: vec![1, 2],
                y: vec![3, 4],
                t_ns: vec![t_ns, t_ns + 10],
                pol: vec![1, -1],
            }),
        }
    }

    #[tokio::test]
    async fn drain_buffers_frames_by_tick() {
        let dir = tempdir().unwrap();
        let (tx, rx) = async_channel::unbounded();
        let mut state = SessionState::new(dir.path(), &[dvs_spec("dvs_front")], rx);

        for tick in [5u64, 6, 7] {
            tx.try_send(dvs_frame("dvs_front", tick, tick as i64 * 1000)).unwrap();
        }
        assert_eq!(state.drain().unwrap(), 3);

        let (_, buffer) = state.sensors().next().unwrap();
        assert!(buffer.has_tick(5));
        assert!(buffer.has_tick(7));
        assert!(!buffer.has_tick(8));
        assert_eq!(buffer.ledger.run_length(), 3);
        assert_eq!(state.total_events(), 6);
    }

    #[tokio::test]
    async fn min_run_reflects_the_weakest_sensor() {
        let dir = tempdir().unwrap();
        let (tx, rx) = async_channel::unbounded();
        let mut state =
            SessionState::new(dir.path(), &[dvs_spec("a"), dvs_spec("b")], rx);

        for tick in [1u64, 2, 3] {
            tx.try_send(dvs_frame("a", tick, 0)).unwrap();
        }
        // sensor b has a gap
        for tick in [1u64, 3] {
            tx.try_send(dvs_frame("b", tick, 0)).unwrap();
        }
        state.drain().unwrap();

        assert_eq!(state.min_run_length(), 1);
    }

    #[tokio::test]
    async fn unknown_sensor_frames_are_ignored() {
        let dir = tempdir().unwrap();
        let (tx, rx) = async_channel::unbounded();
        let mut state = SessionState::new(dir.path(), &[dvs_spec("a")], rx);

        tx.try_send(dvs_frame("ghost", 1, 0)).unwrap();
        assert_eq!(state.drain().unwrap(), 1);
        assert_eq!(state.min_run_length(), 0);
    }
}
