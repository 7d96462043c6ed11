//! Finalize: reconcile buffered data into the persisted dataset.
//!
//! - image sensors: rename per-tick files into the zero-based sequence and
//!   record the per-tick timestamp table
//! - event sensors: concatenate per-tick slices in tick order, shift to the
//!   common time origin, build the millisecond index, write the container
//! - cross-sensor alignment: the minimum first in-window timestamp across
//!   all sensors becomes the zero point of every persisted stream

use std::path::{Path, PathBuf};

use contracts::{EventSlice, SensorKind, SessionError, SessionResult, SimTick};
use storage::{EventArchive, TimestampTable};
use sync_protocol::CaptureWindow;
use tracing::{info, instrument};

use crate::ms_index::build_ms_to_idx;
use crate::state::{SensorBuffer, SessionState};

/// What one finalize pass wrote to disk
#[derive(Debug, Clone)]
pub struct PersistedArtifacts {
    /// Attempt output directory
    pub attempt_dir: PathBuf,

    /// First tick of the capture window
    pub window_start: SimTick,

    /// Window length in ticks
    pub window_len: u64,

    /// (sensor id, frame count) per image sequence
    pub image_sequences: Vec<(String, u64)>,

    /// (sensor id, event count) per event container
    pub event_archives: Vec<(String, u64)>,

    /// Session time origin (nanoseconds of simulation time)
    pub time_origin_ns: i64,
}

#[instrument(name = "capture_finalize", skip(state, window, attempt_dir), fields(start_frame = window.start_frame()))]
pub(crate) fn finalize(
    state: &SessionState,
    window: &CaptureWindow,
    attempt_dir: &Path,
) -> SessionResult<PersistedArtifacts> {
    let origin = time_origin(state, window)?;

    let mut artifacts = PersistedArtifacts {
        attempt_dir: attempt_dir.to_path_buf(),
        window_start: window.start_frame(),
        window_len: window.len(),
        image_sequences: Vec::new(),
        event_archives: Vec::new(),
        time_origin_ns: origin,
    };

    let mut timestamps = TimestampTable::new();

    for (sensor_id, buffer) in state.sensors() {
        match buffer.kind {
            SensorKind::Depth => {
                storage::renumber_images(&buffer.dir, window.start_frame(), window.len())?;
                let aligned = window
                    .ticks()
                    .map(|tick| {
                        buffer
                            .tick_timestamps
                            .get(&tick)
                            .map(|ts| ts - origin)
                            .ok_or_else(|| SessionError::MissingFrame {
                                sensor_id: sensor_id.clone(),
                                tick,
                                context: "no timestamp during finalize".into(),
                            })
                    })
                    .collect::<Result<Vec<i64>, _>>()?;
                timestamps.insert(sensor_id.clone(), aligned);
                artifacts
                    .image_sequences
                    .push((sensor_id.clone(), window.len()));
            }
            SensorKind::Dvs => {
                let stream = concat_events(buffer, window);
                let t: Vec<i64> = stream.t_ns.iter().map(|t| t - origin).collect();
                let ms_to_idx = build_ms_to_idx(&t);
                let archive = EventArchive {
                    x: stream.x,
                    y: stream.y,
                    t,
                    p: stream.pol,
                    ms_to_idx,
                };
                let count = archive.len() as u64;
                let path = attempt_dir.join(format!("{sensor_id}.events.bin"));
                storage::write_event_archive(&path, &archive)?;
                artifacts.event_archives.push((sensor_id.clone(), count));
            }
        }
    }

    if !artifacts.image_sequences.is_empty() {
        timestamps.write(&attempt_dir.join("timestamps.json"))?;
    }

    info!(
        images = artifacts.image_sequences.len(),
        event_streams = artifacts.event_archives.len(),
        origin_ns = origin,
        "capture finalized"
    );
    Ok(artifacts)
}

/// The official zero point: the minimum first in-window timestamp across
/// all sensors.
fn time_origin(state: &SessionState, window: &CaptureWindow) -> SessionResult<i64> {
    state
        .sensors()
        .map(|(sensor_id, buffer)| {
            first_window_timestamp(buffer, window).ok_or_else(|| SessionError::MissingFrame {
                sensor_id: sensor_id.clone(),
                tick: window.start_frame(),
                context: "no data at window start during finalize".into(),
            })
        })
        .try_fold(i64::MAX, |acc, ts| Ok(acc.min(ts?)))
}

fn first_window_timestamp(buffer: &SensorBuffer, window: &CaptureWindow) -> Option<i64> {
    match buffer.kind {
        SensorKind::Depth => buffer.tick_timestamps.get(&window.start_frame()).copied(),
        SensorKind::Dvs => window
            .ticks()
            .filter_map(|tick| buffer.events.get(&tick))
            .flat_map(|slice| slice.t_ns.first().copied())
            .next()
            .or_else(|| buffer.tick_timestamps.get(&window.start_frame()).copied()),
    }
}

/// Concatenate per-tick event slices in tick order, window ticks only
fn concat_events(buffer: &SensorBuffer, window: &CaptureWindow) -> EventSlice {
    let mut stream = EventSlice::default();
    for tick in window.ticks() {
        if let Some(slice) = buffer.events.get(&tick) {
            stream.extend(slice);
        }
    }
    stream
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{FramePayload, SensorFrame, SensorSpec, Transform};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn spec(id: &str, kind: SensorKind) -> SensorSpec {
        SensorSpec {
            id: id.to_string(),
            kind,
            transform: Transform::default(),
            attributes: HashMap::new(),
        }
    }

    fn dvs_frame(id: &str, tick: SimTick, base_ns: i64) -> SensorFrame {
        SensorFrame {
            sensor_id: id.into(),
            kind: SensorKind::Dvs,
            tick,
            timestamp_ns: base_ns,
            payload: FramePayload::Dvs(EventSlice {
                x: vec![tick as u16, tick as u16 + 1],
                y: vec![0, 1],
                t_ns: vec![base_ns, base_ns + 10_000_000],
                pol: vec![1, -1],
            }),
        }
    }

    #[tokio::test]
    async fn events_align_to_zero_origin() {
        let dir = tempdir().unwrap();
        let (tx, rx) = async_channel::unbounded();
        let mut state = SessionState::new(dir.path(), &[spec("dvs_front", SensorKind::Dvs)], rx);

        // window ticks 10..13, 50ms per tick
        for tick in 10u64..13 {
            tx.try_send(dvs_frame("dvs_front", tick, tick as i64 * 50_000_000))
                .unwrap();
        }
        state.drain().unwrap();

        let window = CaptureWindow::from_last_tick(12, 3, 0).unwrap();
        let artifacts = finalize(&state, &window, dir.path()).unwrap();

        assert_eq!(artifacts.time_origin_ns, 500_000_000);
        assert_eq!(artifacts.event_archives, vec![("dvs_front".to_string(), 6)]);

        let archive =
            storage::read_event_archive(&dir.path().join("dvs_front.events.bin")).unwrap();
        // after alignment the minimum timestamp is exactly 0
        assert_eq!(archive.t.first().copied(), Some(0));
        assert!(archive.t.windows(2).all(|w| w[0] <= w[1]));
        assert!(!archive.ms_to_idx.is_empty());
        assert_eq!(archive.ms_to_idx[0], 0);
    }

    #[tokio::test]
    async fn image_sequence_is_renumbered_and_timestamped() {
        let dir = tempdir().unwrap();
        let (tx, rx) = async_channel::unbounded();
        let sensor_dir = dir.path().join("depth_front");
        fs::create_dir_all(&sensor_dir).unwrap();
        let mut state =
            SessionState::new(dir.path(), &[spec("depth_front", SensorKind::Depth)], rx);

        for tick in 20u64..24 {
            tx.try_send(SensorFrame {
                sensor_id: "depth_front".into(),
                kind: SensorKind::Depth,
                tick,
                timestamp_ns: tick as i64 * 50_000_000,
                payload: FramePayload::Depth(contracts::DepthImage {
                    width: 2,
                    height: 2,
                    fov_deg: 90.0,
                    data: bytes::Bytes::from(vec![0u8; 16]),
                }),
            })
            .unwrap();
        }
        state.drain().unwrap();

        let window = CaptureWindow::from_last_tick(23, 3, 1).unwrap();
        assert_eq!(window.start_frame(), 20);

        let artifacts = finalize(&state, &window, dir.path()).unwrap();
        assert_eq!(artifacts.image_sequences, vec![("depth_front".to_string(), 3)]);

        for offset in 0..3u64 {
            assert!(storage::sequence_image_path(&sensor_dir, offset).exists());
        }

        let table = TimestampTable::read(&dir.path().join("timestamps.json")).unwrap();
        let aligned = &table.sensors["depth_front"];
        assert_eq!(aligned[0], 0);
        assert_eq!(aligned[1], 50_000_000);
    }
}
