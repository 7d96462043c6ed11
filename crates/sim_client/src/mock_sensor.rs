//! Mock sensor implementation
//!
//! Implements `SensorSource`; frames are delivered synchronously with the
//! mock clock's steps, so every callback carries the tick that produced it,
//! matching the real simulator's delivery contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use contracts::{
    DepthImage, EventSlice, FramePayload, SensorFrame, SensorFrameCallback, SensorId, SensorKind,
    SensorSource, SimTick,
};
use tracing::trace;

/// Payload sizing for generated frames
#[derive(Debug, Clone, Copy)]
pub(crate) struct MockFrameShape {
    pub width: u32,
    pub height: u32,
    pub events_per_tick: usize,
}

/// Mock sensor, driven by [`crate::MockSimulator`]'s clock.
#[derive(Clone)]
pub struct MockSensorSource {
    sensor_id: SensorId,
    kind: SensorKind,
    listening: Arc<AtomicBool>,
    callback: Arc<Mutex<Option<SensorFrameCallback>>>,
}

impl MockSensorSource {
    pub(crate) fn new(sensor_id: impl Into<SensorId>, kind: SensorKind) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            kind,
            listening: Arc::new(AtomicBool::new(false)),
            callback: Arc::new(Mutex::new(None)),
        }
    }

    /// Deliver one tick's worth of data to the registered callback.
    pub(crate) fn deliver(&self, tick: SimTick, tick_ns: i64, shape: MockFrameShape) {
        if !self.listening.load(Ordering::SeqCst) {
            return;
        }
        let callback = match self.callback.lock().unwrap().clone() {
            Some(cb) => cb,
            None => return,
        };

        let timestamp_ns = tick as i64 * tick_ns;
        let payload = match self.kind {
            SensorKind::Depth => FramePayload::Depth(Self::depth_payload(tick, shape)),
            SensorKind::Dvs => FramePayload::Dvs(Self::dvs_payload(tick, timestamp_ns, tick_ns, shape)),
        };

        trace!(sensor_id = %self.sensor_id, tick, "mock frame delivered");
        callback(SensorFrame {
            sensor_id: self.sensor_id.clone(),
            kind: self.kind,
            tick,
            timestamp_ns,
            payload,
        });
    }

    fn depth_payload(tick: SimTick, shape: MockFrameShape) -> DepthImage {
        // BGRA gradient varying with the tick so frames are distinguishable
        let mut data = Vec::with_capacity((shape.width * shape.height * 4) as usize);
        for y in 0..shape.height {
            for x in 0..shape.width {
                let v = ((x + y + tick as u32) % 256) as u8;
                data.extend_from_slice(&[v, v.wrapping_mul(3), v.wrapping_mul(7), 255]);
            }
        }
        DepthImage {
            width: shape.width,
            height: shape.height,
            fov_deg: 90.0,
            data: Bytes::from(data),
        }
    }

    fn dvs_payload(
        tick: SimTick,
        timestamp_ns: i64,
        tick_ns: i64,
        shape: MockFrameShape,
    ) -> EventSlice {
        let n = shape.events_per_tick;
        let mut slice = EventSlice::default();
        for i in 0..n {
            slice.x.push(((tick as usize + i) % shape.width as usize) as u16);
            slice.y.push(((tick as usize * 3 + i) % shape.height as usize) as u16);
            // spread events across the step, non-decreasing
            slice
                .t_ns
                .push(timestamp_ns + (i as i64 * tick_ns) / (n as i64 + 1));
            slice.pol.push(if (tick as usize + i) % 2 == 0 { 1 } else { -1 });
        }
        slice
    }
}

impl SensorSource for MockSensorSource {
    fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn listen(&self, callback: SensorFrameCallback) {
        // Idempotent: keep the first registered callback
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.callback.lock().unwrap() = Some(callback);
    }

    fn stop(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    const SHAPE: MockFrameShape = MockFrameShape {
        width: 32,
        height: 24,
        events_per_tick: 4,
    };

    #[test]
    fn delivery_carries_matching_tick() {
        let sensor = MockSensorSource::new("dvs_front", SensorKind::Dvs);
        let seen = Arc::new(AtomicU64::new(0));
        let seen_clone = seen.clone();

        sensor.listen(Arc::new(move |frame| {
            seen_clone.store(frame.tick, Ordering::SeqCst);
            assert_eq!(frame.timestamp_ns, frame.tick as i64 * 50_000_000);
        }));

        sensor.deliver(17, 50_000_000, SHAPE);
        assert_eq!(seen.load(Ordering::SeqCst), 17);
    }

    #[test]
    fn no_delivery_before_listen_or_after_stop() {
        let sensor = MockSensorSource::new("depth_front", SensorKind::Depth);
        let count = Arc::new(AtomicU64::new(0));

        sensor.deliver(1, 50_000_000, SHAPE);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let count_clone = count.clone();
        sensor.listen(Arc::new(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));
        sensor.deliver(2, 50_000_000, SHAPE);
        sensor.stop();
        sensor.deliver(3, 50_000_000, SHAPE);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dvs_timestamps_non_decreasing_within_slice() {
        let sensor = MockSensorSource::new("dvs_front", SensorKind::Dvs);
        let ok = Arc::new(AtomicBool::new(false));
        let ok_clone = ok.clone();

        sensor.listen(Arc::new(move |frame| {
            if let FramePayload::Dvs(slice) = &frame.payload {
                assert!(slice.t_ns.windows(2).all(|w| w[0] <= w[1]));
                ok_clone.store(true, Ordering::SeqCst);
            }
        }));
        sensor.deliver(5, 50_000_000, SHAPE);
        assert!(ok.load(Ordering::SeqCst));
    }
}
