//! Capture metrics collection and in-process aggregation.

use std::collections::HashMap;

use metrics::{counter, gauge};

/// Record the start of a pipeline attempt
pub fn record_attempt_started(attempt: u32, rpc_port: u16) {
    counter!("recorder_attempts_total").increment(1);
    gauge!("recorder_current_attempt").set(attempt as f64);
    gauge!("recorder_rpc_port").set(rpc_port as f64);
}

/// Record what a finished capture persisted
pub fn record_capture_artifacts(window_len: u64, image_frames: u64, events: u64) {
    counter!("recorder_window_ticks_total").increment(window_len);
    counter!("recorder_image_frames_total").increment(image_frames);
    counter!("recorder_events_total").increment(events);
}

/// Aggregates per-attempt results for the end-of-session summary.
#[derive(Debug, Clone, Default)]
pub struct CaptureStatsAggregator {
    /// Attempts started
    pub attempts: u64,

    /// Attempts that failed recoverably
    pub failed_attempts: u64,

    /// Frames persisted per image sensor
    pub image_frames: HashMap<String, u64>,

    /// Events persisted per event sensor
    pub event_counts: HashMap<String, u64>,

    /// Events per event-sensor stream
    pub events_per_stream: RunningStats,
}

impl CaptureStatsAggregator {
    /// Create a fresh aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a started attempt
    pub fn attempt_started(&mut self) {
        self.attempts += 1;
    }

    /// Count a recoverable failure
    pub fn attempt_failed(&mut self) {
        self.failed_attempts += 1;
    }

    /// Fold in one sensor's persisted image sequence
    pub fn add_image_sequence(&mut self, sensor_id: &str, frames: u64) {
        *self.image_frames.entry(sensor_id.to_string()).or_insert(0) += frames;
    }

    /// Fold in one sensor's persisted event stream
    pub fn add_event_stream(&mut self, sensor_id: &str, events: u64) {
        *self.event_counts.entry(sensor_id.to_string()).or_insert(0) += events;
        self.events_per_stream.push(events as f64);
    }

    /// Produce the summary report
    pub fn summary(&self) -> CaptureSummary {
        CaptureSummary {
            attempts: self.attempts,
            failed_attempts: self.failed_attempts,
            image_frames: self.image_frames.clone(),
            event_counts: self.event_counts.clone(),
            events_per_stream: StatsSummary::from(&self.events_per_stream),
        }
    }
}

/// End-of-session summary
#[derive(Debug, Clone, Default)]
pub struct CaptureSummary {
    pub attempts: u64,
    pub failed_attempts: u64,
    pub image_frames: HashMap<String, u64>,
    pub event_counts: HashMap<String, u64>,
    pub events_per_stream: StatsSummary,
}

impl std::fmt::Display for CaptureSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Capture Summary ===")?;
        writeln!(
            f,
            "Attempts: {} ({} failed)",
            self.attempts, self.failed_attempts
        )?;
        if !self.image_frames.is_empty() {
            writeln!(f, "Image frames:")?;
            for (sensor, frames) in &self.image_frames {
                writeln!(f, "  {sensor}: {frames}")?;
            }
        }
        if !self.event_counts.is_empty() {
            writeln!(f, "Events:")?;
            for (sensor, events) in &self.event_counts {
                writeln!(f, "  {sensor}: {events}")?;
            }
            writeln!(f, "Events per stream: {}", self.events_per_stream)?;
        }
        Ok(())
    }
}

/// Summary of a running statistic
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count(),
            min: stats.min(),
            max: stats.max(),
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Fold in a new value
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_stats_welford() {
        let mut stats = RunningStats::default();
        for v in [2.0, 4.0, 6.0, 8.0] {
            stats.push(v);
        }
        assert_eq!(stats.count(), 4);
        assert!((stats.mean() - 5.0).abs() < 1e-10);
        assert!((stats.min() - 2.0).abs() < 1e-10);
        assert!((stats.max() - 8.0).abs() < 1e-10);
        assert!((stats.variance() - 20.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn aggregator_folds_attempts_and_streams() {
        let mut agg = CaptureStatsAggregator::new();
        agg.attempt_started();
        agg.attempt_failed();
        agg.attempt_started();
        agg.add_image_sequence("depth_front", 200);
        agg.add_event_stream("dvs_front", 15_000);

        let summary = agg.summary();
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.failed_attempts, 1);
        assert_eq!(summary.image_frames["depth_front"], 200);
        assert_eq!(summary.event_counts["dvs_front"], 15_000);

        let rendered = summary.to_string();
        assert!(rendered.contains("Attempts: 2 (1 failed)"));
        assert!(rendered.contains("dvs_front: 15000"));
    }
}
