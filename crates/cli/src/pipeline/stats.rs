//! End-of-session statistics.

use std::path::PathBuf;
use std::time::Duration;

use observability::CaptureStatsAggregator;

/// Final session statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Attempt and artifact aggregation
    pub aggregator: CaptureStatsAggregator,

    /// Directory holding the successful attempt's dataset
    pub dataset_dir: Option<PathBuf>,

    /// First tick of the persisted window
    pub window_start: Option<u64>,

    /// Window length in ticks
    pub window_len: u64,

    /// Wall-clock duration of the whole session
    pub duration: Duration,
}

impl SessionStats {
    /// Ticks persisted per wall-clock second
    pub fn ticks_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.window_len as f64 / secs
        } else {
            0.0
        }
    }

    /// Print the human-readable summary
    pub fn print_summary(&self) {
        println!("\n{}", self.aggregator.summary());
        if let Some(ref dir) = self.dataset_dir {
            println!("Dataset: {}", dir.display());
        }
        if let Some(start) = self.window_start {
            println!(
                "Window: [{start}, {}) ({} ticks)",
                start + self.window_len,
                self.window_len
            );
        }
        println!(
            "Duration: {:.1}s ({:.1} ticks/s)\n",
            self.duration.as_secs_f64(),
            self.ticks_per_second()
        );
    }
}
