//! Per-tick timestamp table for image sensors.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use contracts::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};

/// Timestamps of every window tick, per image sensor.
///
/// Indexed by window-relative offset; values are nanoseconds from the
/// session time origin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimestampTable {
    pub sensors: BTreeMap<String, Vec<i64>>,
}

impl TimestampTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sensor's aligned per-tick timestamps
    pub fn insert(&mut self, sensor_id: impl Into<String>, timestamps_ns: Vec<i64>) {
        self.sensors.insert(sensor_id.into(), timestamps_ns);
    }

    /// Write the table as pretty JSON
    pub fn write(&self, path: &Path) -> SessionResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SessionError::storage(path.display().to_string(), e.to_string()))?;
        fs::write(path, json)
            .map_err(|e| SessionError::storage(path.display().to_string(), e.to_string()))
    }

    /// Read a table back from disk
    pub fn read(path: &Path) -> SessionResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| SessionError::storage(path.display().to_string(), e.to_string()))?;
        serde_json::from_str(&raw)
            .map_err(|e| SessionError::storage(path.display().to_string(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn table_round_trips_as_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("timestamps.json");

        let mut table = TimestampTable::new();
        table.insert("depth_front", vec![0, 50_000_000, 100_000_000]);
        table.write(&path).unwrap();

        let loaded = TimestampTable::read(&path).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.sensors["depth_front"].len(), 3);
    }
}
