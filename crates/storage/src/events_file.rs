//! Event stream binary container.
//!
//! One file per event sensor holding the concatenated `x`, `y`, `t`, `p`
//! columns for the whole capture window plus the millisecond index table.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use contracts::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};

/// Finalized event stream for one sensor.
///
/// Columns are parallel and ordered by tick, timestamps already shifted to
/// the cross-sensor time origin. `ms_to_idx[i]` is the first index whose
/// timestamp is at or after millisecond `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventArchive {
    pub x: Vec<u16>,
    pub y: Vec<u16>,
    /// Nanoseconds from the session time origin
    pub t: Vec<i64>,
    pub p: Vec<i8>,
    pub ms_to_idx: Vec<u32>,
}

impl EventArchive {
    /// Number of events in the archive
    pub fn len(&self) -> usize {
        self.t.len()
    }

    /// True when the archive holds no events
    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }
}

/// Write an event archive to disk
pub fn write_event_archive(path: &Path, archive: &EventArchive) -> SessionResult<()> {
    let file = File::create(path)
        .map_err(|e| SessionError::storage(path.display().to_string(), e.to_string()))?;
    bincode::serialize_into(BufWriter::new(file), archive)
        .map_err(|e| SessionError::storage(path.display().to_string(), e.to_string()))
}

/// Read an event archive back from disk
pub fn read_event_archive(path: &Path) -> SessionResult<EventArchive> {
    let file = File::open(path)
        .map_err(|e| SessionError::storage(path.display().to_string(), e.to_string()))?;
    bincode::deserialize_from(BufReader::new(file))
        .map_err(|e| SessionError::storage(path.display().to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn archive_survives_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dvs_front.events.bin");

        let archive = EventArchive {
            x: vec![3, 5, 9],
            y: vec![1, 2, 3],
            t: vec![0, 400_000, 1_200_000],
            p: vec![1, -1, 1],
            ms_to_idx: vec![0, 2],
        };
        write_event_archive(&path, &archive).unwrap();

        let loaded = read_event_archive(&path).unwrap();
        assert_eq!(loaded, archive);
        assert_eq!(loaded.len(), 3);
    }

    #[test]
    fn missing_file_is_a_storage_error() {
        let dir = tempdir().unwrap();
        let err = read_event_archive(&dir.path().join("nope.bin")).unwrap_err();
        assert!(matches!(err, SessionError::Storage { .. }));
    }
}
