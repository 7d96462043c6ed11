//! Per-attempt output directory management.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use contracts::{SensorSpec, SessionError, SessionResult};
use tracing::{info, warn};

/// Output directory layout for one recording session.
///
/// Each attempt writes into its own directory under the dataset root; a
/// retry deletes the prior attempt's partial directory first.
#[derive(Debug, Clone)]
pub struct AttemptLayout {
    dataset_root: PathBuf,
    town: String,
}

impl AttemptLayout {
    /// Create a layout rooted at `dataset_root`, creating the root if needed
    pub fn new(dataset_root: impl Into<PathBuf>, town: impl Into<String>) -> SessionResult<Self> {
        let dataset_root = dataset_root.into();
        fs::create_dir_all(&dataset_root).map_err(|e| {
            SessionError::storage(dataset_root.display().to_string(), e.to_string())
        })?;
        Ok(Self {
            dataset_root,
            town: town.into(),
        })
    }

    /// Directory name for an attempt, stamped with local time
    pub fn attempt_dir_name(&self, attempt: u32) -> String {
        let now = Local::now();
        format!(
            "{}_{}_{}",
            now.format("%Y_%m_%d__%H_%M_%S"),
            self.town,
            attempt
        )
    }

    /// Create a fresh directory for the given attempt
    pub fn create_attempt_dir(&self, attempt: u32) -> SessionResult<PathBuf> {
        let dir = self.dataset_root.join(self.attempt_dir_name(attempt));
        fs::create_dir_all(&dir)
            .map_err(|e| SessionError::storage(dir.display().to_string(), e.to_string()))?;
        info!(dir = %dir.display(), "attempt directory created");
        Ok(dir)
    }

    /// Delete a prior attempt's partial output. Best-effort.
    pub fn remove_attempt_dir(&self, dir: &Path) {
        match fs::remove_dir_all(dir) {
            Ok(()) => info!(dir = %dir.display(), "removed previous attempt directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %dir.display(), error = %e, "failed to remove attempt directory"),
        }
    }

    /// Dataset root directory
    pub fn dataset_root(&self) -> &Path {
        &self.dataset_root
    }
}

/// Write the sensor rig configuration alongside the recorded data
pub fn write_sensor_rig(attempt_dir: &Path, sensors: &[SensorSpec]) -> SessionResult<()> {
    let path = attempt_dir.join("sensors.json");
    let json = serde_json::to_string_pretty(sensors)
        .map_err(|e| SessionError::storage(path.display().to_string(), e.to_string()))?;
    fs::write(&path, json)
        .map_err(|e| SessionError::storage(path.display().to_string(), e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SensorKind, Transform};
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn attempt_dirs_are_created_and_removed() {
        let root = tempdir().unwrap();
        let layout = AttemptLayout::new(root.path().join("datasets"), "Town03").unwrap();

        let dir = layout.create_attempt_dir(0).unwrap();
        assert!(dir.is_dir());
        let name = dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("_Town03_0"));

        layout.remove_attempt_dir(&dir);
        assert!(!dir.exists());
        // Removing again is harmless
        layout.remove_attempt_dir(&dir);
    }

    #[test]
    fn sensor_rig_round_trips() {
        let root = tempdir().unwrap();
        let sensors = vec![SensorSpec {
            id: "dvs_front".into(),
            kind: SensorKind::Dvs,
            transform: Transform::default(),
            attributes: HashMap::from([("fov".to_string(), "90".to_string())]),
        }];
        write_sensor_rig(root.path(), &sensors).unwrap();

        let raw = fs::read_to_string(root.path().join("sensors.json")).unwrap();
        let parsed: Vec<SensorSpec> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, "dvs_front");
    }
}
