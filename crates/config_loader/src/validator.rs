//! Configuration validation
//!
//! Rules:
//! - sensor ids unique and non-empty
//! - town index exists in the catalogue
//! - tick_seconds > 0, frames_to_take > 0
//! - rpc_port and tm_port must differ
//! - warm-up must leave room for the step-wait detection (settle >= 0)

use std::collections::HashSet;

use contracts::{town_indices, town_name, SessionBlueprint, SessionError};

/// Validate a SessionBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &SessionBlueprint) -> Result<(), SessionError> {
    validate_town(blueprint)?;
    validate_ports(blueprint)?;
    validate_capture(blueprint)?;
    validate_sensors(blueprint)?;
    Ok(())
}

fn validate_town(blueprint: &SessionBlueprint) -> Result<(), SessionError> {
    if town_name(blueprint.world.town).is_none() {
        let valid: Vec<String> = town_indices()
            .map(|i| format!("{} -> {}", i, town_name(i).unwrap()))
            .collect();
        return Err(SessionError::config_validation(
            "world.town",
            format!(
                "invalid town index {}; valid indices:\n{}",
                blueprint.world.town,
                valid.join("\n")
            ),
        ));
    }
    Ok(())
}

fn validate_ports(blueprint: &SessionBlueprint) -> Result<(), SessionError> {
    if blueprint.world.rpc_port == blueprint.world.tm_port {
        return Err(SessionError::config_validation(
            "world.tm_port",
            format!(
                "traffic manager port must differ from rpc port ({})",
                blueprint.world.rpc_port
            ),
        ));
    }
    Ok(())
}

fn validate_capture(blueprint: &SessionBlueprint) -> Result<(), SessionError> {
    let capture = &blueprint.capture;

    if capture.tick_seconds <= 0.0 {
        return Err(SessionError::config_validation(
            "capture.tick_seconds",
            format!("tick_seconds must be > 0, got {}", capture.tick_seconds),
        ));
    }
    if capture.frames_to_take == 0 {
        return Err(SessionError::config_validation(
            "capture.frames_to_take",
            "frames_to_take must be > 0",
        ));
    }
    if capture.settle_seconds < 0.0 {
        return Err(SessionError::config_validation(
            "capture.settle_seconds",
            format!("settle_seconds must be >= 0, got {}", capture.settle_seconds),
        ));
    }
    if capture.step_timeout_ms == 0 {
        return Err(SessionError::config_validation(
            "capture.step_timeout_ms",
            "step_timeout_ms must be > 0",
        ));
    }
    Ok(())
}

fn validate_sensors(blueprint: &SessionBlueprint) -> Result<(), SessionError> {
    if blueprint.sensors.is_empty() {
        return Err(SessionError::config_validation(
            "sensors",
            "at least one sensor is required",
        ));
    }

    let mut seen = HashSet::new();
    for (idx, sensor) in blueprint.sensors.iter().enumerate() {
        if sensor.id.is_empty() {
            return Err(SessionError::config_validation(
                format!("sensors[{idx}].id"),
                "sensor id cannot be empty",
            ));
        }
        if !seen.insert(&sensor.id) {
            return Err(SessionError::config_validation(
                format!("sensors[id={}]", sensor.id),
                "duplicate sensor id",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{CaptureConfig, SensorKind, SensorSpec, Transform, WorldConfig};
    use std::collections::HashMap;

    fn sample_blueprint() -> SessionBlueprint {
        SessionBlueprint {
            version: Default::default(),
            world: WorldConfig {
                town: 10,
                carla_host: "127.0.0.1".into(),
                rpc_port: 2000,
                tm_port: 8000,
                show_window: false,
                random_weather: false,
            },
            traffic: Default::default(),
            capture: CaptureConfig {
                tick_seconds: 0.05,
                frames_to_take: 200,
                margin: 10,
                warm_up_frames: 30,
                pre_warm_frames: 100,
                settle_seconds: 3.0,
                step_timeout_ms: 2000,
            },
            sensors: vec![
                sensor("depth_front", SensorKind::Depth),
                sensor("dvs_front", SensorKind::Dvs),
            ],
            max_attempts: 3,
        }
    }

    fn sensor(id: &str, kind: SensorKind) -> SensorSpec {
        SensorSpec {
            id: id.to_string(),
            kind,
            transform: Transform::default(),
            attributes: HashMap::new(),
        }
    }

    #[test]
    fn valid_blueprint_passes() {
        assert!(validate(&sample_blueprint()).is_ok());
    }

    #[test]
    fn invalid_town_lists_catalogue() {
        let mut bp = sample_blueprint();
        bp.world.town = 8;
        let err = validate(&bp).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("invalid town index 8"));
        assert!(msg.contains("10 -> Town10HD"));
    }

    #[test]
    fn duplicate_sensor_id_rejected() {
        let mut bp = sample_blueprint();
        bp.sensors.push(sensor("depth_front", SensorKind::Dvs));
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("duplicate sensor id"));
    }

    #[test]
    fn zero_frames_rejected() {
        let mut bp = sample_blueprint();
        bp.capture.frames_to_take = 0;
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn port_collision_rejected() {
        let mut bp = sample_blueprint();
        bp.world.tm_port = bp.world.rpc_port;
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn empty_rig_rejected() {
        let mut bp = sample_blueprint();
        bp.sensors.clear();
        assert!(validate(&bp).is_err());
    }
}
