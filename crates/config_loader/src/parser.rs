//! Configuration parsing
//!
//! Supports TOML and JSON (the sensor rig files the recorder historically
//! consumed are JSON).

use contracts::{SessionBlueprint, SessionError};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Infer format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse TOML configuration
pub fn parse_toml(content: &str) -> Result<SessionBlueprint, SessionError> {
    toml::from_str(content).map_err(|e| SessionError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse JSON configuration
pub fn parse_json(content: &str) -> Result<SessionBlueprint, SessionError> {
    serde_json::from_str(content).map_err(|e| SessionError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse according to the given format
pub fn parse(content: &str, format: ConfigFormat) -> Result<SessionBlueprint, SessionError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SensorKind;

    const MINIMAL_TOML: &str = r#"
[world]
town = 10

[capture]
tick_seconds = 0.05
frames_to_take = 200

[[sensors]]
id = "depth_front"
kind = "depth"
[sensors.transform.location]
x = 1.2
y = 0.0
z = 1.6
[sensors.transform.rotation]
pitch = 0.0
yaw = 0.0
roll = 0.0
"#;

    #[test]
    fn parse_toml_minimal() {
        let bp = parse_toml(MINIMAL_TOML).unwrap();
        assert_eq!(bp.world.town, 10);
        assert_eq!(bp.capture.frames_to_take, 200);
        assert_eq!(bp.sensors.len(), 1);
        assert_eq!(bp.sensors[0].kind, SensorKind::Depth);
    }

    #[test]
    fn parse_json_minimal() {
        let content = r#"{
            "world": { "town": 3, "rpc_port": 2010 },
            "capture": { "tick_seconds": 0.05, "frames_to_take": 100, "margin": 5 },
            "sensors": [{
                "id": "dvs_front",
                "kind": "dvs",
                "transform": {
                    "location": { "x": 1.2, "y": 0.0, "z": 1.6 },
                    "rotation": { "pitch": 0.0, "yaw": 0.0, "roll": 0.0 }
                },
                "attributes": { "image_size_x": "640", "image_size_y": "480" }
            }]
        }"#;
        let bp = parse_json(content).unwrap();
        assert_eq!(bp.world.rpc_port, 2010);
        assert_eq!(bp.capture.margin, 5);
        assert_eq!(
            bp.sensors[0].attributes.get("image_size_x").map(String::as_str),
            Some("640")
        );
    }

    #[test]
    fn parse_toml_syntax_error() {
        let result = parse_toml("invalid toml [[[");
        assert!(matches!(
            result.unwrap_err(),
            SessionError::ConfigParse { .. }
        ));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("JSON"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
