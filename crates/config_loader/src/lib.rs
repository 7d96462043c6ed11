//! # Config Loader
//!
//! Session blueprint loading and parsing.
//!
//! Responsibilities:
//! - Parse TOML/JSON blueprint files
//! - Validate configuration legality
//! - Produce a `SessionBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("session.toml")).unwrap();
//! println!("Town index: {}", blueprint.world.town);
//! ```

mod parser;
mod validator;

pub use contracts::SessionBlueprint;
pub use parser::ConfigFormat;

use contracts::SessionError;
use std::path::Path;

/// Blueprint loader
///
/// Static methods to load a blueprint from a file or string.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a blueprint from a file path.
    ///
    /// Format is detected from the file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<SessionBlueprint, SessionError> {
        let format = Self::detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load a blueprint from a string
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SessionBlueprint, SessionError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Serialize a blueprint to TOML
    pub fn to_toml(blueprint: &SessionBlueprint) -> Result<String, SessionError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| SessionError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize a blueprint to JSON
    pub fn to_json(blueprint: &SessionBlueprint) -> Result<String, SessionError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| SessionError::config_parse(format!("JSON serialize error: {e}")))
    }

    fn detect_format(path: &Path) -> Result<ConfigFormat, SessionError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            SessionError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            SessionError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }
}
