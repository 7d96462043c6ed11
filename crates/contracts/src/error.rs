//! Layered error definitions
//!
//! Categorized by source: config / server / world / traffic / capture / storage.
//! The attempt loop is the sole recovery point; it retries exactly the
//! variants `is_recoverable` admits.

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum SessionError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Server / Supervisor Errors =====
    /// Simulator server failed to start
    #[error("server launch failed: {message}")]
    ServerLaunch { message: String },

    /// Connection wait budget exhausted
    #[error("no connection to simulator at {host}:{port} after {waited_secs}s")]
    ServerConnect {
        host: String,
        port: u16,
        waited_secs: u64,
    },

    /// A tracked process disappeared while another waited on it
    #[error("simulator process {pid} died: {message}")]
    SimulatorCrashed { pid: u32, message: String },

    /// A worker task exited before its readiness signal fired
    #[error("{role} worker died: {message}")]
    WorkerCrashed { role: String, message: String },

    // ===== World / Traffic Errors =====
    /// World (map) load failed
    #[error("failed to load world '{town}': {message}")]
    WorldLoad { town: String, message: String },

    /// Traffic population failed
    #[error("traffic setup failed: {message}")]
    TrafficSetup { message: String },

    /// Actor spawn error
    #[error("spawn failed for '{actor}': {message}")]
    ActorSpawn { actor: String, message: String },

    /// Tracked vehicle never appeared
    #[error("no vehicle with role 'hero' found within {waited_secs}s")]
    HeroNotFound { waited_secs: u64 },

    // ===== Capture Errors =====
    /// Step wait exceeded its timeout.
    ///
    /// During the handshake this is a phase-transition detection, not a
    /// failure; it is an error only when it escapes the capture loop.
    #[error("no simulation step observed within {waited_ms}ms")]
    StepTimeout { waited_ms: u64 },

    /// A tick inside the capture window produced no data
    #[error("sensor '{sensor_id}' has no frame for tick {tick}\n{context}")]
    MissingFrame {
        sensor_id: String,
        tick: u64,
        context: String,
    },

    // ===== Storage Errors =====
    /// Artifact write error
    #[error("storage write failed at '{path}': {message}")]
    Storage { path: String, message: String },

    // ===== General Errors =====
    /// User cancellation
    #[error("interrupted")]
    Interrupted,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl SessionError {
    /// Whether the attempt loop may retry this failure on a fresh port.
    ///
    /// Setup failures, mid-run crashes and data-integrity failures are
    /// fatal to the attempt but not to the session; config, storage, IO
    /// and interrupts are terminal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ServerLaunch { .. }
                | Self::ServerConnect { .. }
                | Self::SimulatorCrashed { .. }
                | Self::WorkerCrashed { .. }
                | Self::WorldLoad { .. }
                | Self::TrafficSetup { .. }
                | Self::ActorSpawn { .. }
                | Self::HeroNotFound { .. }
                | Self::StepTimeout { .. }
                | Self::MissingFrame { .. }
        )
    }

    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create server launch error
    pub fn server_launch(message: impl Into<String>) -> Self {
        Self::ServerLaunch {
            message: message.into(),
        }
    }

    /// Create actor spawn error
    pub fn actor_spawn(actor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ActorSpawn {
            actor: actor.into(),
            message: message.into(),
        }
    }

    /// Create storage write error
    pub fn storage(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create worker crash error
    pub fn worker_crashed(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WorkerCrashed {
            role: role.into(),
            message: message.into(),
        }
    }
}

/// Result alias used across the workspace
pub type SessionResult<T> = Result<T, SessionError>;
