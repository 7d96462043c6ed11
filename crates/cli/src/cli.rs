//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CARLA Recorder - synchronized multi-sensor dataset generation
#[derive(Parser, Debug)]
#[command(
    name = "carla-recorder",
    author,
    version,
    about = "CARLA multi-sensor recording pipeline",
    long_about = "Coordinates a CARLA server, a traffic population task and a sensor \n\
                  capture task to produce tick-aligned multi-sensor recordings \n\
                  (disparity image sequences and event-camera streams)."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "CARLA_RECORDER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "CARLA_RECORDER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the recording pipeline
    Run(RunArgs),

    /// Validate a session blueprint without running
    Validate(ValidateArgs),

    /// Display blueprint information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to the session blueprint (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "session.toml",
        env = "CARLA_RECORDER_CONFIG"
    )]
    pub config: PathBuf,

    /// Path to the CARLA installation (required with the real client)
    #[arg(long, env = "CARLA_PATH")]
    pub carla_path: Option<PathBuf>,

    /// Override simulator host from the blueprint
    #[arg(long, env = "CARLA_HOST")]
    pub carla_ip: Option<String>,

    /// Override simulator RPC port from the blueprint
    #[arg(long, env = "CARLA_PORT")]
    pub rpc_port: Option<u16>,

    /// Override traffic manager port from the blueprint
    #[arg(long, env = "CARLA_TM_PORT")]
    pub tm_port: Option<u16>,

    /// Override town index from the blueprint
    #[arg(long)]
    pub town: Option<u8>,

    /// Override the number of autopilot vehicles
    #[arg(long)]
    pub num_of_vehicles: Option<u32>,

    /// Override the number of walkers
    #[arg(long)]
    pub num_of_walkers: Option<u32>,

    /// Capture duration in seconds (overrides the blueprint's tick count)
    #[arg(long)]
    pub num_of_seconds: Option<u64>,

    /// Where to save the recorded datasets
    #[arg(long, default_value = "./datasets", env = "CARLA_RECORDER_DATASET_PATH")]
    pub dataset_path: PathBuf,

    /// Show the simulator window instead of rendering off-screen
    #[arg(long)]
    pub show_carla_window: bool,

    /// Override the maximum number of pipeline attempts
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "CARLA_RECORDER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the blueprint to validate
    #[arg(short, long, default_value = "session.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to the blueprint
    #[arg(short, long, default_value = "session.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show detailed sensor information
    #[arg(long)]
    pub sensors: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
