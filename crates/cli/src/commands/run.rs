//! `run` command implementation.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_session(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading session blueprint");

    if !args.config.exists() {
        anyhow::bail!("Blueprint file not found: {}", args.config.display());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load blueprint from {}", args.config.display()))?;

    apply_overrides(&mut blueprint, args)?;

    info!(
        town = blueprint.world.town,
        host = %blueprint.world.carla_host,
        rpc_port = blueprint.world.rpc_port,
        vehicles = blueprint.traffic.vehicles,
        walkers = blueprint.traffic.walkers,
        frames = blueprint.capture.frames_to_take,
        sensors = blueprint.sensors.len(),
        "Blueprint loaded"
    );

    let pipeline_config = PipelineConfig {
        blueprint,
        carla_install: args.carla_path.clone(),
        dataset_path: args.dataset_path.clone(),
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
        mock: Default::default(),
    };

    let pipeline = Pipeline::new(pipeline_config);
    let shutdown_signal = setup_shutdown_signal();

    info!("Starting recording pipeline...");

    tokio::select! {
        result = pipeline.run() => {
            let stats = result.context("Recording pipeline failed")?;
            stats.print_summary();
        }
        _ = shutdown_signal => {
            // Best-effort teardown, no retry, immediate exit
            warn!("Received interrupt, tearing down...");
            supervisor::kill_processes_named("CarlaUE4-Linux-Shipping");
            anyhow::bail!("interrupted");
        }
    }

    info!("CARLA Recorder finished");
    Ok(())
}

/// Fold CLI overrides into the blueprint, re-deriving dependent fields
fn apply_overrides(
    blueprint: &mut contracts::SessionBlueprint,
    args: &RunArgs,
) -> Result<()> {
    if let Some(ref host) = args.carla_ip {
        info!(host = %host, "Overriding simulator host from CLI");
        blueprint.world.carla_host = host.clone();
    }
    if let Some(port) = args.rpc_port {
        blueprint.world.rpc_port = port;
    }
    if let Some(port) = args.tm_port {
        blueprint.world.tm_port = port;
    }
    if let Some(town) = args.town {
        if contracts::town_name(town).is_none() {
            anyhow::bail!("invalid town index {town}");
        }
        blueprint.world.town = town;
    }
    if let Some(vehicles) = args.num_of_vehicles {
        blueprint.traffic.vehicles = vehicles;
    }
    if let Some(walkers) = args.num_of_walkers {
        blueprint.traffic.walkers = walkers;
    }
    if args.show_carla_window {
        blueprint.world.show_window = true;
    }
    if let Some(max) = args.max_attempts {
        blueprint.max_attempts = max.max(1);
    }
    if let Some(seconds) = args.num_of_seconds {
        let frames = (seconds as f64 / blueprint.capture.tick_seconds).round() as u64;
        if frames == 0 {
            anyhow::bail!(
                "{seconds}s at a {}s tick yields no frames",
                blueprint.capture.tick_seconds
            );
        }
        info!(seconds, frames, "Capture duration set from CLI");
        blueprint.capture.frames_to_take = frames;
    }
    Ok(())
}

/// Setup Ctrl+C and SIGTERM signal handlers
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
