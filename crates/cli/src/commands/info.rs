//! `info` command implementation.

use anyhow::Result;
use contracts::town_name;

use crate::cli::InfoArgs;

/// Print a blueprint summary
pub fn run_info(args: &InfoArgs) -> Result<()> {
    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)?;

    if args.json {
        println!("{}", config_loader::ConfigLoader::to_json(&blueprint)?);
        return Ok(());
    }

    println!("\n=== Session Blueprint ===\n");
    println!("World:");
    println!(
        "  Town: {} ({})",
        blueprint.world.town,
        town_name(blueprint.world.town).unwrap_or("?")
    );
    println!(
        "  Simulator: {}:{} (tm {})",
        blueprint.world.carla_host, blueprint.world.rpc_port, blueprint.world.tm_port
    );
    println!("\nTraffic:");
    println!("  Vehicles: {}", blueprint.traffic.vehicles);
    println!("  Walkers: {}", blueprint.traffic.walkers);
    println!("\nCapture:");
    println!("  Tick: {}s", blueprint.capture.tick_seconds);
    println!(
        "  Window: {} frames (+{} margin)",
        blueprint.capture.frames_to_take, blueprint.capture.margin
    );
    println!("  Warm-up: {} frames", blueprint.capture.warm_up_frames);
    println!("\nSensors ({}):", blueprint.sensors.len());
    for sensor in &blueprint.sensors {
        if args.sensors {
            println!(
                "  - {} ({:?}) at ({:.1}, {:.1}, {:.1}), {} attributes",
                sensor.id,
                sensor.kind,
                sensor.transform.location.x,
                sensor.transform.location.y,
                sensor.transform.location.z,
                sensor.attributes.len()
            );
        } else {
            println!("  - {} ({:?})", sensor.id, sensor.kind);
        }
    }
    println!("\nMax attempts: {}\n", blueprint.max_attempts);

    Ok(())
}
