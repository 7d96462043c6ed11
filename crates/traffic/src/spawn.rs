//! World population: hero, autopilot fleet, walkers.

use contracts::{ActorRoster, SessionError, SessionResult, Transform};
use sim_client::SimulatorClient;
use tracing::{info, instrument, warn};

/// The tracked vehicle's blueprint and role
const HERO_BLUEPRINT: &str = "vehicle.ford.mustang";
const HERO_ROLE: &str = "hero";

/// Fleet blueprints, cycled across spawn points
const FLEET_BLUEPRINTS: &[&str] = &[
    "vehicle.audi.tt",
    "vehicle.tesla.model3",
    "vehicle.bmw.grandtourer",
    "vehicle.nissan.patrol",
    "vehicle.mini.cooper_s",
];

/// Walking speed for spawned pedestrians (m/s)
const WALKER_SPEED: f64 = 1.4;

/// Spawn the hero, the autopilot fleet and the walkers.
///
/// Per-entry failures in the fleet and walker batches are logged and
/// skipped; a failed hero spawn fails the population, since nothing can be
/// recorded without the tracked vehicle.
#[instrument(name = "spawn_population", skip(client), fields(vehicles, walkers))]
pub async fn spawn_population<C: SimulatorClient>(
    client: &C,
    vehicles: u32,
    walkers: u32,
) -> SessionResult<ActorRoster> {
    let mut roster = ActorRoster::new();

    let spawn_points = client.spawn_points().await?;
    if spawn_points.is_empty() {
        return Err(SessionError::TrafficSetup {
            message: "map offers no spawn points".into(),
        });
    }

    let hero = client
        .spawn_vehicle(HERO_BLUEPRINT, spawn_points[0], HERO_ROLE, true)
        .await?;
    roster.hero = Some(hero);
    info!(hero, "hero vehicle spawned");

    let requested = vehicles as usize;
    let available = spawn_points.len() - 1;
    if requested > available {
        warn!(
            requested,
            available, "requested more vehicles than spawn points, clamping"
        );
    }

    for (n, point) in spawn_points.iter().skip(1).take(requested).enumerate() {
        let blueprint = FLEET_BLUEPRINTS[n % FLEET_BLUEPRINTS.len()];
        match client.spawn_vehicle(blueprint, *point, "autopilot", true).await {
            Ok(actor) => roster.vehicles.push(actor),
            Err(e) => warn!(blueprint, error = %e, "fleet vehicle spawn failed"),
        }
    }

    for _ in 0..walkers {
        let Some(location) = client.random_nav_location().await? else {
            warn!("no navigable location for walker, skipping");
            continue;
        };
        let transform = Transform {
            location,
            ..Default::default()
        };
        let walker = match client.spawn_walker(transform).await {
            Ok(actor) => actor,
            Err(e) => {
                warn!(error = %e, "walker spawn failed");
                continue;
            }
        };
        let controller = match client.spawn_walker_controller(walker).await {
            Ok(actor) => actor,
            Err(e) => {
                warn!(walker, error = %e, "walker controller spawn failed");
                client.destroy_actors(&[walker]).await.ok();
                continue;
            }
        };
        if let Some(target) = client.random_nav_location().await? {
            client.start_walker(controller, target, WALKER_SPEED).await?;
        }
        roster.walkers.push((controller, walker));
    }

    info!(
        vehicles = roster.vehicles.len(),
        walkers = roster.walkers.len(),
        "population spawned"
    );
    metrics::gauge!("traffic_actors").set(roster.len() as f64);
    Ok(roster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_client::{MockConfig, MockSimulator};
    use std::time::Duration;

    async fn connected(config: MockConfig) -> MockSimulator {
        let mut sim = MockSimulator::with_config(config);
        sim.connect("127.0.0.1", 2000, Duration::from_secs(1))
            .await
            .unwrap();
        sim
    }

    #[tokio::test]
    async fn population_includes_hero_fleet_and_walkers() {
        let sim = connected(MockConfig::default()).await;
        let roster = spawn_population(&sim, 5, 3).await.unwrap();

        assert!(roster.hero.is_some());
        assert_eq!(roster.vehicles.len(), 5);
        assert_eq!(roster.walkers.len(), 3);
        // hero + 5 fleet + 3 walkers + 3 controllers
        assert_eq!(sim.actor_count(), 12);
        assert_eq!(
            sim.find_vehicle_by_role("hero").await.unwrap(),
            roster.hero
        );
    }

    #[tokio::test]
    async fn hero_spawn_failure_fails_population() {
        let sim = connected(MockConfig {
            fail_spawn_roles: vec!["hero".into()],
            ..Default::default()
        })
        .await;
        let err = spawn_population(&sim, 2, 0).await.unwrap_err();
        assert!(matches!(err, SessionError::ActorSpawn { .. }));
    }

    #[tokio::test]
    async fn fleet_failures_are_skipped_not_fatal() {
        let sim = connected(MockConfig {
            fail_spawn_roles: vec!["autopilot".into()],
            ..Default::default()
        })
        .await;
        let roster = spawn_population(&sim, 4, 0).await.unwrap();
        assert!(roster.hero.is_some());
        assert!(roster.vehicles.is_empty());
    }
}
