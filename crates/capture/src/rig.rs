//! Sensor rig attachment and lifecycle.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use contracts::{ActorId, SensorFrame, SensorKind, SensorSource, SensorSpec, SessionError, SessionResult};
use sim_client::SimulatorClient;
use tracing::{info, instrument, warn};

struct RigEntry {
    id: String,
    actor: ActorId,
    source: Box<dyn SensorSource>,
}

/// The attached sensor rig.
///
/// Every sensor's callback enqueues frames onto one channel; the capture
/// loop drains it. Attachment is atomic: a failed spawn rolls back every
/// sensor already attached.
pub struct SensorRig {
    entries: Vec<RigEntry>,
    tx: Sender<SensorFrame>,
}

impl SensorRig {
    /// Spawn and attach all configured sensors to the tracked vehicle.
    ///
    /// Creates the per-sensor image directories. Sensors are not listening
    /// yet; call [`SensorRig::listen_all`] at the take-data transition.
    #[instrument(name = "rig_attach", skip(client, specs, attempt_dir), fields(sensor_count = specs.len(), hero))]
    pub async fn attach<C: SimulatorClient>(
        client: &C,
        specs: &[SensorSpec],
        hero: ActorId,
        attempt_dir: &Path,
    ) -> SessionResult<(Self, Receiver<SensorFrame>)> {
        // Unbounded: callbacks fire on the simulator's delivery path and
        // must never block. Memory grows with the capture duration.
        let (tx, rx) = async_channel::unbounded();
        let mut entries: Vec<RigEntry> = Vec::new();

        for spec in specs {
            let spawned = client
                .spawn_sensor(
                    spec.kind.blueprint(),
                    spec.transform,
                    hero,
                    &spec.attributes,
                )
                .await;

            let actor = match spawned {
                Ok(actor) => actor,
                Err(e) => {
                    warn!(sensor_id = %spec.id, error = %e, "sensor spawn failed, rolling back rig");
                    Self::destroy_entries(client, &entries).await;
                    return Err(e);
                }
            };

            let Some(source) = client.get_sensor_source(actor, spec.id.clone(), spec.kind) else {
                Self::destroy_entries(client, &entries).await;
                client.destroy_actors(&[actor]).await.ok();
                return Err(SessionError::actor_spawn(
                    &spec.id,
                    "no sensor source for spawned actor",
                ));
            };

            if spec.kind == SensorKind::Depth {
                fs::create_dir_all(attempt_dir.join(&spec.id))?;
            }

            info!(sensor_id = %spec.id, actor, "sensor spawned and attached");
            entries.push(RigEntry {
                id: spec.id.clone(),
                actor,
                source,
            });
        }

        Ok((Self { entries, tx }, rx))
    }

    /// Register every sensor's callback. Frames flow into the channel from
    /// here on.
    pub fn listen_all(&self) {
        for entry in &self.entries {
            let tx = self.tx.clone();
            entry.source.listen(Arc::new(move |frame| {
                let _ = tx.try_send(frame);
            }));
        }
        info!(count = self.entries.len(), "sensors listening");
    }

    /// Stop every sensor's delivery
    pub fn stop_all(&self) {
        for entry in &self.entries {
            if entry.source.is_listening() {
                entry.source.stop();
            }
        }
    }

    /// Actor handles of all attached sensors
    pub fn actor_ids(&self) -> Vec<ActorId> {
        self.entries.iter().map(|e| e.actor).collect()
    }

    /// Stop and destroy the whole rig. Best-effort, runs on every exit path.
    #[instrument(name = "rig_teardown", skip(self, client), fields(sensor_count = self.entries.len()))]
    pub async fn teardown<C: SimulatorClient>(&self, client: &C) {
        self.stop_all();
        if let Err(e) = client.destroy_actors(&self.actor_ids()).await {
            warn!(error = %e, "rig teardown failed");
        }
    }

    async fn destroy_entries<C: SimulatorClient>(client: &C, entries: &[RigEntry]) {
        for entry in entries {
            entry.source.stop();
            if let Err(e) = client.destroy_actors(&[entry.actor]).await {
                warn!(sensor_id = %entry.id, error = %e, "rollback destroy failed");
            }
        }
    }
}
