//! ActorRoster - Traffic Coordinator output
//!
//! Runtime actor handles, tracked so teardown can destroy every spawned
//! actor on any exit path.

/// Simulator actor handle type
pub type ActorId = u32;

/// Everything the traffic coordinator spawned
#[derive(Debug, Clone, Default)]
pub struct ActorRoster {
    /// The tracked ("hero") vehicle
    pub hero: Option<ActorId>,

    /// Autopilot fleet
    pub vehicles: Vec<ActorId>,

    /// (controller, walker) pairs; controllers are stopped before destroy
    pub walkers: Vec<(ActorId, ActorId)>,
}

impl ActorRoster {
    /// Create empty roster
    pub fn new() -> Self {
        Self::default()
    }

    /// All handles in destroy order: controllers, walkers, fleet, hero
    pub fn destroy_order(&self) -> Vec<ActorId> {
        let mut ids = Vec::new();
        for (controller, walker) in &self.walkers {
            ids.push(*controller);
            ids.push(*walker);
        }
        ids.extend(&self.vehicles);
        ids.extend(self.hero);
        ids
    }

    /// Total spawned actor count
    pub fn len(&self) -> usize {
        self.vehicles.len() + self.walkers.len() * 2 + usize::from(self.hero.is_some())
    }

    /// True when nothing was spawned
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
