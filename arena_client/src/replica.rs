//! Client-side reconciliation.
//!
//! A [`Replica`] owns a replica world and folds server snapshots into it:
//! known entities are overwritten, new ones are built through the
//! [`EntityRegistry`], final records drop their entity, and entities the
//! snapshot no longer mentions are swept according to the [`SweepConfig`].
//! Between snapshots the replica world keeps moving bodies and simulates
//! spawn-only and local projectiles on its own.

use std::collections::{HashMap, HashSet};

use arena_shared::{
    config::SweepConfig,
    entity::{Entity, Replication},
    event::EntityEvent,
    math::Vec3,
    physics::PhysicsConfig,
    snapshot::{ObjectRecord, Snapshot, SNAPSHOT_VERSION},
    world::{Authority, World},
};
use tracing::{debug, warn};

use crate::registry::EntityRegistry;

/// What one snapshot changed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ApplyReport {
    pub created: Vec<String>,
    pub updated: usize,
    pub removed: Vec<String>,
    /// Records skipped because their kind tag has no constructor.
    pub unknown: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// Not newer than the last applied snapshot; ignored.
    Stale,
    /// Written by a newer schema than this build understands.
    Unsupported { version: u32 },
    Applied(ApplyReport),
}

pub struct Replica {
    world: World,
    registry: EntityRegistry,
    sweep: SweepConfig,
    last_timestamp: Option<f64>,
    /// Consecutive snapshots each entity has been missing from.
    missed: HashMap<String, u32>,
    local_player: Option<String>,
    events: Vec<(String, EntityEvent)>,
}

impl Replica {
    pub fn new(physics: PhysicsConfig, registry: EntityRegistry, sweep: SweepConfig) -> Self {
        Self {
            world: World::new(physics, Authority::Replica, 0),
            registry,
            sweep,
            last_timestamp: None,
            missed: HashMap::new(),
            local_player: None,
            events: Vec::new(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn local_player(&self) -> Option<&str> {
        self.local_player.as_deref()
    }

    /// Server time of the newest applied snapshot.
    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    /// Moves the replica world forward between snapshots.
    pub fn tick(&mut self, dt: f64) -> u32 {
        self.world.advance(dt)
    }

    /// Events to present, both replicated and locally simulated.
    pub fn take_events(&mut self) -> Vec<(String, EntityEvent)> {
        let mut events = std::mem::take(&mut self.events);
        for entity in self.world.entities_mut() {
            let name = entity.name.clone();
            events.extend(entity.events.drain(..).map(|e| (name.clone(), e)));
        }
        events
    }

    pub fn apply(&mut self, snap: &Snapshot) -> ApplyOutcome {
        if snap.version > SNAPSHOT_VERSION {
            warn!(version = snap.version, "snapshot from a newer schema");
            return ApplyOutcome::Unsupported {
                version: snap.version,
            };
        }
        if self.last_timestamp.is_some_and(|t| snap.timestamp <= t) {
            debug!(timestamp = snap.timestamp, "stale snapshot ignored");
            return ApplyOutcome::Stale;
        }

        let mut report = ApplyReport::default();
        let mut seen: HashSet<&str> = HashSet::with_capacity(snap.objects.len());
        for record in &snap.objects {
            seen.insert(&record.name);
            if record.local_player {
                self.local_player = Some(record.name.clone());
            }
            self.apply_record(record, &mut report);
        }
        self.sweep_unseen(&seen, &mut report);
        self.last_timestamp = Some(snap.timestamp);
        ApplyOutcome::Applied(report)
    }

    fn apply_record(&mut self, record: &ObjectRecord, report: &mut ApplyReport) {
        if let Some(entity) = self.world.get_mut(&record.name) {
            record.attrs.apply_to(entity);
            report.updated += 1;
        } else if !record.final_record {
            let id = self.world.next_id();
            let Some(entity) = self.registry.construct(id, record) else {
                warn!(name = %record.name, kind = %record.kind, "unknown entity kind, skipped");
                report.unknown.push(record.name.clone());
                return;
            };
            if let Err(e) = self.world.spawn(entity) {
                warn!(name = %record.name, error = %e, "cannot create replica entity");
                return;
            }
            report.created.push(record.name.clone());
        }

        for event in &record.events {
            if let EntityEvent::Explode { seed } = event {
                let owner = record.attrs.owner.clone().unwrap_or_default();
                let origin = Vec3::from_xy(record.attrs.position);
                self.world.spawn_shrapnel(&record.name, origin, *seed, &owner);
            }
            self.events.push((record.name.clone(), event.clone()));
        }

        if record.final_record && self.world.remove(&record.name).is_some() {
            self.missed.remove(&record.name);
            report.removed.push(record.name.clone());
        }
    }

    fn sweep_unseen(&mut self, seen: &HashSet<&str>, report: &mut ApplyReport) {
        let mut doomed = Vec::new();
        for entity in self.world.entities() {
            if seen.contains(entity.name.as_str()) {
                self.missed.remove(&entity.name);
                continue;
            }
            if self.is_exempt(entity) {
                continue;
            }
            let missed = self.missed.entry(entity.name.clone()).or_insert(0);
            *missed += 1;
            if *missed > self.sweep.grace_snapshots {
                doomed.push(entity.name.clone());
            }
        }
        for name in doomed {
            self.world.remove(&name);
            self.missed.remove(&name);
            if self.local_player.as_deref() == Some(name.as_str()) {
                self.local_player = None;
            }
            report.removed.push(name);
        }
    }

    /// Locally simulated entities are never swept.
    fn is_exempt(&self, entity: &Entity) -> bool {
        entity.replication != Replication::Continuous || self.sweep.exempt_kinds.contains(&entity.kind)
    }
}
