//! The fixed-timestep world.
//!
//! A [`World`] owns every entity, the physics state and the id counter. The
//! server runs an [`Authority::Authoritative`] world that applies intents and
//! game rules; clients run a [`Authority::Replica`] world that only moves
//! bodies between snapshots and simulates spawn-only and local projectiles.

use anyhow::{bail, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::{
    combat::{resolve_pair, shrapnel_pattern},
    entity::{
        Entity, EntityId, EntityKind, Grenade, GrenadeState, IdGenerator, Launch, Replication,
        GRENADE_RADIUS, SHRAPNEL_DAMAGE,
    },
    event::{Detonation, EntityEvent, EventBus, Frag},
    intent::MoveParams,
    math::Vec3,
    physics::{PhysicsConfig, PhysicsWorld},
};

/// Who decides game outcomes in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Authoritative,
    Replica,
}

pub struct World {
    pub physics: PhysicsWorld,
    pub move_params: MoveParams,
    entities: Vec<Entity>,
    ids: IdGenerator,
    debt: f64,
    time: f64,
    authority: Authority,
    bus: EventBus,
    rng: ChaCha8Rng,
    tombstones: Vec<Entity>,
}

impl World {
    pub fn new(config: PhysicsConfig, authority: Authority, seed: u64) -> Self {
        Self {
            physics: PhysicsWorld::new(config),
            move_params: MoveParams::default(),
            entities: Vec::new(),
            ids: IdGenerator::default(),
            debt: 0.0,
            time: 0.0,
            authority,
            bus: EventBus::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            tombstones: Vec::new(),
        }
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn is_authoritative(&self) -> bool {
        self.authority == Authority::Authoritative
    }

    /// Simulated seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Fixed sub-step, seconds.
    pub fn step(&self) -> f64 {
        f64::from(self.physics.config.step)
    }

    pub fn next_id(&mut self) -> EntityId {
        self.ids.next_id()
    }

    /// Adds an entity; names must be unique.
    pub fn spawn(&mut self, entity: Entity) -> Result<()> {
        if self.contains(&entity.name) {
            bail!("entity `{}` already exists", entity.name);
        }
        debug!(name = %entity.name, kind = entity.kind.tag(), "spawn");
        self.entities.push(entity);
        Ok(())
    }

    pub fn spawn_person(&mut self, name: &str, spawn_point: Vec3) -> Result<EntityId> {
        let id = self.next_id();
        self.spawn(Entity::person(id, name, spawn_point))?;
        Ok(id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.iter().any(|e| e.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.name == name)
    }

    /// Removes an entity. Authoritative worlds keep a tombstone for
    /// continuously replicated entities so clients hear about it.
    pub fn remove(&mut self, name: &str) -> Option<Entity> {
        let index = self.entities.iter().position(|e| e.name == name)?;
        let entity = self.entities.remove(index);
        if self.is_authoritative() && entity.replication == Replication::Continuous {
            self.tombstones.push(entity.clone());
        }
        Some(entity)
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities removed since the last call that still owe a final record.
    pub fn take_tombstones(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.tombstones)
    }

    /// Consumes `elapsed` seconds of wall time in fixed sub-steps and returns
    /// how many ran. Leftover time carries over to the next call.
    pub fn advance(&mut self, elapsed: f64) -> u32 {
        if elapsed.is_finite() && elapsed > 0.0 {
            self.debt += elapsed;
        }
        let step = self.step();
        let mut substeps = 0;
        while self.debt >= step {
            self.substep();
            self.debt -= step;
            substeps += 1;
        }
        substeps
    }

    fn substep(&mut self) {
        let dt = self.physics.config.step;
        let authoritative = self.is_authoritative();

        for entity in &mut self.entities {
            entity.on_ground = false;
        }

        let pairs = self.physics.candidate_pairs(&self.entities);
        for (i, j) in pairs {
            resolve_pair(
                &mut self.entities,
                i,
                j,
                &mut self.physics,
                &mut self.bus,
                self.authority,
            );
        }

        if authoritative {
            let mut launches = Vec::new();
            for entity in &mut self.entities {
                launches.extend(entity.apply_intent(dt, &self.move_params, &mut self.rng));
            }
            for launch in launches {
                self.launch(launch);
            }
        }

        self.physics.step(&mut self.entities);

        for entity in &mut self.entities {
            if entity.post_step(dt, authoritative) {
                self.bus.push(Detonation {
                    grenade: entity.name.clone(),
                });
            }
        }
        for frag in self.bus.drain::<Frag>() {
            self.credit(&frag);
        }
        for detonation in self.bus.drain::<Detonation>() {
            self.detonate(&detonation.grenade);
        }

        self.reap();
        self.physics.clear_joints();
        self.time += f64::from(dt);
    }

    /// Spawns the projectile a person fired and returns its name. Ids whose
    /// generated name is already taken are skipped.
    pub fn launch(&mut self, launch: Launch) -> String {
        let kind = launch.spec.kind;
        let (id, name) = loop {
            let id = self.next_id();
            let name = format!("{}#{}", kind.tag(), id.0);
            if !self.contains(&name) {
                break (id, name);
            }
        };
        let mut entity = Entity::projectile(
            id,
            name.clone(),
            kind,
            launch.owner,
            launch.position,
            launch.velocity,
            launch.spec.damage,
        );
        if kind == EntityKind::Grenade {
            if let Some(projectile) = entity.projectile.as_mut() {
                projectile.grenade = Some(Grenade::new(self.rng.gen()));
            }
        }
        self.entities.push(entity);
        name
    }

    /// Spawns the local shrapnel burst of grenade `source`. Returns how many
    /// shards were created; shards that already exist are left alone.
    pub fn spawn_shrapnel(&mut self, source: &str, origin: Vec3, seed: u64, owner: &str) -> usize {
        let mut spawned = 0;
        for (i, shard) in shrapnel_pattern(seed).into_iter().enumerate() {
            let name = format!("{source}:{i}");
            if self.contains(&name) {
                continue;
            }
            let id = self.next_id();
            self.entities.push(Entity::projectile(
                id,
                name,
                EntityKind::Shrapnel,
                owner,
                origin + shard.direction * GRENADE_RADIUS,
                shard.direction * shard.speed,
                SHRAPNEL_DAMAGE,
            ));
            spawned += 1;
        }
        spawned
    }

    /// Bursts a grenade: emits `explode`, spends it and spawns its shrapnel.
    fn detonate(&mut self, name: &str) {
        let Some(entity) = self.get_mut(name) else {
            return;
        };
        let owner = entity
            .projectile
            .as_ref()
            .map(|p| p.owner.clone())
            .unwrap_or_default();
        let origin = entity.body.position;
        let Some(grenade) = entity.grenade_mut() else {
            return;
        };
        if grenade.state == GrenadeState::Spent {
            return;
        }
        grenade.state = GrenadeState::Spent;
        let seed = grenade.seed;
        entity.dead = true;
        entity.events.push(EntityEvent::Explode { seed });

        let shards = self.spawn_shrapnel(name, origin, seed, &owner);
        debug!(grenade = name, shards, "detonated");
    }

    fn credit(&mut self, frag: &Frag) {
        if frag.shooter == frag.victim {
            if let Some(person) = self.get_mut(&frag.victim).and_then(|e| e.person.as_mut()) {
                person.score -= 1;
            }
            info!(victim = %frag.victim, "suicide");
            return;
        }
        if let Some(person) = self.get_mut(&frag.shooter).and_then(|e| e.person.as_mut()) {
            person.score += 1;
        }
        info!(shooter = %frag.shooter, victim = %frag.victim, "frag");
    }

    /// Removes dead non-person entities.
    fn reap(&mut self) {
        if !self.entities.iter().any(|e| e.dead && !e.is_person()) {
            return;
        }
        let (reaped, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entities)
            .into_iter()
            .partition(|e| e.dead && !e.is_person());
        self.entities = kept;
        if self.is_authoritative() {
            self.tombstones.extend(
                reaped
                    .into_iter()
                    .filter(|e| e.replication == Replication::Continuous),
            );
        }
    }
}
