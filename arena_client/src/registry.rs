//! Kind tag → constructor registry.
//!
//! Snapshots name an entity's kind by string tag. The registry maps each tag
//! to a function that builds a local entity from its first record; tags
//! without a constructor are reported to the caller, which skips them.

use std::collections::HashMap;

use arena_shared::{
    entity::{Entity, EntityId, EntityKind, Grenade, Replication},
    math::Vec3,
    snapshot::ObjectRecord,
};

pub type Constructor = fn(EntityId, &ObjectRecord) -> Entity;

pub struct EntityRegistry {
    constructors: HashMap<String, Constructor>,
}

impl EntityRegistry {
    /// A registry with no kinds.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn register(&mut self, tag: &str, constructor: Constructor) {
        self.constructors.insert(tag.to_string(), constructor);
    }

    pub fn knows(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Builds the entity for `record` with its attributes applied.
    pub fn construct(&self, id: EntityId, record: &ObjectRecord) -> Option<Entity> {
        let constructor = self.constructors.get(&record.kind)?;
        let mut entity = constructor(id, record);
        record.attrs.apply_to(&mut entity);
        Some(entity)
    }
}

impl Default for EntityRegistry {
    /// Every kind the simulation knows.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(EntityKind::Static.tag(), terrain);
        registry.register(EntityKind::Dynamic.tag(), crate_box);
        registry.register(EntityKind::Sphere.tag(), ball);
        registry.register(EntityKind::Person.tag(), person);
        registry.register(EntityKind::Bullet.tag(), projectile);
        registry.register(EntityKind::Shrapnel.tag(), projectile);
        registry.register(EntityKind::Grenade.tag(), projectile);
        registry
    }
}

fn position(record: &ObjectRecord) -> Vec3 {
    Vec3::from_xy(record.attrs.position)
}

fn half(record: &ObjectRecord) -> Vec3 {
    let [x, y] = record.attrs.size;
    Vec3::new(x, y, 1.0)
}

fn mass(record: &ObjectRecord) -> f32 {
    if record.attrs.mass > 0.0 {
        record.attrs.mass
    } else {
        1.0
    }
}

fn terrain(id: EntityId, record: &ObjectRecord) -> Entity {
    Entity::terrain(id, record.name.clone(), position(record), half(record))
}

fn crate_box(id: EntityId, record: &ObjectRecord) -> Entity {
    Entity::crate_box(
        id,
        record.name.clone(),
        position(record),
        half(record),
        mass(record),
    )
}

fn ball(id: EntityId, record: &ObjectRecord) -> Entity {
    Entity::ball(
        id,
        record.name.clone(),
        position(record),
        record.attrs.size[0],
        mass(record),
    )
}

fn person(id: EntityId, record: &ObjectRecord) -> Entity {
    Entity::person(id, record.name.clone(), position(record))
}

/// Bullets, grenades and shrapnel. Replicas never apply damage, so the
/// damage figure is left at zero.
fn projectile(id: EntityId, record: &ObjectRecord) -> Entity {
    let kind = EntityKind::from_tag(&record.kind).unwrap_or(EntityKind::Bullet);
    let mut entity = Entity::projectile(
        id,
        record.name.clone(),
        kind,
        record.attrs.owner.clone().unwrap_or_default(),
        position(record),
        Vec3::from_xy(record.attrs.velocity),
        0.0,
    );
    if record.spawn_only {
        entity.replication = Replication::SpawnOnly { sent: true };
    }
    if let (Some(attrs), Some(p)) = (&record.attrs.grenade, entity.projectile.as_mut()) {
        p.grenade = Some(Grenade::new(attrs.seed));
    }
    entity
}
