//! Replication snapshots.
//!
//! A snapshot is the full replicated state of a world at one server time:
//! one [`ObjectRecord`] per continuously replicated entity, one record for
//! each spawn-only entity that clients have not seen yet, and a final record
//! for every entity removed since the previous snapshot. Every field is named
//! and the schema carries a version, so old records remain readable.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    entity::{Entity, GrenadeState, Replication},
    event::EntityEvent,
    math::{Quat, Vec3},
    world::World,
};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Added to a timestamp when the world has not moved since the last one.
pub const STAMP_NUDGE: f64 = 1e-6;

bitflags! {
    /// Person status bits carried in [`PersonAttrs::status`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        const DEAD = 1 << 0;
        const ON_GROUND = 1 << 1;
        const CROUCHING = 1 << 2;
        const RELOADING = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    /// Server clock, seconds.
    pub timestamp: f64,
    /// Seconds until the server plans to send the next snapshot.
    pub next_update_in: f32,
    pub objects: Vec<ObjectRecord>,
}

/// Strictly increasing snapshot timestamps that follow world time.
///
/// The world clock only moves in whole sub-steps, so two network ticks can
/// see the same world time. Clients drop a snapshot that is not newer than
/// the last one, so such a snapshot gets a nudged stamp instead.
#[derive(Debug, Default, Clone)]
pub struct SnapshotClock {
    last: Option<f64>,
}

impl SnapshotClock {
    pub fn stamp(&mut self, world_time: f64) -> f64 {
        let stamp = match self.last {
            Some(last) if world_time <= last => last + STAMP_NUDGE,
            _ => world_time,
        };
        self.last = Some(stamp);
        stamp
    }
}

impl Snapshot {
    pub fn new(timestamp: f64, next_update_in: f32, objects: Vec<ObjectRecord>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            timestamp,
            next_update_in,
            objects,
        }
    }

    /// Copy addressed to one peer: its own person is flagged `local_player`.
    pub fn for_recipient(&self, person: Option<&str>) -> Snapshot {
        let mut snap = self.clone();
        for record in &mut snap.objects {
            record.local_player = person == Some(record.name.as_str());
        }
        snap
    }

    pub fn record(&self, name: &str) -> Option<&ObjectRecord> {
        self.objects.iter().find(|r| r.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub name: String,
    #[serde(default)]
    pub local_player: bool,
    /// Entity kind tag, resolved by the client's registry.
    pub kind: String,
    pub attrs: EntityAttrs,
    #[serde(default)]
    pub events: Vec<EntityEvent>,
    /// Clients simulate this entity locally after the first record.
    #[serde(default)]
    pub spawn_only: bool,
    /// The entity is gone; apply the record's events, then drop it.
    #[serde(default)]
    pub final_record: bool,
}

impl ObjectRecord {
    pub fn from_entity(entity: &Entity, final_record: bool) -> Self {
        Self {
            name: entity.name.clone(),
            local_player: false,
            kind: entity.kind.tag().to_string(),
            attrs: EntityAttrs::capture(entity),
            events: entity.events.clone(),
            spawn_only: matches!(entity.replication, Replication::SpawnOnly { .. }),
            final_record,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAttrs {
    pub position: [f32; 2],
    pub angle: f32,
    pub angular_velocity: f32,
    pub velocity: [f32; 2],
    pub facing: [f32; 2],
    /// Half extents of the collision shape.
    pub size: [f32; 2],
    /// Zero for immovable bodies.
    #[serde(default)]
    pub mass: f32,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub person: Option<PersonAttrs>,
    #[serde(default)]
    pub grenade: Option<GrenadeAttrs>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonAttrs {
    pub health: f32,
    pub max_health: f32,
    pub ammo: u32,
    pub gun: u8,
    /// Reload seconds left.
    pub reload: f32,
    #[serde(default)]
    pub respawn_in: Option<f32>,
    /// [`StatusFlags`] bits.
    pub status: u8,
    pub score: i32,
    /// Smoothed round trip, milliseconds.
    pub ping: f32,
    pub instability: f32,
}

impl PersonAttrs {
    pub fn status_flags(&self) -> StatusFlags {
        StatusFlags::from_bits_truncate(self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrenadeAttrs {
    pub arm_in: f32,
    pub fuse_in: f32,
    pub seed: u64,
}

impl EntityAttrs {
    pub fn capture(entity: &Entity) -> Self {
        let body = &entity.body;
        let half = body.shape.half_extents();
        let person = entity.person.as_ref().map(|p| {
            let mut status = StatusFlags::empty();
            status.set(StatusFlags::DEAD, p.is_dead());
            status.set(StatusFlags::ON_GROUND, entity.on_ground);
            status.set(StatusFlags::CROUCHING, p.crouching);
            let gun = p.gun();
            status.set(
                StatusFlags::RELOADING,
                gun.is_some_and(|g| g.is_reloading()),
            );
            PersonAttrs {
                health: p.health,
                max_health: p.max_health,
                ammo: gun.map_or(0, |g| g.ammo),
                gun: gun.map_or(0, |g| g.id),
                reload: gun.map_or(0.0, |g| g.reload_remaining),
                respawn_in: p.respawn_in,
                status: status.bits(),
                score: p.score,
                ping: p.ping,
                instability: gun.map_or(0.0, |g| g.instability()),
            }
        });
        let grenade = entity.grenade().map(|g| GrenadeAttrs {
            arm_in: g.arm_in,
            fuse_in: g.fuse_in,
            seed: g.seed,
        });
        Self {
            position: body.position.xy(),
            angle: body.angle(),
            angular_velocity: body.angular_velocity,
            velocity: body.velocity.xy(),
            facing: entity.facing.xy(),
            size: [half.x, half.y],
            mass: body.mass(),
            owner: entity.projectile.as_ref().map(|p| p.owner.clone()),
            person,
            grenade,
        }
    }

    /// Overwrites the replicated state of `entity` with these attributes.
    pub fn apply_to(&self, entity: &mut Entity) {
        let body = &mut entity.body;
        body.position = Vec3::from_xy(self.position);
        body.orientation = Quat::from_rotation_z(self.angle);
        body.angular_velocity = self.angular_velocity;
        body.velocity = Vec3::from_xy(self.velocity);
        entity.facing = Vec3::from_xy(self.facing).normalize_or(entity.facing);

        if let (Some(attrs), Some(person)) = (&self.person, entity.person.as_mut()) {
            let status = attrs.status_flags();
            person.health = attrs.health;
            person.max_health = attrs.max_health;
            person.score = attrs.score;
            person.ping = attrs.ping;
            person.respawn_in = attrs.respawn_in;
            person.crouching = status.contains(StatusFlags::CROUCHING);
            person.select(attrs.gun);
            if let Some(gun) = person.gun_mut() {
                gun.ammo = attrs.ammo.min(gun.max_ammo);
                gun.reload_remaining = attrs.reload;
                gun.accuracy = gun.max_accuracy - attrs.instability;
            }
            let dead = status.contains(StatusFlags::DEAD);
            entity.dead = dead;
            entity.body.enabled = !dead;
            entity.on_ground = status.contains(StatusFlags::ON_GROUND);
        }

        if let (Some(attrs), Some(grenade)) = (&self.grenade, entity.grenade_mut()) {
            grenade.arm_in = attrs.arm_in;
            grenade.fuse_in = attrs.fuse_in;
            grenade.seed = attrs.seed;
            if grenade.state == GrenadeState::Arming && attrs.arm_in <= 0.0 {
                grenade.state = GrenadeState::Live;
            }
        }
    }
}

/// Builds this network tick's records and resets per-tick replication state:
/// spawn-only entities are marked sent, events are cleared and tombstones
/// are consumed.
pub fn collect_records(world: &mut World) -> Vec<ObjectRecord> {
    let mut records = Vec::new();
    for entity in world.entities_mut() {
        match entity.replication {
            Replication::Continuous => records.push(ObjectRecord::from_entity(entity, false)),
            Replication::SpawnOnly { sent: false } => {
                records.push(ObjectRecord::from_entity(entity, false));
                entity.replication = Replication::SpawnOnly { sent: true };
            }
            Replication::SpawnOnly { sent: true } | Replication::LocalOnly => {}
        }
        entity.events.clear();
    }
    records.extend(
        world
            .take_tombstones()
            .iter()
            .map(|e| ObjectRecord::from_entity(e, true)),
    );
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        entity::{EntityKind, Launch},
        physics::PhysicsConfig,
        weapon::PISTOL,
        world::Authority,
    };

    fn world() -> World {
        World::new(PhysicsConfig::default(), Authority::Authoritative, 3)
    }

    #[test]
    fn stamps_increase_even_when_the_world_stands_still() {
        let mut clock = SnapshotClock::default();
        let a = clock.stamp(0.0);
        let b = clock.stamp(0.0);
        let c = clock.stamp(0.0);
        assert!(a < b && b < c);
        assert_eq!(clock.stamp(0.5), 0.5);
    }

    #[test]
    fn spawn_only_entities_are_sent_once_and_local_ones_never() {
        let mut world = world();
        world.spawn_person("ada", Vec3::ZERO).unwrap();
        let bullet = world.launch(Launch {
            owner: "ada".into(),
            spec: PISTOL.projectile,
            position: Vec3::planar(5.0, 0.0),
            velocity: Vec3::planar(60.0, 0.0),
        });
        world.spawn_shrapnel("g", Vec3::planar(-5.0, 0.0), 1, "ada");

        let first = collect_records(&mut world);
        assert_eq!(first.len(), 2);
        let record = first.iter().find(|r| r.name == bullet).unwrap();
        assert!(record.spawn_only);
        assert_eq!(record.attrs.owner.as_deref(), Some("ada"));

        let second = collect_records(&mut world);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name, "ada");
    }

    #[test]
    fn events_ship_once() {
        let mut world = world();
        world.spawn_person("ada", Vec3::ZERO).unwrap();
        world.get_mut("ada").unwrap().take_damage(10.0);
        let first = collect_records(&mut world);
        assert_eq!(first[0].events, vec![EntityEvent::Hit]);
        assert!(collect_records(&mut world)[0].events.is_empty());
    }

    #[test]
    fn tombstones_become_final_records() {
        let mut world = world();
        world.spawn_person("ada", Vec3::ZERO).unwrap();
        world.remove("ada");
        let records = collect_records(&mut world);
        assert_eq!(records.len(), 1);
        assert!(records[0].final_record);
        assert!(collect_records(&mut world).is_empty());
    }

    #[test]
    fn applying_attrs_twice_changes_nothing() {
        let mut source = Entity::person(crate::entity::EntityId(0), "ada", Vec3::planar(1.0, 2.0));
        source.body.velocity = Vec3::planar(3.0, -1.0);
        source.take_damage(30.0);
        let attrs = EntityAttrs::capture(&source);

        let mut replica = Entity::person(crate::entity::EntityId(9), "ada", Vec3::ZERO);
        attrs.apply_to(&mut replica);
        let once = replica.clone();
        attrs.apply_to(&mut replica);
        assert_eq!(replica, once);
        assert_eq!(replica.body.position, source.body.position);
        assert_eq!(replica.person.as_ref().unwrap().health, 70.0);
    }

    #[test]
    fn dead_status_disables_the_replica_body() {
        let mut source = Entity::person(crate::entity::EntityId(0), "ada", Vec3::ZERO);
        source.take_damage(500.0);
        let attrs = EntityAttrs::capture(&source);
        assert!(attrs
            .person
            .as_ref()
            .unwrap()
            .status_flags()
            .contains(StatusFlags::DEAD));

        let mut replica = Entity::person(crate::entity::EntityId(1), "ada", Vec3::ZERO);
        attrs.apply_to(&mut replica);
        assert!(replica.dead && !replica.body.enabled);
    }

    #[test]
    fn recipient_copy_flags_only_its_person() {
        let mut world = world();
        world.spawn_person("ada", Vec3::ZERO).unwrap();
        world.spawn_person("bob", Vec3::planar(3.0, 0.0)).unwrap();
        let snap = Snapshot::new(1.0, 0.05, collect_records(&mut world));
        let for_bob = snap.for_recipient(Some("bob"));
        assert!(for_bob.record("bob").unwrap().local_player);
        assert!(!for_bob.record("ada").unwrap().local_player);
        assert!(snap.for_recipient(None).objects.iter().all(|r| !r.local_player));
    }

    #[test]
    fn records_use_named_fields() {
        let entity = Entity::terrain(
            crate::entity::EntityId(0),
            "floor",
            Vec3::ZERO,
            Vec3::new(5.0, 1.0, 1.0),
        );
        let json = serde_json::to_value(ObjectRecord::from_entity(&entity, false)).unwrap();
        assert_eq!(json["kind"], EntityKind::Static.tag());
        assert_eq!(json["final_record"], false);
        assert_eq!(json["attrs"]["size"][0], 5.0);
    }
}
