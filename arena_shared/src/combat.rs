//! Collision-driven combat.
//!
//! [`resolve_pair`] is called for every broad-phase pair of a sub-step. It
//! decides whether the pair touches, applies game rules to each side and
//! attaches a contact joint. Side effects that touch a third entity (score
//! credit, shrapnel bursts) are queued on the [`EventBus`] and applied by the
//! stepper once no entity is borrowed.

use std::f32::consts::TAU;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    entity::{DamageOutcome, Entity, EntityKind, GrenadeContact},
    event::{Detonation, EntityEvent, EventBus, Frag},
    math::Vec3,
    physics::{collide, pair_mut, ContactJoint, Material, PhysicsWorld},
    world::Authority,
};

pub const SHRAPNEL_COUNT: usize = 50;
pub const SHRAPNEL_MIN_SPEED: f32 = 15.0;
pub const SHRAPNEL_MAX_SPEED: f32 = 35.0;

/// Contact normals steeper than this count as standing on something.
const GROUND_NORMAL_Y: f32 = 0.5;
/// Grenade impacts slower than this roll instead of ricocheting.
const RICOCHET_SPEED: f32 = 1.0;

const GRENADE_MATERIAL: Material = Material {
    bounce: 5.0,
    bounce_vel: 1.5,
    friction: 0.4,
};

const BULLET_MATERIAL: Material = Material {
    bounce: 0.0,
    bounce_vel: 1.0,
    friction: 0.0,
};

/// Surface parameters for a pair.
pub fn material_for(a: &Entity, b: &Entity) -> Material {
    let kinds = [a.kind, b.kind];
    if kinds.contains(&EntityKind::Grenade) {
        GRENADE_MATERIAL
    } else if kinds.iter().any(|k| k.is_bullet_class()) {
        BULLET_MATERIAL
    } else {
        Material::DEFAULT
    }
}

/// Narrow phase plus game rules for one candidate pair.
pub fn resolve_pair(
    entities: &mut [Entity],
    i: usize,
    j: usize,
    physics: &mut PhysicsWorld,
    bus: &mut EventBus,
    authority: Authority,
) {
    debug_assert!(
        i < entities.len() && j < entities.len(),
        "collision pair ({i}, {j}) refers to a missing entity"
    );
    let Some((a, b)) = pair_mut(entities, i, j) else {
        return;
    };
    if a.kind.is_projectile() && b.kind.is_projectile() {
        return;
    }
    let Some(contact) = collide(&a.body, &b.body) else {
        return;
    };

    let approach = -(a.body.velocity - b.body.velocity).dot(contact.normal);
    strike(a, b, approach, bus, authority);
    strike(b, a, approach, bus, authority);

    if contact.normal.y > GROUND_NORMAL_Y {
        a.on_ground = true;
    }
    if contact.normal.y < -GROUND_NORMAL_Y {
        b.on_ground = true;
    }

    let material = material_for(a, b);
    physics.attach(ContactJoint {
        a: i,
        b: j,
        contact,
        material,
    });
}

/// Applies the projectile rules for `shot` hitting `target`.
fn strike(
    shot: &mut Entity,
    target: &mut Entity,
    approach: f32,
    bus: &mut EventBus,
    authority: Authority,
) {
    if shot.dead {
        return;
    }
    let Some(projectile) = shot.projectile.as_mut() else {
        return;
    };

    if shot.kind.is_bullet_class() {
        shot.dead = true;
        shot.events.push(EntityEvent::Hit);
        if authority == Authority::Authoritative
            && target.take_damage(projectile.damage) == DamageOutcome::Killed
        {
            bus.push(Frag {
                shooter: projectile.owner.clone(),
                victim: target.name.clone(),
            });
        }
        return;
    }

    let Some(grenade) = projectile.grenade.as_mut() else {
        return;
    };
    if authority == Authority::Replica {
        // Replicas bounce grenades but wait for the server's explode event.
        return;
    }
    match grenade.on_contact() {
        GrenadeContact::Ricochet if approach > RICOCHET_SPEED => {
            shot.events.push(EntityEvent::Ricochet);
        }
        GrenadeContact::Detonate => bus.push(Detonation {
            grenade: shot.name.clone(),
        }),
        GrenadeContact::Ricochet | GrenadeContact::Ignore => {}
    }
}

/// One fragment of a burst.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shard {
    pub direction: Vec3,
    pub speed: f32,
}

/// The burst a grenade with `seed` produces, identical on every observer.
pub fn shrapnel_pattern(seed: u64) -> Vec<Shard> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..SHRAPNEL_COUNT)
        .map(|_| {
            let angle = rng.gen_range(0.0..TAU);
            let speed = rng.gen_range(SHRAPNEL_MIN_SPEED..SHRAPNEL_MAX_SPEED);
            Shard {
                direction: Vec3::from_angle(angle),
                speed,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityId, Grenade, GRENADE_ARM_TIME};

    fn setup() -> (Vec<Entity>, PhysicsWorld, EventBus) {
        let victim = Entity::person(EntityId(0), "bob", Vec3::ZERO);
        let bullet = Entity::projectile(
            EntityId(1),
            "bullet#1",
            EntityKind::Bullet,
            "ada",
            Vec3::planar(0.52, 0.0),
            Vec3::planar(-60.0, 0.0),
            25.0,
        );
        (vec![victim, bullet], PhysicsWorld::default(), EventBus::default())
    }

    #[test]
    fn bullet_hit_damages_person_and_dies() {
        let (mut ents, mut physics, mut bus) = setup();
        resolve_pair(&mut ents, 0, 1, &mut physics, &mut bus, Authority::Authoritative);
        assert!(ents[1].dead);
        assert_eq!(ents[0].person.as_ref().unwrap().health, 75.0);
        assert_eq!(physics.joints().len(), 1);
    }

    #[test]
    fn dead_bullet_cannot_hit_twice() {
        let (mut ents, mut physics, mut bus) = setup();
        resolve_pair(&mut ents, 0, 1, &mut physics, &mut bus, Authority::Authoritative);
        resolve_pair(&mut ents, 0, 1, &mut physics, &mut bus, Authority::Authoritative);
        assert_eq!(ents[0].person.as_ref().unwrap().health, 75.0);
    }

    #[test]
    fn replicas_never_apply_damage() {
        let (mut ents, mut physics, mut bus) = setup();
        resolve_pair(&mut ents, 0, 1, &mut physics, &mut bus, Authority::Replica);
        assert!(ents[1].dead);
        assert_eq!(ents[0].person.as_ref().unwrap().health, 100.0);
    }

    #[test]
    fn kill_queues_a_frag_for_the_owner() {
        let (mut ents, mut physics, mut bus) = setup();
        ents[0].person.as_mut().unwrap().health = 10.0;
        resolve_pair(&mut ents, 0, 1, &mut physics, &mut bus, Authority::Authoritative);
        assert_eq!(
            bus.drain::<Frag>(),
            vec![Frag {
                shooter: "ada".into(),
                victim: "bob".into()
            }]
        );
    }

    #[test]
    fn projectiles_never_collide_with_each_other() {
        let (mut ents, mut physics, mut bus) = setup();
        ents[0] = Entity::projectile(
            EntityId(0),
            "bullet#0",
            EntityKind::Bullet,
            "bob",
            Vec3::planar(0.5, 0.0),
            Vec3::ZERO,
            25.0,
        );
        resolve_pair(&mut ents, 0, 1, &mut physics, &mut bus, Authority::Authoritative);
        assert!(!ents[0].dead && !ents[1].dead);
        assert!(physics.joints().is_empty());
    }

    #[test]
    fn arming_grenade_ricochets_and_live_one_detonates() {
        let floor = Entity::terrain(
            EntityId(0),
            "floor",
            Vec3::planar(0.0, -0.5),
            Vec3::new(10.0, 0.5, 1.0),
        );
        let mut grenade = Entity::projectile(
            EntityId(1),
            "grenade#1",
            EntityKind::Grenade,
            "ada",
            Vec3::planar(0.0, 0.1),
            Vec3::planar(0.0, -5.0),
            0.0,
        );
        grenade.projectile.as_mut().unwrap().grenade = Some(Grenade::new(9));
        let mut ents = vec![floor, grenade];
        let mut physics = PhysicsWorld::default();
        let mut bus = EventBus::default();

        resolve_pair(&mut ents, 0, 1, &mut physics, &mut bus, Authority::Authoritative);
        assert_eq!(ents[1].events, vec![EntityEvent::Ricochet]);
        assert!(bus.drain::<Detonation>().is_empty());

        ents[1].grenade_mut().unwrap().tick(GRENADE_ARM_TIME);
        resolve_pair(&mut ents, 0, 1, &mut physics, &mut bus, Authority::Authoritative);
        assert_eq!(bus.drain::<Detonation>().len(), 1);
        assert!(ents[1].on_ground);
    }

    #[test]
    fn resting_arming_grenade_stays_quiet() {
        let floor = Entity::terrain(
            EntityId(0),
            "floor",
            Vec3::planar(0.0, -0.5),
            Vec3::new(10.0, 0.5, 1.0),
        );
        let mut grenade = Entity::projectile(
            EntityId(1),
            "grenade#1",
            EntityKind::Grenade,
            "ada",
            Vec3::planar(0.0, 0.1),
            Vec3::planar(0.0, -0.5 * RICOCHET_SPEED),
            0.0,
        );
        grenade.projectile.as_mut().unwrap().grenade = Some(Grenade::new(9));
        let mut ents = vec![floor, grenade];
        let mut physics = PhysicsWorld::default();
        let mut bus = EventBus::default();

        resolve_pair(&mut ents, 0, 1, &mut physics, &mut bus, Authority::Authoritative);
        assert!(ents[1].events.is_empty());
        assert!(bus.drain::<Detonation>().is_empty());
    }

    #[test]
    fn shrapnel_pattern_is_seed_reproducible() {
        let a = shrapnel_pattern(42);
        let b = shrapnel_pattern(42);
        assert_eq!(a.len(), SHRAPNEL_COUNT);
        assert_eq!(a, b);
        assert_ne!(a, shrapnel_pattern(43));
        assert!(a
            .iter()
            .all(|s| (SHRAPNEL_MIN_SPEED..SHRAPNEL_MAX_SPEED).contains(&s.speed)));
    }
}
