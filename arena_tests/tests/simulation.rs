//! Gameplay rules exercised through a whole authoritative world.

use arena_shared::entity::{Entity, EntityKind, RESPAWN_TIME};
use arena_shared::event::EntityEvent;
use arena_shared::intent::Intent;
use arena_shared::math::Vec3;
use arena_shared::physics::PhysicsConfig;
use arena_shared::weapon::PISTOL;
use arena_shared::world::{Authority, World};

fn world() -> World {
    World::new(PhysicsConfig::default(), Authority::Authoritative, 11)
}

fn set_intent(world: &mut World, name: &str, intent: Intent) {
    if let Some(entity) = world.get_mut(name) {
        entity.intent = intent;
    }
}

fn count(world: &World, name: &str, event: &EntityEvent) -> usize {
    world
        .get(name)
        .map_or(0, |e| e.events.iter().filter(|ev| *ev == event).count())
}

fn ammo(world: &World, name: &str) -> u32 {
    world
        .get(name)
        .and_then(|e| e.person.as_ref())
        .and_then(|p| p.gun())
        .map_or(0, |g| g.ammo)
}

/// Holds the trigger for a while, then lets go for one sub-step.
fn pull_trigger(world: &mut World, name: &str) {
    let shoot = Intent {
        shoot: true,
        ..Intent::default()
    };
    set_intent(world, name, shoot);
    world.advance(0.25);
    set_intent(world, name, Intent::default());
    world.advance(0.01);
}

#[test]
fn pistol_empties_its_magazine_then_needs_a_reload() {
    let mut world = world();
    world.spawn_person("ada", Vec3::ZERO).unwrap();

    for _ in 0..PISTOL.max_ammo {
        pull_trigger(&mut world, "ada");
    }
    assert_eq!(count(&world, "ada", &EntityEvent::Shoot), 12);
    assert_eq!(ammo(&world, "ada"), 0);

    pull_trigger(&mut world, "ada");
    assert_eq!(count(&world, "ada", &EntityEvent::Shoot), 12);

    set_intent(
        &mut world,
        "ada",
        Intent {
            reload: true,
            ..Intent::default()
        },
    );
    world.advance(0.01);
    assert_eq!(ammo(&world, "ada"), PISTOL.max_ammo);
    assert_eq!(count(&world, "ada", &EntityEvent::Reload), 1);

    // Still reloading: the trigger does nothing.
    pull_trigger(&mut world, "ada");
    assert_eq!(count(&world, "ada", &EntityEvent::Shoot), 12);

    world.advance(f64::from(PISTOL.reload_time));
    pull_trigger(&mut world, "ada");
    assert_eq!(count(&world, "ada", &EntityEvent::Shoot), 13);
    assert_eq!(ammo(&world, "ada"), PISTOL.max_ammo - 1);
}

#[test]
fn lethal_hit_kills_once_credits_once_and_respawns_once() {
    let mut world = world();
    world.spawn_person("ada", Vec3::planar(-10.0, 0.0)).unwrap();
    world.spawn_person("bob", Vec3::ZERO).unwrap();

    let mut shots = Vec::new();
    for n in 0..2 {
        let id = world.next_id();
        shots.push(Entity::projectile(
            id,
            format!("bullet#shot{n}"),
            EntityKind::Bullet,
            "ada",
            Vec3::planar(-1.0 - n as f32 * 0.2, 0.0),
            Vec3::planar(60.0, 0.0),
            150.0,
        ));
    }
    for shot in shots {
        world.spawn(shot).unwrap();
    }

    world.advance(0.1);
    assert_eq!(count(&world, "bob", &EntityEvent::Death), 1);
    let bob = world.get("bob").unwrap();
    assert!(bob.dead);
    assert!(!bob.body.enabled);
    let ada_score = world.get("ada").and_then(|e| e.person.as_ref()).unwrap().score;
    assert_eq!(ada_score, 1);

    world.advance(f64::from(RESPAWN_TIME) + 0.5);
    assert_eq!(count(&world, "bob", &EntityEvent::Respawn), 1);
    let bob = world.get("bob").unwrap();
    let person = bob.person.as_ref().unwrap();
    assert!(!bob.dead);
    assert_eq!(person.health, person.max_health);
}

#[test]
fn irregular_frame_times_keep_the_fixed_step() {
    let mut even = world();
    let mut ragged = world();
    even.spawn_person("ada", Vec3::planar(0.0, 50.0)).unwrap();
    ragged.spawn_person("ada", Vec3::planar(0.0, 50.0)).unwrap();

    for _ in 0..50 {
        even.advance(0.02);
    }
    let frames = [0.013, 0.027, 0.004, 0.031, 0.025];
    for _ in 0..10 {
        for dt in frames {
            ragged.advance(dt);
        }
    }
    // Both consumed a whole second; any leftover is less than one step.
    assert!((even.time() - ragged.time()).abs() < even.step() + 1e-9);
    let y_even = even.get("ada").unwrap().body.position.y;
    let y_ragged = ragged.get("ada").unwrap().body.position.y;
    assert!((y_even - y_ragged).abs() < 0.2);
}
