//! Server world to replica, without a socket in between.

use arena_client::registry::EntityRegistry;
use arena_client::replica::{ApplyOutcome, ApplyReport, Replica};
use arena_shared::arena::ArenaLayout;
use arena_shared::config::SweepConfig;
use arena_shared::combat::SHRAPNEL_COUNT;
use arena_shared::entity::{Entity, EntityKind, Launch};
use arena_shared::intent::Intent;
use arena_shared::math::Vec3;
use arena_shared::physics::PhysicsConfig;
use arena_shared::snapshot::{collect_records, Snapshot, SnapshotClock};
use arena_shared::weapon::{GRENADE_LAUNCHER, PISTOL};
use arena_shared::world::{Authority, World};

fn server() -> World {
    let mut world = World::new(PhysicsConfig::default(), Authority::Authoritative, 21);
    ArenaLayout::default().build(&mut world).unwrap();
    world.spawn_person("ada", Vec3::planar(0.0, 1.0)).unwrap();
    world
}

fn replica() -> Replica {
    Replica::new(
        PhysicsConfig::default(),
        EntityRegistry::default(),
        SweepConfig::default(),
    )
}

fn snapshot(world: &mut World) -> Snapshot {
    let time = world.time();
    Snapshot::new(time, 0.05, collect_records(world)).for_recipient(Some("ada"))
}

fn applied(outcome: ApplyOutcome) -> ApplyReport {
    match outcome {
        ApplyOutcome::Applied(report) => report,
        other => panic!("snapshot not applied: {other:?}"),
    }
}

fn fire(world: &mut World, weapon: Option<u8>) {
    if let Some(ada) = world.get_mut("ada") {
        ada.intent = Intent {
            shoot: true,
            weapon,
            ..Intent::default()
        };
    }
}

fn shards(world: &World) -> Vec<&Entity> {
    world
        .entities()
        .iter()
        .filter(|e| e.kind == EntityKind::Shrapnel)
        .collect()
}

#[test]
fn replica_mirrors_the_server_world() {
    let mut server = server();
    let mut replica = replica();
    server.advance(0.5);
    let report = applied(replica.apply(&snapshot(&mut server)));

    assert_eq!(report.created.len(), server.len());
    assert_eq!(replica.local_player(), Some("ada"));
    for entity in server.entities() {
        let copy = replica.world().get(&entity.name).unwrap();
        assert_eq!(copy.kind, entity.kind);
        assert!((copy.body.position.x - entity.body.position.x).abs() < 1e-5);
        assert!((copy.body.position.y - entity.body.position.y).abs() < 1e-5);
    }
}

#[test]
fn bullets_are_sent_once_and_then_simulated_locally() {
    let mut server = server();
    let mut replica = replica();
    server.advance(0.3);
    replica.apply(&snapshot(&mut server));

    fire(&mut server, None);
    server.advance(0.01);
    let first = snapshot(&mut server);
    let bullets: Vec<_> = first
        .objects
        .iter()
        .filter(|r| r.kind == EntityKind::Bullet.tag())
        .collect();
    assert_eq!(bullets.len(), 1);
    assert!(bullets[0].spawn_only);
    let name = bullets[0].name.clone();
    applied(replica.apply(&first));
    assert!(replica.world().contains(&name));

    server.advance(0.01);
    let second = snapshot(&mut server);
    assert!(second.record(&name).is_none());
    applied(replica.apply(&second));
    assert!(replica.world().contains(&name));
}

#[test]
fn grenade_burst_matches_on_server_and_replica() {
    let mut server = server();
    let mut replica = replica();
    server.advance(0.3);
    replica.apply(&snapshot(&mut server));

    fire(&mut server, Some(GRENADE_LAUNCHER.id));
    let step = server.step();
    let mut grenade = None;
    let mut burst = None;
    for _ in 0..600 {
        server.advance(step);
        let snap = snapshot(&mut server);
        if grenade.is_none() {
            grenade = snap
                .objects
                .iter()
                .find(|r| r.kind == EntityKind::Grenade.tag())
                .map(|r| r.name.clone());
        }
        applied(replica.apply(&snap));
        if let Some(name) = &grenade {
            if snap.record(name).is_some_and(|r| r.final_record) {
                burst = Some(snap);
                break;
            }
        }
    }
    let name = grenade.expect("grenade was launched");
    let burst = burst.expect("grenade went off");

    assert!(!replica.world().contains(&name));
    let on_server = shards(&server);
    let on_replica = shards(replica.world());
    assert_eq!(on_server.len(), SHRAPNEL_COUNT);
    assert_eq!(on_replica.len(), SHRAPNEL_COUNT);
    for shard in on_server {
        let copy = replica.world().get(&shard.name).unwrap();
        assert!((copy.body.position.x - shard.body.position.x).abs() < 1e-4);
        assert!((copy.body.position.y - shard.body.position.y).abs() < 1e-4);
        assert!((copy.body.velocity.x - shard.body.velocity.x).abs() < 1e-4);
        assert!((copy.body.velocity.y - shard.body.velocity.y).abs() < 1e-4);
    }

    // Replaying the final record later neither resurrects nor re-bursts.
    let mut replay = burst;
    replay.timestamp += 1.0;
    let report = applied(replica.apply(&replay));
    assert!(report.created.is_empty());
    assert!(report.removed.is_empty());
    assert!(!replica.world().contains(&name));
    assert_eq!(shards(replica.world()).len(), SHRAPNEL_COUNT);
}

#[test]
fn applying_the_same_state_twice_changes_nothing() {
    let mut server = server();
    let mut replica = replica();
    server.advance(0.2);
    let snap = snapshot(&mut server);
    applied(replica.apply(&snap));
    let before = replica.world().entities().to_vec();

    let mut again = snap;
    again.timestamp += 0.05;
    let report = applied(replica.apply(&again));
    assert!(report.created.is_empty());
    assert!(report.removed.is_empty());
    assert_eq!(replica.world().entities(), before.as_slice());
}

#[test]
fn network_ticks_faster_than_the_physics_step_lose_nothing() {
    let physics = PhysicsConfig {
        step: 0.1,
        ..PhysicsConfig::default()
    };
    let mut server = World::new(physics, Authority::Authoritative, 4);
    server.spawn_person("ada", Vec3::ZERO).unwrap();
    let mut replica = Replica::new(physics, EntityRegistry::default(), SweepConfig::default());
    let mut clock = SnapshotClock::default();

    server.advance(0.05);
    let first = Snapshot::new(clock.stamp(server.time()), 0.05, collect_records(&mut server));
    applied(replica.apply(&first));

    let bullet = server.launch(Launch {
        owner: "ada".into(),
        spec: PISTOL.projectile,
        position: Vec3::planar(1.0, 0.0),
        velocity: Vec3::planar(60.0, 0.0),
    });
    server.advance(0.04);
    assert_eq!(server.time(), 0.0);
    let second = Snapshot::new(clock.stamp(server.time()), 0.05, collect_records(&mut server));
    assert!(second.record(&bullet).is_some());

    applied(replica.apply(&second));
    assert!(replica.world().contains(&bullet));
}
