//! Game entities.
//!
//! Every object in the arena is one flat [`Entity`] record: identity, a rigid
//! body, behaviour flags and optional capability blocks ([`Person`],
//! [`Projectile`]). Behaviour is selected by matching on [`EntityKind`] and
//! on which blocks are present, not by subtyping.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    event::EntityEvent,
    intent::{plan_movement, Intent, MoveParams, MoveState},
    math::{Quat, Vec3},
    physics::{Category, HasBody, RigidBody, Shape},
    weapon::{Gun, ProjectileSpec, Stance, CATALOGUE},
};

pub const PERSON_RADIUS: f32 = 0.5;
pub const PERSON_MASS: f32 = 70.0;
pub const MAX_HEALTH: f32 = 100.0;
pub const RESPAWN_TIME: f32 = 3.0;
pub const BULLET_RADIUS: f32 = 0.05;
pub const BULLET_LIFETIME: f32 = 3.0;
pub const GRENADE_RADIUS: f32 = 0.12;
pub const GRENADE_ARM_TIME: f32 = 0.3;
pub const GRENADE_FUSE_TIME: f32 = 3.0;
pub const SHRAPNEL_RADIUS: f32 = 0.04;
pub const SHRAPNEL_LIFETIME: f32 = 0.6;
pub const SHRAPNEL_DAMAGE: f32 = 9.0;

/// Hinge anchor of the torso above the body center.
const TORSO_OFFSET: Vec3 = Vec3::planar(0.0, 0.6);
const MUZZLE_CLEARANCE: f32 = 0.05;

/// Opaque entity id, unique within one world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

/// Monotonic id source owned by a world.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn next_id(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next += 1;
        id
    }
}

/// Type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Static,
    Dynamic,
    Sphere,
    Person,
    Bullet,
    Grenade,
    Shrapnel,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Static,
        EntityKind::Dynamic,
        EntityKind::Sphere,
        EntityKind::Person,
        EntityKind::Bullet,
        EntityKind::Grenade,
        EntityKind::Shrapnel,
    ];

    /// Wire tag.
    pub fn tag(self) -> &'static str {
        match self {
            EntityKind::Static => "static",
            EntityKind::Dynamic => "dynamic",
            EntityKind::Sphere => "sphere",
            EntityKind::Person => "person",
            EntityKind::Bullet => "bullet",
            EntityKind::Grenade => "grenade",
            EntityKind::Shrapnel => "shrapnel",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    pub fn is_projectile(self) -> bool {
        matches!(
            self,
            EntityKind::Bullet | EntityKind::Grenade | EntityKind::Shrapnel
        )
    }

    /// Projectiles that die on their first contact and deal damage.
    pub fn is_bullet_class(self) -> bool {
        matches!(self, EntityKind::Bullet | EntityKind::Shrapnel)
    }
}

/// How an entity reaches clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replication {
    /// Included in every snapshot.
    Continuous,
    /// Included once, then simulated by clients on their own.
    SpawnOnly { sent: bool },
    /// Never transmitted; every observer derives it locally.
    LocalOnly,
}

/// Upper-body sub-body, hinged above the center and following the aim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Torso {
    pub offset: Vec3,
    pub angle: f32,
}

/// Result of applying damage to a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    Ignored,
    Hurt,
    Killed,
}

/// Character capability block.
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub health: f32,
    pub max_health: f32,
    pub score: i32,
    /// Smoothed round trip, milliseconds.
    pub ping: f32,
    pub respawn_in: Option<f32>,
    pub spawn_point: Vec3,
    pub crouching: bool,
    pub torso: Torso,
    pub guns: Vec<Gun>,
    pub current: usize,
}

impl Person {
    pub fn new(spawn_point: Vec3) -> Self {
        Self {
            health: MAX_HEALTH,
            max_health: MAX_HEALTH,
            score: 0,
            ping: 0.0,
            respawn_in: None,
            spawn_point,
            crouching: false,
            torso: Torso {
                offset: TORSO_OFFSET,
                angle: 0.0,
            },
            guns: CATALOGUE.iter().map(Gun::from_spec).collect(),
            current: 0,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.respawn_in.is_some()
    }

    pub fn gun(&self) -> Option<&Gun> {
        self.guns.get(self.current)
    }

    pub fn gun_mut(&mut self) -> Option<&mut Gun> {
        self.guns.get_mut(self.current)
    }

    /// Switches to the gun with `id`; unknown ids are ignored.
    pub fn select(&mut self, id: u8) -> bool {
        let Some(index) = self.guns.iter().position(|g| g.id == id) else {
            return false;
        };
        if index == self.current {
            return false;
        }
        if let Some(gun) = self.gun_mut() {
            gun.cancel_burst();
        }
        self.current = index;
        true
    }

    /// Subtracts health; the first blow that reaches zero kills.
    pub fn damage(&mut self, amount: f32) -> DamageOutcome {
        if self.is_dead() || amount <= 0.0 {
            return DamageOutcome::Ignored;
        }
        self.health = (self.health - amount).max(0.0);
        if self.health > 0.0 {
            return DamageOutcome::Hurt;
        }
        self.respawn_in = Some(RESPAWN_TIME);
        DamageOutcome::Killed
    }
}

/// Grenade lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrenadeState {
    Arming,
    Live,
    Exploding,
    Spent,
}

/// What a contact means to a grenade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrenadeContact {
    Ricochet,
    Detonate,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grenade {
    pub state: GrenadeState,
    pub arm_in: f32,
    pub fuse_in: f32,
    /// Drives the shrapnel pattern on every observer.
    pub seed: u64,
}

impl Grenade {
    pub fn new(seed: u64) -> Self {
        Self {
            state: GrenadeState::Arming,
            arm_in: GRENADE_ARM_TIME,
            fuse_in: GRENADE_FUSE_TIME,
            seed,
        }
    }

    pub fn on_contact(&mut self) -> GrenadeContact {
        match self.state {
            GrenadeState::Arming => GrenadeContact::Ricochet,
            GrenadeState::Live => {
                self.state = GrenadeState::Exploding;
                GrenadeContact::Detonate
            }
            GrenadeState::Exploding | GrenadeState::Spent => GrenadeContact::Ignore,
        }
    }

    /// Advances timers; returns `true` when the fuse runs out this call.
    pub fn tick(&mut self, dt: f32) -> bool {
        self.arm_in = (self.arm_in - dt).max(0.0);
        self.fuse_in = (self.fuse_in - dt).max(0.0);
        if self.state == GrenadeState::Arming && self.arm_in <= 0.0 {
            self.state = GrenadeState::Live;
        }
        if self.fuse_in <= 0.0 && matches!(self.state, GrenadeState::Arming | GrenadeState::Live) {
            self.state = GrenadeState::Exploding;
            return true;
        }
        false
    }
}

/// Projectile capability block.
#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    /// Person credited for hits.
    pub owner: String,
    pub damage: f32,
    pub lifetime: f32,
    pub grenade: Option<Grenade>,
}

/// A projectile a person asked to spawn this sub-step.
#[derive(Debug, Clone, PartialEq)]
pub struct Launch {
    pub owner: String,
    pub spec: ProjectileSpec,
    pub position: Vec3,
    pub velocity: Vec3,
}

/// One game object.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub body: RigidBody,
    pub intent: Intent,
    pub facing: Vec3,
    pub on_ground: bool,
    pub dead: bool,
    pub events: Vec<EntityEvent>,
    pub replication: Replication,
    pub person: Option<Person>,
    pub projectile: Option<Projectile>,
}

impl HasBody for Entity {
    fn body(&self) -> &RigidBody {
        &self.body
    }

    fn body_mut(&mut self) -> &mut RigidBody {
        &mut self.body
    }
}

impl Entity {
    fn with_body(id: EntityId, name: impl Into<String>, kind: EntityKind, body: RigidBody) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            body,
            intent: Intent::default(),
            facing: Vec3::X,
            on_ground: false,
            dead: false,
            events: Vec::new(),
            replication: Replication::Continuous,
            person: None,
            projectile: None,
        }
    }

    /// Immovable terrain block.
    pub fn terrain(id: EntityId, name: impl Into<String>, center: Vec3, half: Vec3) -> Self {
        let body = RigidBody::fixed(Shape::Box { half }, center);
        Self::with_body(id, name, EntityKind::Static, body)
    }

    /// Movable box prop.
    pub fn crate_box(
        id: EntityId,
        name: impl Into<String>,
        center: Vec3,
        half: Vec3,
        mass: f32,
    ) -> Self {
        let body = RigidBody::dynamic(Shape::Box { half }, mass, center)
            .with_filter(Category::TERRAIN, Category::all());
        Self::with_body(id, name, EntityKind::Dynamic, body)
    }

    /// Movable ball prop.
    pub fn ball(id: EntityId, name: impl Into<String>, center: Vec3, radius: f32, mass: f32) -> Self {
        let body = RigidBody::dynamic(Shape::Sphere { radius }, mass, center)
            .with_filter(Category::TERRAIN, Category::all());
        Self::with_body(id, name, EntityKind::Sphere, body)
    }

    pub fn person(id: EntityId, name: impl Into<String>, spawn_point: Vec3) -> Self {
        let body = RigidBody::dynamic(
            Shape::Sphere {
                radius: PERSON_RADIUS,
            },
            PERSON_MASS,
            spawn_point,
        )
        .with_filter(Category::PLAYER, Category::all());
        let mut entity = Self::with_body(id, name, EntityKind::Person, body);
        entity.person = Some(Person::new(spawn_point));
        entity
    }

    /// Bullet, grenade or shrapnel.
    pub fn projectile(
        id: EntityId,
        name: impl Into<String>,
        kind: EntityKind,
        owner: impl Into<String>,
        position: Vec3,
        velocity: Vec3,
        damage: f32,
    ) -> Self {
        let (radius, mass, gravity, lifetime, replication) = match kind {
            EntityKind::Grenade => (
                GRENADE_RADIUS,
                0.4,
                true,
                f32::INFINITY,
                Replication::Continuous,
            ),
            EntityKind::Shrapnel => (
                SHRAPNEL_RADIUS,
                0.02,
                true,
                SHRAPNEL_LIFETIME,
                Replication::LocalOnly,
            ),
            _ => (
                BULLET_RADIUS,
                0.05,
                false,
                BULLET_LIFETIME,
                Replication::SpawnOnly { sent: false },
            ),
        };
        let mut body = RigidBody::dynamic(Shape::Sphere { radius }, mass, position)
            .with_filter(Category::PROJECTILE, Category::TERRAIN | Category::PLAYER);
        body.velocity = velocity;
        body.gravity = gravity;
        body.swept = kind.is_bullet_class();

        let mut entity = Self::with_body(id, name, kind, body);
        entity.facing = velocity.normalize_or(Vec3::X);
        entity.replication = replication;
        entity.projectile = Some(Projectile {
            owner: owner.into(),
            damage,
            lifetime,
            grenade: None,
        });
        entity
    }

    pub fn is_person(&self) -> bool {
        self.kind == EntityKind::Person
    }

    pub fn grenade(&self) -> Option<&Grenade> {
        self.projectile.as_ref().and_then(|p| p.grenade.as_ref())
    }

    pub fn grenade_mut(&mut self) -> Option<&mut Grenade> {
        self.projectile.as_mut().and_then(|p| p.grenade.as_mut())
    }

    /// Damages a living person; kills disable the body until respawn.
    pub fn take_damage(&mut self, amount: f32) -> DamageOutcome {
        let Some(person) = self.person.as_mut() else {
            return DamageOutcome::Ignored;
        };
        let outcome = person.damage(amount);
        match outcome {
            DamageOutcome::Killed => {
                self.dead = true;
                self.body.enabled = false;
                self.body.velocity = Vec3::ZERO;
                self.events.push(EntityEvent::Death);
            }
            DamageOutcome::Hurt => self.events.push(EntityEvent::Hit),
            DamageOutcome::Ignored => {}
        }
        outcome
    }

    /// Turns intent into motor force, aim, weapon requests and launches.
    pub fn apply_intent<R: Rng>(&mut self, dt: f32, params: &MoveParams, rng: &mut R) -> Vec<Launch> {
        let Some(person) = self.person.as_mut() else {
            return Vec::new();
        };
        if person.is_dead() {
            return Vec::new();
        }

        let state = MoveState {
            velocity: self.body.velocity,
            on_ground: self.on_ground,
            facing: self.facing,
        };
        let cmd = plan_movement(&state, &self.intent, params, dt);
        self.body.add_force(cmd.accel * self.body.mass());
        if let Some(vy) = cmd.jump {
            self.body.velocity.y = vy;
        }
        self.facing = cmd.facing;
        person.crouching = cmd.crouch;

        if let Some(id) = self.intent.weapon {
            person.select(id);
        }

        let Some(gun) = person.gun_mut() else {
            return Vec::new();
        };
        if self.intent.reload && gun.request_reload() {
            self.events.push(EntityEvent::Reload);
        }
        gun.tick(dt);
        let Some(volley) = gun.try_fire(self.intent.shoot) else {
            return Vec::new();
        };
        self.events.push(EntityEvent::Shoot);

        let base = self.facing.angle();
        let radius = projectile_radius(volley.projectile.kind);
        (0..volley.pellets)
            .map(|_| {
                let jitter = if volley.spread > 0.0 {
                    rng.gen_range(-volley.spread..=volley.spread)
                } else {
                    0.0
                };
                let dir = Vec3::from_angle(base + jitter);
                Launch {
                    owner: self.name.clone(),
                    spec: volley.projectile,
                    position: self.body.position + dir * (PERSON_RADIUS + radius + MUZZLE_CLEARANCE),
                    velocity: dir * volley.projectile.speed,
                }
            })
            .collect()
    }

    /// Bookkeeping after integration. Returns `true` when a grenade fuse
    /// ran out and the grenade must detonate.
    pub fn post_step(&mut self, dt: f32, authoritative: bool) -> bool {
        self.body.force = Vec3::ZERO;

        if let Some(person) = self.person.as_mut() {
            person.torso.angle = self.facing.angle();
            match person.respawn_in {
                Some(left) if authoritative => {
                    let left = left - dt;
                    if left <= 0.0 {
                        self.respawn();
                    } else {
                        person.respawn_in = Some(left);
                    }
                }
                Some(_) => {}
                None => {
                    let stance = Stance::of(self.on_ground, person.crouching);
                    if let Some(gun) = person.gun_mut() {
                        gun.recover(dt, stance);
                    }
                }
            }
            return false;
        }

        let Some(projectile) = self.projectile.as_mut() else {
            return false;
        };
        if let Some(grenade) = projectile.grenade.as_mut() {
            return grenade.tick(dt) && authoritative;
        }
        projectile.lifetime -= dt;
        if projectile.lifetime <= 0.0 {
            self.dead = true;
        }
        false
    }

    /// Restores a dead person at its spawn point.
    pub fn respawn(&mut self) {
        let Some(person) = self.person.as_mut() else {
            return;
        };
        person.health = person.max_health;
        person.respawn_in = None;
        person.crouching = false;
        for gun in &mut person.guns {
            gun.refill();
        }
        self.body.position = person.spawn_point;
        self.body.velocity = Vec3::ZERO;
        self.body.angular_velocity = 0.0;
        self.body.orientation = Quat::IDENTITY;
        self.body.enabled = true;
        self.dead = false;
        self.events.push(EntityEvent::Respawn);
    }
}

pub fn projectile_radius(kind: EntityKind) -> f32 {
    match kind {
        EntityKind::Grenade => GRENADE_RADIUS,
        EntityKind::Shrapnel => SHRAPNEL_RADIUS,
        _ => BULLET_RADIUS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn soldier() -> Entity {
        Entity::person(EntityId(1), "ada", Vec3::planar(0.0, 1.0))
    }

    #[test]
    fn kind_tags_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(EntityKind::from_tag("turret"), None);
    }

    #[test]
    fn health_clamps_and_kill_happens_once() {
        let mut e = soldier();
        assert_eq!(e.take_damage(60.0), DamageOutcome::Hurt);
        assert_eq!(e.take_damage(60.0), DamageOutcome::Killed);
        assert_eq!(e.person.as_ref().unwrap().health, 0.0);
        assert_eq!(e.take_damage(60.0), DamageOutcome::Ignored);
        assert_eq!(
            e.events.iter().filter(|ev| **ev == EntityEvent::Death).count(),
            1
        );
        assert!(e.dead && !e.body.enabled);
        assert_eq!(e.person.as_ref().unwrap().respawn_in, Some(RESPAWN_TIME));
    }

    #[test]
    fn respawn_after_countdown_restores_person() {
        let mut e = soldier();
        e.body.position = Vec3::planar(9.0, 9.0);
        e.person.as_mut().unwrap().guns[0].ammo = 0;
        e.take_damage(500.0);

        let steps = (RESPAWN_TIME / 0.01).ceil() as usize + 1;
        for _ in 0..steps {
            e.post_step(0.01, true);
        }
        let p = e.person.as_ref().unwrap();
        assert!(!e.dead && e.body.enabled);
        assert_eq!(p.health, p.max_health);
        assert_eq!(p.guns[0].ammo, p.guns[0].max_ammo);
        assert_eq!(e.body.position, p.spawn_point);
        assert_eq!(
            e.events.iter().filter(|ev| **ev == EntityEvent::Respawn).count(),
            1
        );
    }

    #[test]
    fn replica_persons_do_not_respawn_themselves() {
        let mut e = soldier();
        e.take_damage(500.0);
        for _ in 0..1000 {
            e.post_step(0.01, false);
        }
        assert!(e.dead);
    }

    #[test]
    fn shooting_launches_from_outside_the_body() {
        let mut e = soldier();
        e.intent.shoot = true;
        e.intent.facing = Vec3::planar(-1.0, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let launches = e.apply_intent(0.01, &MoveParams::default(), &mut rng);
        assert_eq!(launches.len(), 1);
        let shot = &launches[0];
        assert!(shot.position.x < -PERSON_RADIUS);
        assert!(shot.velocity.x < 0.0);
        assert_eq!(e.events, vec![EntityEvent::Shoot]);
    }

    #[test]
    fn dead_people_ignore_intent() {
        let mut e = soldier();
        e.take_damage(500.0);
        e.intent.shoot = true;
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(e.apply_intent(0.01, &MoveParams::default(), &mut rng).is_empty());
    }

    #[test]
    fn grenade_arms_then_detonates_on_fuse() {
        let mut g = Grenade::new(3);
        assert_eq!(g.on_contact(), GrenadeContact::Ricochet);
        let mut fired = 0;
        for _ in 0..400 {
            if g.tick(0.01) {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert_eq!(g.state, GrenadeState::Exploding);
        assert_eq!(g.on_contact(), GrenadeContact::Ignore);
    }

    #[test]
    fn live_grenade_detonates_on_contact() {
        let mut g = Grenade::new(3);
        g.tick(GRENADE_ARM_TIME + 0.01);
        assert_eq!(g.state, GrenadeState::Live);
        assert_eq!(g.on_contact(), GrenadeContact::Detonate);
    }
}
