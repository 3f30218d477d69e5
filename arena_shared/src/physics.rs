//! Rigid-body physics for one fixed sub-step.
//!
//! Bodies are spheres or axis-aligned boxes constrained to the x/y plane.
//! A sub-step runs in three phases driven by the world stepper:
//! - [`PhysicsWorld::candidate_pairs`] (broad phase, category/collide masks)
//! - [`collide`] (narrow phase, one contact per pair) followed by
//!   [`PhysicsWorld::attach`] for every contact the resolver keeps
//! - [`PhysicsWorld::step`] (semi-implicit Euler with contact joints)
//!
//! Contact joints live for exactly one sub-step; the stepper clears them.
//!
//! Fast bodies flagged `swept` are tested along the segment they covered in
//! the last sub-step, so they cannot skip over thin terrain or players.

use bitflags::bitflags;

use crate::math::{Quat, Vec3, EPSILON};

/// Penetration left unresolved so resting contacts persist between sub-steps.
pub const LINEAR_SLOP: f32 = 0.005;

bitflags! {
    /// Collision categories.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Category: u32 {
        const TERRAIN = 1 << 0;
        const PROJECTILE = 1 << 1;
        const PLAYER = 1 << 2;
    }
}

/// Physics parameters.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsConfig {
    pub gravity: Vec3,
    /// Fixed sub-step, seconds.
    pub step: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::planar(0.0, -9.81),
            step: 0.01,
        }
    }
}

/// Collision shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere { radius: f32 },
    /// Axis-aligned box, never rotated by contacts.
    Box { half: Vec3 },
}

impl Shape {
    /// Half extents of the bounding box.
    pub fn half_extents(&self) -> Vec3 {
        match *self {
            Shape::Sphere { radius } => Vec3::new(radius, radius, radius),
            Shape::Box { half } => half,
        }
    }
}

/// Rigid-body state.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    /// Spin about the depth axis, rad/s.
    pub angular_velocity: f32,
    /// Force accumulated for the current sub-step.
    pub force: Vec3,
    /// Zero for immovable bodies.
    pub inv_mass: f32,
    pub shape: Shape,
    pub category: Category,
    pub collide: Category,
    pub gravity: bool,
    /// Disabled bodies neither move nor collide.
    pub enabled: bool,
    /// Tested along its path since `previous` rather than at one point.
    pub swept: bool,
    /// Position before the last integration.
    pub previous: Vec3,
}

impl RigidBody {
    /// Immovable body (terrain).
    pub fn fixed(shape: Shape, position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: 0.0,
            force: Vec3::ZERO,
            inv_mass: 0.0,
            shape,
            category: Category::TERRAIN,
            collide: Category::all(),
            gravity: false,
            enabled: true,
            swept: false,
            previous: position,
        }
    }

    /// Movable body subject to gravity.
    pub fn dynamic(shape: Shape, mass: f32, position: Vec3) -> Self {
        Self {
            inv_mass: if mass > EPSILON { 1.0 / mass } else { 0.0 },
            gravity: true,
            ..Self::fixed(shape, position)
        }
    }

    pub fn with_filter(mut self, category: Category, collide: Category) -> Self {
        self.category = category;
        self.collide = collide;
        self
    }

    pub fn is_static(&self) -> bool {
        self.inv_mass == 0.0
    }

    pub fn mass(&self) -> f32 {
        if self.is_static() {
            0.0
        } else {
            1.0 / self.inv_mass
        }
    }

    pub fn angle(&self) -> f32 {
        self.orientation.angle_z()
    }

    pub fn add_force(&mut self, f: Vec3) {
        self.force += f;
    }

    fn filters_allow(&self, other: &Self) -> bool {
        self.category.intersects(other.collide) || other.category.intersects(self.collide)
    }

    /// Bounding box as (center, half extents), covering the whole path of
    /// swept bodies.
    fn bounds(&self) -> (Vec3, Vec3) {
        let half = self.shape.half_extents();
        if !self.swept {
            return (self.position, half);
        }
        let center = (self.position + self.previous) * 0.5;
        let travel = (self.position - self.previous).abs() * 0.5;
        (center, half + travel)
    }

    fn aabb_overlaps(&self, other: &Self) -> bool {
        let (ca, ha) = self.bounds();
        let (cb, hb) = other.bounds();
        let d = (ca - cb).abs();
        let reach = ha + hb;
        d.x <= reach.x + LINEAR_SLOP && d.y <= reach.y + LINEAR_SLOP
    }
}

/// Anything that carries a rigid body can be stepped.
pub trait HasBody {
    fn body(&self) -> &RigidBody;
    fn body_mut(&mut self) -> &mut RigidBody;
}

impl HasBody for RigidBody {
    fn body(&self) -> &RigidBody {
        self
    }

    fn body_mut(&mut self) -> &mut RigidBody {
        self
    }
}

/// One contact between bodies `a` and `b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub point: Vec3,
    /// Unit normal pointing from `b` toward `a`.
    pub normal: Vec3,
    pub depth: f32,
}

/// Contact surface parameters.
///
/// Rebound follows a logarithmic restitution law: an approach speed `v`
/// above `bounce_vel` leaves at `bounce * sqrt(ln(v / bounce_vel))`,
/// slower approaches do not bounce at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub bounce: f32,
    pub bounce_vel: f32,
    pub friction: f32,
}

impl Material {
    pub const DEFAULT: Self = Self {
        bounce: 7.15,
        bounce_vel: 9.54,
        friction: 0.8,
    };

    pub fn rebound_speed(&self, approach: f32) -> f32 {
        if approach <= self.bounce_vel || self.bounce_vel <= 0.0 {
            return 0.0;
        }
        self.bounce * (approach / self.bounce_vel).ln().sqrt()
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A contact constraint valid for a single sub-step.
#[derive(Debug, Clone, Copy)]
pub struct ContactJoint {
    pub a: usize,
    pub b: usize,
    pub contact: Contact,
    pub material: Material,
}

/// Returns mutable references to two distinct slice elements.
pub fn pair_mut<T>(items: &mut [T], i: usize, j: usize) -> Option<(&mut T, &mut T)> {
    if i == j || i >= items.len() || j >= items.len() {
        return None;
    }
    if i < j {
        let (lo, hi) = items.split_at_mut(j);
        Some((&mut lo[i], &mut hi[0]))
    } else {
        let (lo, hi) = items.split_at_mut(i);
        Some((&mut hi[0], &mut lo[j]))
    }
}

/// Narrow phase: the deepest contact between two bodies, if touching. A
/// swept sphere that passed through the other body during the last sub-step
/// touches it at the first point of its path.
pub fn collide(a: &RigidBody, b: &RigidBody) -> Option<Contact> {
    overlap(a, b)
        .or_else(|| sweep(a, b))
        .or_else(|| sweep(b, a).map(|c| Contact {
            normal: -c.normal,
            ..c
        }))
}

fn overlap(a: &RigidBody, b: &RigidBody) -> Option<Contact> {
    match (a.shape, b.shape) {
        (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) => {
            sphere_sphere(a.position, ra, b.position, rb)
        }
        (Shape::Sphere { radius }, Shape::Box { half }) => {
            sphere_box(a.position, radius, b.position, half)
        }
        (Shape::Box { half }, Shape::Sphere { radius }) => {
            sphere_box(b.position, radius, a.position, half).map(|c| Contact {
                normal: -c.normal,
                ..c
            })
        }
        (Shape::Box { half: ha }, Shape::Box { half: hb }) => {
            box_box(a.position, ha, b.position, hb)
        }
    }
}

/// First contact of swept sphere `a` with `b` along `a.previous -> a.position`.
/// The normal points from `b` toward `a`.
fn sweep(a: &RigidBody, b: &RigidBody) -> Option<Contact> {
    let Shape::Sphere { radius } = a.shape else {
        return None;
    };
    if !a.swept {
        return None;
    }
    let from = a.previous;
    let path = a.position - from;
    if path.len_sq() <= EPSILON * EPSILON {
        return None;
    }
    let (t, normal) = match b.shape {
        Shape::Sphere { radius: rb } => segment_circle(from, path, b.position, radius + rb)?,
        Shape::Box { half } => {
            let grown = Vec3::new(half.x + radius, half.y + radius, half.z);
            segment_box(from, path, b.position, grown)?
        }
    };
    let hit = from + path * t;
    Some(Contact {
        point: hit - normal * radius,
        normal,
        depth: 0.0,
    })
}

/// Entry parameter in `[0, 1]` and outward normal of a segment into a circle.
fn segment_circle(from: Vec3, path: Vec3, center: Vec3, reach: f32) -> Option<(f32, Vec3)> {
    let f = Vec3::planar(from.x - center.x, from.y - center.y);
    let d = Vec3::planar(path.x, path.y);
    let a = d.len_sq();
    let b = 2.0 * f.dot(d);
    let c = f.len_sq() - reach * reach;
    let disc = b * b - 4.0 * a * c;
    if a <= EPSILON || disc < 0.0 {
        return None;
    }
    let t = ((-b - disc.sqrt()) / (2.0 * a)).max(0.0);
    if t > 1.0 {
        return None;
    }
    let normal = (f + d * t).normalize_or(-d.normalize_or(Vec3::Y));
    Some((t, normal))
}

/// Slab test of a segment against an axis-aligned box in the plane.
fn segment_box(from: Vec3, path: Vec3, center: Vec3, half: Vec3) -> Option<(f32, Vec3)> {
    let mut enter = 0.0_f32;
    let mut exit = 1.0_f32;
    let mut normal = Vec3::ZERO;
    let axes = [
        (from.x - center.x, path.x, half.x, Vec3::X),
        (from.y - center.y, path.y, half.y, Vec3::Y),
    ];
    for (start, delta, extent, axis) in axes {
        if delta.abs() <= EPSILON {
            if start.abs() > extent {
                return None;
            }
            continue;
        }
        let t0 = (-extent - start) / delta;
        let t1 = (extent - start) / delta;
        let (near, far) = if t0 < t1 { (t0, t1) } else { (t1, t0) };
        if near > enter {
            enter = near;
            normal = if delta > 0.0 { -axis } else { axis };
        }
        exit = exit.min(far);
        if enter > exit {
            return None;
        }
    }
    if normal == Vec3::ZERO {
        // Started inside; the point test handles that.
        return None;
    }
    Some((enter, normal))
}

fn sphere_sphere(pa: Vec3, ra: f32, pb: Vec3, rb: f32) -> Option<Contact> {
    let d = pa - pb;
    let dist = d.len();
    let reach = ra + rb;
    if dist >= reach + LINEAR_SLOP {
        return None;
    }
    let normal = d.normalize_or(Vec3::Y);
    Some(Contact {
        point: pb + normal * rb,
        normal,
        depth: reach - dist,
    })
}

/// Normal points from the box toward the sphere.
fn sphere_box(center: Vec3, radius: f32, box_pos: Vec3, half: Vec3) -> Option<Contact> {
    let local = center - box_pos;
    let clamped = Vec3::planar(
        local.x.clamp(-half.x, half.x),
        local.y.clamp(-half.y, half.y),
    );
    let diff = Vec3::planar(local.x - clamped.x, local.y - clamped.y);
    let dist = diff.len();

    if dist > EPSILON {
        if dist >= radius + LINEAR_SLOP {
            return None;
        }
        let normal = diff * (1.0 / dist);
        return Some(Contact {
            point: box_pos + clamped,
            normal,
            depth: radius - dist,
        });
    }

    // Center inside the box: push out through the nearest face.
    let px = half.x - local.x.abs();
    let py = half.y - local.y.abs();
    let (normal, face_depth) = if px < py {
        (Vec3::planar(local.x.signum(), 0.0), px)
    } else {
        (Vec3::planar(0.0, if local.y < 0.0 { -1.0 } else { 1.0 }), py)
    };
    Some(Contact {
        point: center,
        normal,
        depth: face_depth + radius,
    })
}

fn box_box(pa: Vec3, ha: Vec3, pb: Vec3, hb: Vec3) -> Option<Contact> {
    let d = pa - pb;
    let ox = ha.x + hb.x - d.x.abs();
    let oy = ha.y + hb.y - d.y.abs();
    if ox <= -LINEAR_SLOP || oy <= -LINEAR_SLOP {
        return None;
    }
    let (normal, depth) = if ox < oy {
        (Vec3::planar(if d.x < 0.0 { -1.0 } else { 1.0 }, 0.0), ox)
    } else {
        (Vec3::planar(0.0, if d.y < 0.0 { -1.0 } else { 1.0 }), oy)
    };
    Some(Contact {
        point: pb + Vec3::planar(d.x * 0.5, d.y * 0.5),
        normal,
        depth,
    })
}

/// Gravity, contact joint group and the integrator.
#[derive(Debug, Default)]
pub struct PhysicsWorld {
    pub config: PhysicsConfig,
    joints: Vec<ContactJoint>,
}

impl PhysicsWorld {
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            config,
            joints: Vec::new(),
        }
    }

    /// Broad phase: index pairs `(i, j)`, `i < j`, whose bounds overlap and
    /// whose masks allow a contact.
    pub fn candidate_pairs<T: HasBody>(&self, bodies: &[T]) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (i, a) in bodies.iter().enumerate() {
            let a = a.body();
            if !a.enabled {
                continue;
            }
            for (j, b) in bodies.iter().enumerate().skip(i + 1) {
                let b = b.body();
                if !b.enabled || (a.is_static() && b.is_static()) {
                    continue;
                }
                if a.filters_allow(b) && a.aabb_overlaps(b) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    pub fn attach(&mut self, joint: ContactJoint) {
        self.joints.push(joint);
    }

    pub fn joints(&self) -> &[ContactJoint] {
        &self.joints
    }

    pub fn clear_joints(&mut self) {
        self.joints.clear();
    }

    /// Integrates every enabled body by one fixed sub-step.
    pub fn step<T: HasBody>(&mut self, bodies: &mut [T]) {
        let h = self.config.step;
        let gravity = self.config.gravity;

        for item in bodies.iter_mut() {
            let body = item.body_mut();
            if !body.enabled || body.is_static() {
                continue;
            }
            if body.gravity {
                body.velocity += gravity * h;
            }
            body.velocity += body.force * (body.inv_mass * h);
        }

        for joint in &self.joints {
            if let Some((a, b)) = pair_mut(bodies, joint.a, joint.b) {
                solve_velocity(a.body_mut(), b.body_mut(), joint);
            }
        }

        for item in bodies.iter_mut() {
            let body = item.body_mut();
            if !body.enabled || body.is_static() {
                continue;
            }
            body.previous = body.position;
            body.position += body.velocity * h;
            let angle = body.angle() + body.angular_velocity * h;
            body.orientation = Quat::from_rotation_z(angle);
            constrain_to_plane(body);
        }

        for joint in &self.joints {
            if let Some((a, b)) = pair_mut(bodies, joint.a, joint.b) {
                correct_position(a.body_mut(), b.body_mut(), &joint.contact);
            }
        }
    }
}

fn solve_velocity(a: &mut RigidBody, b: &mut RigidBody, joint: &ContactJoint) {
    let (ima, imb) = (effective_inv_mass(a), effective_inv_mass(b));
    let total = ima + imb;
    if total <= 0.0 {
        return;
    }
    let n = joint.contact.normal;
    let vn = (a.velocity - b.velocity).dot(n);
    if vn >= 0.0 {
        return;
    }

    let target = joint.material.rebound_speed(-vn);
    let jn = (target - vn) / total;
    a.velocity += n * (jn * ima);
    b.velocity -= n * (jn * imb);

    let rel = a.velocity - b.velocity;
    let vt = rel - n * rel.dot(n);
    let vt_len = vt.len();
    if vt_len > EPSILON {
        let jt = (vt_len / total).min(joint.material.friction * jn);
        let dir = vt * (1.0 / vt_len);
        a.velocity -= dir * (jt * ima);
        b.velocity += dir * (jt * imb);
    }
}

fn correct_position(a: &mut RigidBody, b: &mut RigidBody, contact: &Contact) {
    let (ima, imb) = (effective_inv_mass(a), effective_inv_mass(b));
    let total = ima + imb;
    let excess = contact.depth - LINEAR_SLOP;
    if total <= 0.0 || excess <= 0.0 {
        return;
    }
    let push = excess / total;
    a.position += contact.normal * (push * ima);
    b.position -= contact.normal * (push * imb);
}

fn effective_inv_mass(body: &RigidBody) -> f32 {
    if body.enabled {
        body.inv_mass
    } else {
        0.0
    }
}

fn constrain_to_plane(body: &mut RigidBody) {
    body.position.z = 0.0;
    body.velocity.z = 0.0;
}
