//! Rendering abstraction.
//!
//! This crate does not depend on a graphics backend. A renderer reads an
//! [`EntityView`] per entity each frame and is told about one-shot events;
//! it never mutates simulation state.

use crate::{entity::Entity, event::EntityEvent, math::Vec3, physics::Shape};

/// Read-only render data for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityView<'a> {
    pub name: &'a str,
    pub kind: &'static str,
    pub position: Vec3,
    pub angle: f32,
    pub shape: Shape,
    pub facing: Vec3,
    /// Aim angle of the torso, for people.
    pub torso_angle: Option<f32>,
    pub health: Option<f32>,
    pub dead: bool,
    pub local_player: bool,
}

impl<'a> EntityView<'a> {
    pub fn of(entity: &'a Entity, local_player: bool) -> Self {
        Self {
            name: &entity.name,
            kind: entity.kind.tag(),
            position: entity.body.position,
            angle: entity.body.angle(),
            shape: entity.body.shape,
            facing: entity.facing,
            torso_angle: entity.person.as_ref().map(|p| p.torso.angle),
            health: entity.person.as_ref().map(|p| p.health),
            dead: entity.dead,
            local_player,
        }
    }
}

/// A minimal rendering API.
pub trait RenderBackend {
    fn begin_frame(&mut self);
    fn draw_entity(&mut self, view: &EntityView<'_>);
    /// Sound or particle trigger for an event on entity `name`.
    fn play_event(&mut self, name: &str, event: &EntityEvent);
    fn end_frame(&mut self);
}

/// A no-op renderer useful for headless runs and tests.
#[derive(Debug, Default)]
pub struct NullRenderer {
    pub frames: u64,
}

impl RenderBackend for NullRenderer {
    fn begin_frame(&mut self) {}
    fn draw_entity(&mut self, _view: &EntityView<'_>) {}
    fn play_event(&mut self, _name: &str, _event: &EntityEvent) {}
    fn end_frame(&mut self) {
        self.frames += 1;
    }
}
