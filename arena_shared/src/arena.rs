//! Arena layout: terrain, props and spawn points.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{entity::Entity, math::Vec3, world::World};

/// An axis-aligned block, center and half extents in the x/y plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub center: [f32; 2],
    pub half: [f32; 2],
}

impl Block {
    const fn new(cx: f32, cy: f32, hx: f32, hy: f32) -> Self {
        Self {
            center: [cx, cy],
            half: [hx, hy],
        }
    }

    fn half_extents(&self) -> Vec3 {
        Vec3::new(self.half[0], self.half[1], 1.0)
    }
}

/// Movable props placed at round start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "shape")]
pub enum Prop {
    Crate { block: Block, mass: f32 },
    Ball { center: [f32; 2], radius: f32, mass: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaLayout {
    pub terrain: Vec<Block>,
    #[serde(default)]
    pub props: Vec<Prop>,
    pub spawn_points: Vec<[f32; 2]>,
}

impl Default for ArenaLayout {
    /// A walled 60 m floor with two platforms and a couple of props.
    fn default() -> Self {
        Self {
            terrain: vec![
                Block::new(0.0, -1.0, 30.0, 1.0),
                Block::new(-31.0, 10.0, 1.0, 12.0),
                Block::new(31.0, 10.0, 1.0, 12.0),
                Block::new(-12.0, 4.0, 5.0, 0.25),
                Block::new(12.0, 4.0, 5.0, 0.25),
                Block::new(0.0, 8.0, 4.0, 0.25),
            ],
            props: vec![
                Prop::Crate {
                    block: Block::new(-4.0, 0.5, 0.5, 0.5),
                    mass: 20.0,
                },
                Prop::Ball {
                    center: [4.0, 0.4],
                    radius: 0.4,
                    mass: 5.0,
                },
            ],
            spawn_points: vec![
                [-20.0, 1.0],
                [20.0, 1.0],
                [-12.0, 5.0],
                [12.0, 5.0],
                [0.0, 9.0],
            ],
        }
    }
}

impl ArenaLayout {
    /// Spawns the terrain and props into `world`.
    pub fn build(&self, world: &mut World) -> Result<()> {
        for (i, block) in self.terrain.iter().enumerate() {
            let id = world.next_id();
            world
                .spawn(Entity::terrain(
                    id,
                    format!("terrain{i}"),
                    Vec3::from_xy(block.center),
                    block.half_extents(),
                ))
                .context("placing terrain")?;
        }
        for (i, prop) in self.props.iter().enumerate() {
            let id = world.next_id();
            let entity = match *prop {
                Prop::Crate { block, mass } => Entity::crate_box(
                    id,
                    format!("crate{i}"),
                    Vec3::from_xy(block.center),
                    block.half_extents(),
                    mass,
                ),
                Prop::Ball {
                    center,
                    radius,
                    mass,
                } => Entity::ball(id, format!("ball{i}"), Vec3::from_xy(center), radius, mass),
            };
            world.spawn(entity).context("placing props")?;
        }
        Ok(())
    }

    /// Round-robin spawn point for the `n`th person to join.
    pub fn spawn_point(&self, n: usize) -> Vec3 {
        if self.spawn_points.is_empty() {
            return Vec3::planar(0.0, 1.0);
        }
        Vec3::from_xy(self.spawn_points[n % self.spawn_points.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{entity::EntityKind, physics::PhysicsConfig, world::Authority};

    #[test]
    fn default_layout_builds_and_settles() {
        let layout = ArenaLayout::default();
        let mut world = World::new(PhysicsConfig::default(), Authority::Authoritative, 1);
        layout.build(&mut world).unwrap();
        assert_eq!(world.len(), layout.terrain.len() + layout.props.len());

        world.advance(3.0);
        let ball = world
            .entities()
            .iter()
            .find(|e| e.kind == EntityKind::Sphere)
            .unwrap();
        assert!(ball.body.position.y > 0.0, "ball fell through the floor");
    }

    #[test]
    fn spawn_points_wrap() {
        let layout = ArenaLayout::default();
        let n = layout.spawn_points.len();
        assert_eq!(layout.spawn_point(1), layout.spawn_point(n + 1));
    }

    #[test]
    fn layout_reads_from_json() {
        let json = r#"{
            "terrain": [{"center": [0, -1], "half": [10, 1]}],
            "props": [{"shape": "ball", "center": [0, 2], "radius": 0.3, "mass": 1}],
            "spawn_points": [[0, 1]]
        }"#;
        let layout: ArenaLayout = serde_json::from_str(json).unwrap();
        assert_eq!(layout.terrain.len(), 1);
        assert!(matches!(layout.props[0], Prop::Ball { .. }));
    }
}
