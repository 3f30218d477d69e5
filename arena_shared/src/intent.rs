//! Player intent and the movement planner.
//!
//! An [`Intent`] is what the input collaborator produces once per tick. The
//! simulation never reads raw input; it turns intent into a [`MoveCommand`]
//! through [`plan_movement`], a pure function of (state, intent, dt).

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Per-tick player input, already translated into requests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Intent {
    /// Horizontal movement request in `[-1, 1]` (negative is left).
    #[serde(default)]
    pub move_x: f32,
    /// Keyboard aim rotation in `[-1, 1]` (positive is counter-clockwise).
    #[serde(default)]
    pub rotate: f32,
    #[serde(default)]
    pub jump: bool,
    #[serde(default)]
    pub crouch: bool,
    #[serde(default)]
    pub shoot: bool,
    #[serde(default)]
    pub reload: bool,
    /// Requested gun id, if the player is switching weapons.
    #[serde(default)]
    pub weapon: Option<u8>,
    /// Aim direction; zero means "keep the current facing".
    #[serde(default)]
    pub facing: Vec3,
}

/// Movement tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveParams {
    pub run_speed: f32,
    pub crouch_speed: f32,
    pub jump_speed: f32,
    /// Acceleration cap while grounded, m/s².
    pub ground_accel: f32,
    /// Acceleration cap while airborne, m/s².
    pub air_accel: f32,
    /// Keyboard aim rate, rad/s.
    pub turn_rate: f32,
}

impl Default for MoveParams {
    fn default() -> Self {
        Self {
            run_speed: 8.0,
            crouch_speed: 3.0,
            jump_speed: 7.5,
            ground_accel: 60.0,
            air_accel: 15.0,
            turn_rate: 3.0,
        }
    }
}

/// The part of a body the planner reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveState {
    pub velocity: Vec3,
    pub on_ground: bool,
    pub facing: Vec3,
}

/// What the body should do this sub-step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveCommand {
    /// Motor acceleration; multiply by mass for a force.
    pub accel: Vec3,
    /// Vertical take-off speed when a jump starts this sub-step.
    pub jump: Option<f32>,
    pub facing: Vec3,
    pub crouch: bool,
}

/// Computes the motor command for one sub-step.
pub fn plan_movement(state: &MoveState, intent: &Intent, params: &MoveParams, dt: f32) -> MoveCommand {
    let crouch = intent.crouch && state.on_ground;
    let speed = if crouch {
        params.crouch_speed
    } else {
        params.run_speed
    };
    let target_vx = intent.move_x.clamp(-1.0, 1.0) * speed;
    let cap = if state.on_ground {
        params.ground_accel
    } else {
        params.air_accel
    };
    let ax = if dt > 0.0 {
        ((target_vx - state.velocity.x) / dt).clamp(-cap, cap)
    } else {
        0.0
    };

    let jump = (intent.jump && state.on_ground && !crouch).then_some(params.jump_speed);

    let current = state.facing.normalize_or(Vec3::X);
    let facing = if intent.rotate != 0.0 {
        let angle = current.angle() + intent.rotate.clamp(-1.0, 1.0) * params.turn_rate * dt;
        Vec3::from_angle(angle)
    } else {
        intent.facing.normalize_or(current)
    };

    MoveCommand {
        accel: Vec3::planar(ax, 0.0),
        jump,
        facing,
        crouch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grounded() -> MoveState {
        MoveState {
            velocity: Vec3::ZERO,
            on_ground: true,
            facing: Vec3::X,
        }
    }

    #[test]
    fn idle_intent_brakes_and_keeps_facing() {
        let state = MoveState {
            velocity: Vec3::planar(0.3, 0.0),
            ..grounded()
        };
        let cmd = plan_movement(&state, &Intent::default(), &MoveParams::default(), 0.01);
        assert!(cmd.accel.x < 0.0);
        assert_eq!(cmd.facing, Vec3::X);
        assert_eq!(cmd.jump, None);
    }

    #[test]
    fn airborne_acceleration_is_capped_lower() {
        let intent = Intent {
            move_x: 1.0,
            ..Intent::default()
        };
        let params = MoveParams::default();
        let ground = plan_movement(&grounded(), &intent, &params, 0.01);
        let air = plan_movement(
            &MoveState {
                on_ground: false,
                ..grounded()
            },
            &intent,
            &params,
            0.01,
        );
        assert_eq!(ground.accel.x, params.ground_accel);
        assert_eq!(air.accel.x, params.air_accel);
    }

    #[test]
    fn jump_requires_ground() {
        let intent = Intent {
            jump: true,
            ..Intent::default()
        };
        let params = MoveParams::default();
        assert_eq!(
            plan_movement(&grounded(), &intent, &params, 0.01).jump,
            Some(params.jump_speed)
        );
        let air = MoveState {
            on_ground: false,
            ..grounded()
        };
        assert_eq!(plan_movement(&air, &intent, &params, 0.01).jump, None);
    }

    #[test]
    fn zero_aim_falls_back_to_current_facing() {
        let state = MoveState {
            facing: Vec3::planar(0.0, -1.0),
            ..grounded()
        };
        let cmd = plan_movement(&state, &Intent::default(), &MoveParams::default(), 0.01);
        assert_eq!(cmd.facing, Vec3::planar(0.0, -1.0));
    }
}
