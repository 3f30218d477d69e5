//! Input handling.
//!
//! Device capture lives outside this crate. Whatever samples the keyboard and
//! mouse fills an [`InputState`] once per tick, and [`build_intent`] turns it
//! into the [`Intent`] the server acts on.

use arena_shared::{intent::Intent, math::Vec3};

/// User input state at a moment in time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub crouch: bool,
    pub fire: bool,
    pub reload: bool,
    /// Keyboard aim: counter-clockwise and clockwise keys.
    pub aim_ccw: bool,
    pub aim_cw: bool,
    /// Mouse aim relative to the player, if the pointer moved.
    pub pointer: Option<[f32; 2]>,
    /// Number key pressed this tick.
    pub weapon: Option<u8>,
}

fn axis(negative: bool, positive: bool) -> f32 {
    match (negative, positive) {
        (true, false) => -1.0,
        (false, true) => 1.0,
        _ => 0.0,
    }
}

/// Turns sampled input into an intent for a tick.
pub fn build_intent(input: &InputState) -> Intent {
    Intent {
        move_x: axis(input.left, input.right),
        rotate: axis(input.aim_cw, input.aim_ccw),
        jump: input.jump,
        crouch: input.crouch,
        shoot: input.fire,
        reload: input.reload,
        weapon: input.weapon,
        facing: input
            .pointer
            .map(Vec3::from_xy)
            .map_or(Vec3::ZERO, |v| v.normalize_or(Vec3::ZERO)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposing_keys_cancel() {
        let intent = build_intent(&InputState {
            left: true,
            right: true,
            ..InputState::default()
        });
        assert_eq!(intent.move_x, 0.0);
    }

    #[test]
    fn pointer_becomes_unit_facing() {
        let intent = build_intent(&InputState {
            pointer: Some([0.0, 4.0]),
            aim_ccw: true,
            ..InputState::default()
        });
        assert_eq!(intent.facing, Vec3::planar(0.0, 1.0));
        assert_eq!(intent.rotate, 1.0);
    }

    #[test]
    fn idle_input_is_the_default_intent() {
        assert_eq!(build_intent(&InputState::default()), Intent::default());
    }
}
