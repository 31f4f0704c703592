//! Deterministic player kinematics shared by server and client.
//!
//! The server integrates player input with [`step_motion`] and clients run the
//! exact same function for prediction. Both sides get identical
//! [`MotionParams`] (sent in the handshake response), so replaying the same
//! inputs from the same base state yields the same result.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::messages::{InputFrame, action_flags};

/// Tunable movement constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionParams {
    /// Horizontal speed at full input, in units per second.
    pub walk_speed: f32,
    /// Downward acceleration while airborne, in units per second squared.
    pub gravity: f32,
    /// Vertical velocity applied by a jump.
    pub jump_speed: f32,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            walk_speed: 5.0,
            gravity: 20.0,
            jump_speed: 7.0,
        }
    }
}

/// Kinematic state of a player body.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub grounded: bool,
}

impl MotionState {
    /// A grounded body at rest.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            grounded: position.y <= 0.0,
        }
    }
}

/// The parts of an input frame that drive movement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionInput {
    pub movement: Vec3,
    pub flags: u32,
}

impl MotionInput {
    /// No movement, no actions. Applied on ticks without a buffered frame.
    pub const NEUTRAL: Self = Self {
        movement: Vec3::ZERO,
        flags: 0,
    };
}

impl From<&InputFrame> for MotionInput {
    fn from(frame: &InputFrame) -> Self {
        Self {
            movement: frame.movement,
            flags: frame.flags,
        }
    }
}

/// Advance `state` by one step of `dt` seconds.
///
/// Horizontal velocity follows the x/z components of the movement vector
/// (clamped to unit length). Gravity applies while airborne and the `y = 0`
/// plane acts as the ground. Non-finite movement is treated as neutral.
pub fn step_motion(
    state: &MotionState,
    input: &MotionInput,
    dt: f32,
    params: &MotionParams,
) -> MotionState {
    let mut wish = Vec3::new(input.movement.x, 0.0, input.movement.z);
    if !wish.is_finite() {
        wish = Vec3::ZERO;
    }
    let wish = wish.clamp_length_max(1.0);

    let mut velocity = state.velocity;
    velocity.x = wish.x * params.walk_speed;
    velocity.z = wish.z * params.walk_speed;

    let mut grounded = state.grounded;
    if grounded && input.flags & action_flags::JUMP != 0 {
        velocity.y = params.jump_speed;
        grounded = false;
    }
    if !grounded {
        velocity.y -= params.gravity * dt;
    }

    let mut position = state.position + velocity * dt;
    if position.y <= 0.0 {
        position.y = 0.0;
        if velocity.y < 0.0 {
            velocity.y = 0.0;
        }
        grounded = true;
    } else {
        grounded = false;
    }

    MotionState {
        position,
        velocity,
        grounded,
    }
}
