//! Car kinematics shared between client prediction and server simulation.

use crate::math::{normalize_angle, Vector2};
use serde::{Deserialize, Serialize};

pub const MAX_SPEED: f32 = 400.0;
pub const MIN_SPEED: f32 = 0.0;
pub const ACCELERATION_RATE: f32 = 250.0;
pub const DECELERATION_RATE: f32 = 350.0;
pub const TURN_RATE: f32 = 3.0;
/// Exponential smoothing factor pulling the rendered heading toward the
/// true heading.
pub const TURN_ANIMATION_SPEED: f32 = 8.0;
/// Blend between rendered and true heading while sliding.
pub const DRIFT_FACTOR: f32 = 0.4;
pub const CAR_WIDTH: f32 = 32.0;
pub const CAR_LENGTH: f32 = 64.0;

/// Per-player kinematic state.
///
/// Speed stays clamped to `[MIN_SPEED, MAX_SPEED]` scaled by the terrain
/// modifier of the cell the car sits on. `visual_direction` lags `direction`
/// so turns read as a slide instead of a snap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Car {
    pub id: u32,
    pub name: String,
    pub position: Vector2,
    pub speed: f32,
    pub direction: f32,
    pub visual_direction: f32,
    pub turn_input: f32,
    pub is_drifting: bool,
    pub is_alive: bool,
    pub size_modifier: f32,
    pub terrain_modifier: f32,
}

impl Car {
    pub fn new(id: u32, name: &str, position: Vector2, direction: f32) -> Self {
        Car {
            id,
            name: name.to_string(),
            position,
            speed: 0.0,
            direction,
            visual_direction: direction,
            turn_input: 0.0,
            is_drifting: false,
            is_alive: true,
            size_modifier: 1.0,
            terrain_modifier: 1.0,
        }
    }

    /// Top speed on the current terrain.
    pub fn effective_max_speed(&self) -> f32 {
        MAX_SPEED * self.terrain_modifier
    }

    /// Moves speed toward the terrain-scaled top speed. No-op on a dead car.
    pub fn accelerate(&mut self, dt: f32) {
        if !self.is_alive {
            return;
        }
        let max = self.effective_max_speed();
        self.speed = (self.speed + ACCELERATION_RATE * self.terrain_modifier * dt).clamp(MIN_SPEED, max);
    }

    /// Moves speed toward `MIN_SPEED`. No-op on a dead car.
    pub fn decelerate(&mut self, dt: f32) {
        if !self.is_alive {
            return;
        }
        self.speed = (self.speed - DECELERATION_RATE * dt).max(MIN_SPEED);
    }

    /// Sets the steering intent, clamped to [-1, 1].
    pub fn start_turn(&mut self, direction: f32) {
        self.turn_input = direction.clamp(-1.0, 1.0);
    }

    pub fn stop_turn(&mut self) {
        self.turn_input = 0.0;
    }

    /// Advances the car one tick.
    ///
    /// Turn rate scales with speed, the rendered heading chases the true
    /// heading, and while drifting the movement heading is a blend of the two
    /// so the car slides through corners.
    pub fn update(&mut self, dt: f32) {
        if !self.is_alive {
            return;
        }

        // Terrain can lower the ceiling under the car mid-corner
        self.speed = self.speed.clamp(MIN_SPEED, self.effective_max_speed());

        if self.speed > 0.0 && self.turn_input != 0.0 {
            self.direction += self.turn_input * TURN_RATE * dt * (self.speed / MAX_SPEED);
        }
        self.direction = normalize_angle(self.direction);

        let smoothing = (TURN_ANIMATION_SPEED * dt).min(1.0);
        let lag = normalize_angle(self.direction - self.visual_direction);
        self.visual_direction = normalize_angle(self.visual_direction + lag * smoothing);

        self.is_drifting = self.speed > MAX_SPEED * 0.5 && self.turn_input.abs() > 0.5;

        let heading = if self.is_drifting {
            let slide = normalize_angle(self.visual_direction - self.direction);
            normalize_angle(self.direction + slide * DRIFT_FACTOR)
        } else {
            self.direction
        };

        let step = Vector2::from_angle(heading).scale(self.speed * dt);
        self.position = self.position.add(&step);
    }

    /// Kills the car and zeroes its speed. Idempotent.
    pub fn crash(&mut self) {
        if !self.is_alive {
            return;
        }
        self.is_alive = false;
        self.speed = 0.0;
    }

    /// Current velocity as a vector along the true heading.
    pub fn velocity(&self) -> Vector2 {
        Vector2::from_angle(self.direction).scale(self.speed)
    }

    /// Writes a velocity vector back as (speed, direction). The heading is
    /// left untouched when the vector is too small to carry one.
    pub fn set_velocity(&mut self, velocity: Vector2) {
        let magnitude = velocity.magnitude();
        self.speed = magnitude.clamp(MIN_SPEED, MAX_SPEED);
        if magnitude > 1e-4 {
            self.direction = normalize_angle(velocity.angle());
        }
    }
}

/// Crashes the slower of the two cars. Ties go to the second car so exactly
/// one car always crashes. Cars are told apart by id, never by name.
pub fn crash_slower(a: &mut Car, b: &mut Car) {
    if a.id == b.id {
        return;
    }
    if a.speed < b.speed {
        a.crash();
    } else {
        b.crash();
    }
}
