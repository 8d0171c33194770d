//! Oriented-bounding-box collision between cars.
//!
//! Detection runs a separating-axis test over the four unique edge normals of
//! the two rectangles. The minimum-overlap axis becomes the contact normal;
//! resolution pushes the cars apart and exchanges velocity along the normal.

use crate::car::{Car, CAR_LENGTH, CAR_WIDTH};
use crate::math::Vector2;

/// Fraction of relative velocity preserved by the impulse. 1.0 is perfectly
/// elastic.
pub const RESTITUTION: f32 = 1.0;

/// Impacts that close faster than this along the contact normal wreck the
/// slower car; gentler contact only bounces.
pub const CRASH_CLOSING_SPEED: f32 = 300.0;

/// World-space corners of the car's oriented rectangle. The rectangle follows
/// the rendered heading, matching what the player sees while drifting.
pub fn corners(car: &Car) -> [Vector2; 4] {
    let half_length = CAR_LENGTH * car.size_modifier / 2.0;
    let half_width = CAR_WIDTH * car.size_modifier / 2.0;

    let forward = Vector2::from_angle(car.visual_direction);
    let right = Vector2::new(-forward.y, forward.x);

    let fl = forward.scale(half_length).add(&right.scale(half_width));
    let fr = forward.scale(half_length).sub(&right.scale(half_width));

    [
        car.position.add(&fl),
        car.position.add(&fr),
        car.position.sub(&fl),
        car.position.sub(&fr),
    ]
}

/// Projects corners onto an axis and returns the (min, max) interval.
fn project(corners: &[Vector2; 4], axis: &Vector2) -> (f32, f32) {
    let mut min = corners[0].dot(axis);
    let mut max = min;
    for corner in &corners[1..] {
        let p = corner.dot(axis);
        min = min.min(p);
        max = max.max(p);
    }
    (min, max)
}

/// Separating-axis overlap test between two cars.
///
/// Returns the penetration vector pointing from `a` to `b`, or `None` when a
/// separating axis exists. `detect(b, a)` yields the negated vector.
pub fn detect(a: &Car, b: &Car) -> Option<Vector2> {
    let corners_a = corners(a);
    let corners_b = corners(b);

    // Two unique edge normals per rectangle; opposite edges share an axis
    let axes = [
        Vector2::from_angle(a.visual_direction),
        {
            let f = Vector2::from_angle(a.visual_direction);
            Vector2::new(-f.y, f.x)
        },
        Vector2::from_angle(b.visual_direction),
        {
            let f = Vector2::from_angle(b.visual_direction);
            Vector2::new(-f.y, f.x)
        },
    ];

    let mut min_overlap = f32::MAX;
    let mut min_axis = axes[0];

    for axis in &axes {
        let (min_a, max_a) = project(&corners_a, axis);
        let (min_b, max_b) = project(&corners_b, axis);

        let overlap = max_a.min(max_b) - min_a.max(min_b);
        if overlap < 0.0 {
            return None;
        }
        if overlap < min_overlap {
            min_overlap = overlap;
            min_axis = *axis;
        }
    }

    // Orient the minimum-translation vector from a toward b
    let delta = b.position.sub(&a.position);
    let mut penetration = min_axis.scale(min_overlap);
    if penetration.dot(&delta) < 0.0 {
        penetration = penetration.scale(-1.0);
    }

    Some(penetration)
}

/// Speed at which the cars approach each other along the contact normal.
/// Positive while closing, negative once separating. Callers sample this
/// before `resolve`, which rewrites the velocities.
pub fn closing_speed(a: &Car, b: &Car, penetration: &Vector2) -> f32 {
    let normal = penetration.normalize();
    let relative = b.velocity().sub(&a.velocity());
    -relative.dot(&normal)
}

/// Separates two overlapping cars and applies an elastic impulse along the
/// contact normal. Cars already moving apart only get the positional
/// correction, and a wreck never regains momentum from the bounce.
pub fn resolve(a: &mut Car, b: &mut Car, penetration: Vector2) {
    let half = penetration.scale(0.5);
    a.position = a.position.sub(&half);
    b.position = b.position.add(&half);

    if !a.is_alive || !b.is_alive {
        return;
    }

    let normal = penetration.normalize();
    if normal.magnitude() == 0.0 {
        return;
    }

    let velocity_a = a.velocity();
    let velocity_b = b.velocity();
    let relative = velocity_b.sub(&velocity_a);
    let along_normal = relative.dot(&normal);

    // Already separating
    if along_normal > 0.0 {
        return;
    }

    // Equal masses, so the impulse splits evenly
    let impulse = -(1.0 + RESTITUTION) * along_normal / 2.0;
    a.set_velocity(velocity_a.sub(&normal.scale(impulse)));
    b.set_velocity(velocity_b.add(&normal.scale(impulse)));
}
