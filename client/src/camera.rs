//! Follow camera: smoothed world-position tracking and the world-to-screen
//! transform consumed by the rendering layer.

use shared::Vector2;

/// Exponential smoothing factor pulling the camera toward its target.
pub const CAMERA_SMOOTHING: f32 = 5.0;

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vector2,
    pub viewport_width: f32,
    pub viewport_height: f32,
}

impl Camera {
    pub fn new(viewport_width: f32, viewport_height: f32) -> Self {
        Camera {
            position: Vector2::default(),
            viewport_width,
            viewport_height,
        }
    }

    /// Moves the camera toward `target` with exponential smoothing. Runs once
    /// per simulation tick, after the followed car has moved.
    pub fn follow(&mut self, target: &Vector2, dt: f32) {
        let factor = (CAMERA_SMOOTHING * dt).min(1.0);
        let delta = target.sub(&self.position);
        self.position = self.position.add(&delta.scale(factor));
    }

    /// Snaps straight to the target, for spawns and teleports.
    pub fn snap_to(&mut self, target: &Vector2) {
        self.position = *target;
    }

    /// Maps a world position into screen space with the camera centered in
    /// the viewport. Screen y grows downward.
    pub fn world_to_screen(&self, world: &Vector2) -> Vector2 {
        Vector2::new(
            world.x - self.position.x + self.viewport_width / 2.0,
            self.viewport_height / 2.0 - (world.y - self.position.y),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_follow_converges_to_target() {
        let mut camera = Camera::new(800.0, 600.0);
        let target = Vector2::new(500.0, 300.0);

        let mut last_distance = camera.position.distance_to(&target);
        for _ in 0..300 {
            camera.follow(&target, 1.0 / 60.0);
            let distance = camera.position.distance_to(&target);
            assert!(distance <= last_distance);
            last_distance = distance;
        }
        assert!(last_distance < 1.0);
    }

    #[test]
    fn test_follow_is_gradual() {
        let mut camera = Camera::new(800.0, 600.0);
        camera.follow(&Vector2::new(100.0, 0.0), 1.0 / 60.0);
        assert!(camera.position.x > 0.0);
        assert!(camera.position.x < 100.0);
    }

    #[test]
    fn test_world_to_screen_centers_camera() {
        let mut camera = Camera::new(800.0, 600.0);
        camera.snap_to(&Vector2::new(1000.0, 2000.0));

        let center = camera.world_to_screen(&Vector2::new(1000.0, 2000.0));
        assert_approx_eq!(center.x, 400.0);
        assert_approx_eq!(center.y, 300.0);

        // World up maps to screen up (smaller y)
        let above = camera.world_to_screen(&Vector2::new(1000.0, 2100.0));
        assert_approx_eq!(above.y, 200.0);
    }
}
