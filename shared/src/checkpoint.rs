//! Per-car progress through the checkpoint route.

use crate::math::Vector2;
use log::debug;
use std::collections::HashMap;

/// How close a car must pass to a waypoint for it to count. Exact position
/// equality would never trigger under floating-point drift.
pub const CHECKPOINT_RADIUS: f32 = 48.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Progress {
    next_index: usize,
    laps: u32,
}

/// Owns the route and all per-car progress. Single writer: only the
/// simulation loop mutates it, and only through `checkpoint_reached`.
#[derive(Debug, Clone, Default)]
pub struct CheckpointTracker {
    route: Vec<Vector2>,
    progress: HashMap<u32, Progress>,
}

impl CheckpointTracker {
    pub fn new(route: Vec<Vector2>) -> Self {
        CheckpointTracker {
            route,
            progress: HashMap::new(),
        }
    }

    /// Starts a car at the first waypoint with zero laps.
    pub fn register_car(&mut self, car_id: u32) {
        self.progress.insert(car_id, Progress::default());
    }

    pub fn remove_car(&mut self, car_id: u32) {
        self.progress.remove(&car_id);
    }

    /// The waypoint the car must reach next. `None` for unregistered cars or
    /// an empty route.
    pub fn next_checkpoint(&self, car_id: u32) -> Option<Vector2> {
        let progress = self.progress.get(&car_id)?;
        self.route.get(progress.next_index).copied()
    }

    /// Advances the car's progress when `position` is within
    /// `CHECKPOINT_RADIUS` of its current target. Passing any other waypoint
    /// leaves the state unchanged; progress never moves backwards.
    pub fn checkpoint_reached(&mut self, car_id: u32, position: &Vector2) {
        let target = match self.next_checkpoint(car_id) {
            Some(target) => target,
            None => return,
        };
        if position.distance_to(&target) > CHECKPOINT_RADIUS {
            return;
        }

        let progress = match self.progress.get_mut(&car_id) {
            Some(progress) => progress,
            None => return,
        };
        progress.next_index += 1;
        if progress.next_index >= self.route.len() {
            progress.next_index = 0;
            progress.laps += 1;
            debug!("Car {} completed lap {}", car_id, progress.laps);
        }
    }

    /// Laps completed; unknown ids count as zero.
    pub fn laps_for(&self, car_id: u32) -> u32 {
        self.progress.get(&car_id).map(|p| p.laps).unwrap_or(0)
    }

    /// Index of the car's next waypoint; unknown ids count as zero.
    pub fn next_index_for(&self, car_id: u32) -> usize {
        self.progress.get(&car_id).map(|p| p.next_index).unwrap_or(0)
    }

    pub fn route_len(&self) -> usize {
        self.route.len()
    }
}
