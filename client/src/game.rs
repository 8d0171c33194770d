//! Locally predicted race state.
//!
//! The client advances its own car immediately from input and reconciles
//! against the server's broadcast snapshots. All car, checkpoint and camera
//! state is owned here and mutated only from the simulation task, so no
//! locking is needed.

use crate::camera::Camera;
use crate::input::Controls;
use log::debug;
use shared::protocol::CarSnapshot;
use shared::{collision, crash_slower, normalize_angle, Car, CheckpointTracker, TrackMap, Vector2};
use std::collections::HashMap;

/// Server disagreement beyond this distance snaps the predicted car.
pub const RECONCILE_DISTANCE: f32 = 48.0;

pub struct RaceGame {
    pub local_car: Car,
    pub remote_cars: HashMap<u32, Car>,
    pub map: TrackMap,
    pub checkpoints: CheckpointTracker,
    pub camera: Camera,
}

impl RaceGame {
    pub fn new(
        local_id: u32,
        local_name: &str,
        map: TrackMap,
        viewport_width: f32,
        viewport_height: f32,
    ) -> Self {
        let spawn = map.finish_cell_pos();
        let local_car = Car::new(local_id, local_name, spawn, 0.0);

        let mut checkpoints = CheckpointTracker::new(map.route().to_vec());
        checkpoints.register_car(local_id);

        let mut camera = Camera::new(viewport_width, viewport_height);
        camera.snap_to(&spawn);

        RaceGame {
            local_car,
            remote_cars: HashMap::new(),
            map,
            checkpoints,
            camera,
        }
    }

    /// Total checkpoints the local car has crossed since the race started.
    pub fn rings_crossed(&self) -> u32 {
        let id = self.local_car.id;
        let route_len = self.checkpoints.route_len() as u32;
        self.checkpoints.laps_for(id) * route_len + self.checkpoints.next_index_for(id) as u32
    }

    pub fn laps_completed(&self) -> u32 {
        self.checkpoints.laps_for(self.local_car.id)
    }

    /// Advances the whole predicted world one tick.
    pub fn tick(&mut self, controls: &Controls, dt: f32) {
        self.apply_controls(controls, dt);

        self.local_car.terrain_modifier = self.map.speed_modifier_at(&self.local_car.position);
        self.local_car.update(dt);

        // Dead-reckon remote cars between broadcasts
        for car in self.remote_cars.values_mut() {
            car.terrain_modifier = self.map.speed_modifier_at(&car.position);
            car.update(dt);
        }

        self.handle_collisions();

        let position = self.local_car.position;
        self.checkpoints.checkpoint_reached(self.local_car.id, &position);

        self.camera.follow(&position, dt);
    }

    fn apply_controls(&mut self, controls: &Controls, dt: f32) {
        if controls.steer != 0.0 {
            self.local_car.start_turn(controls.steer);
        } else {
            self.local_car.stop_turn();
        }

        if controls.throttle {
            self.local_car.accelerate(dt);
        } else {
            // Braking and coasting both bleed speed
            self.local_car.decelerate(dt);
        }
    }

    /// One detection/resolution pass per unordered pair of distinct cars.
    /// Hard impacts wreck the slower car of the pair.
    fn handle_collisions(&mut self) {
        let remote_ids: Vec<u32> = self.remote_cars.keys().cloned().collect();

        for id in &remote_ids {
            if let Some(mut remote) = self.remote_cars.remove(id) {
                if let Some(penetration) = collision::detect(&self.local_car, &remote) {
                    let impact = collision::closing_speed(&self.local_car, &remote, &penetration);
                    if impact >= collision::CRASH_CLOSING_SPEED {
                        crash_slower(&mut self.local_car, &mut remote);
                    }
                    collision::resolve(&mut self.local_car, &mut remote, penetration);
                }
                self.remote_cars.insert(*id, remote);
            }
        }

        for i in 0..remote_ids.len() {
            for j in (i + 1)..remote_ids.len() {
                if let (Some(mut a), Some(mut b)) = (
                    self.remote_cars.remove(&remote_ids[i]),
                    self.remote_cars.remove(&remote_ids[j]),
                ) {
                    if let Some(penetration) = collision::detect(&a, &b) {
                        let impact = collision::closing_speed(&a, &b, &penetration);
                        if impact >= collision::CRASH_CLOSING_SPEED {
                            crash_slower(&mut a, &mut b);
                        }
                        collision::resolve(&mut a, &mut b, penetration);
                    }
                    self.remote_cars.insert(remote_ids[i], a);
                    self.remote_cars.insert(remote_ids[j], b);
                }
            }
        }
    }

    /// Reconciles the predicted world against a server broadcast.
    ///
    /// Remote cars are moved to their confirmed state. The local car only
    /// snaps when the server disagrees by more than `RECONCILE_DISTANCE`;
    /// small drift is left to the prediction. Cars are never removed here;
    /// removal happens on an explicit disconnect message.
    pub fn apply_server_state(&mut self, snapshots: &[CarSnapshot]) {
        for snapshot in snapshots {
            let confirmed = Vector2::new(snapshot.x, snapshot.y);

            if snapshot.player_id == self.local_car.id {
                let drift = self.local_car.position.distance_to(&confirmed);
                if drift > RECONCILE_DISTANCE {
                    debug!("Snapping local car, server disagrees by {:.1}", drift);
                    self.local_car.position = confirmed;
                    self.local_car.direction = normalize_angle(snapshot.direction_angle);
                    self.local_car.speed = snapshot.speed;
                }
                continue;
            }

            let car = self
                .remote_cars
                .entry(snapshot.player_id)
                .or_insert_with(|| {
                    Car::new(snapshot.player_id, "", confirmed, snapshot.direction_angle)
                });
            car.position = confirmed;
            car.direction = normalize_angle(snapshot.direction_angle);
            car.speed = snapshot.speed;
        }
    }

    /// Names are cosmetic and arrive on room updates, not snapshots.
    pub fn set_player_name(&mut self, player_id: u32, name: &str) {
        if let Some(car) = self.remote_cars.get_mut(&player_id) {
            car.name = name.to_string();
        }
    }

    pub fn remove_player(&mut self, player_id: u32) {
        self.remote_cars.remove(&player_id);
        self.checkpoints.remove_car(player_id);
    }
}
