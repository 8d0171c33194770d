//! Authoritative race simulation for one room.
//!
//! Owned by the room manager task, so all mutation is single-writer. The
//! simulation advances from the shared physics crate and emits the protocol
//! messages the room should broadcast each tick.

use log::{debug, info};
use shared::protocol::{CarSnapshot, RaceResult, ServerMessage};
use shared::{
    collision, crash_slower, normalize_angle, Car, CheckpointTracker, TrackMap, Vector2,
    CAR_WIDTH, DEFAULT_TRACK_SEED, TRACK_HEIGHT, TRACK_ROOMS, TRACK_WIDTH,
};
use std::collections::HashMap;

pub const COUNTDOWN_SECONDS: f32 = 3.0;

#[derive(Debug, PartialEq)]
enum RacePhase {
    Countdown,
    Running,
}

pub struct Race {
    map: TrackMap,
    cars: HashMap<u32, Car>,
    checkpoints: CheckpointTracker,
    phase: RacePhase,
    countdown_remaining: f32,
    /// Last whole second announced, so the countdown is broadcast once per step.
    announced_second: u32,
    elapsed: f32,
    finishers: Vec<RaceResult>,
}

impl Race {
    /// Starts a race for the given players. Cars spawn staggered around the
    /// finish cell; the track derives from the shared seed on both ends.
    pub fn new(players: &[(u32, String)]) -> Self {
        let map =
            TrackMap::generate_seeded(TRACK_WIDTH, TRACK_HEIGHT, TRACK_ROOMS, DEFAULT_TRACK_SEED);
        let spawn = map.finish_cell_pos();

        let mut cars = HashMap::new();
        let mut checkpoints = CheckpointTracker::new(map.route().to_vec());
        for (i, (player_id, name)) in players.iter().enumerate() {
            let offset = Vector2::new(0.0, i as f32 * (CAR_WIDTH + 4.0));
            cars.insert(*player_id, Car::new(*player_id, name, spawn.add(&offset), 0.0));
            checkpoints.register_car(*player_id);
        }

        info!("Race created for {} player(s)", players.len());

        Race {
            map,
            cars,
            checkpoints,
            phase: RacePhase::Countdown,
            countdown_remaining: COUNTDOWN_SECONDS,
            announced_second: COUNTDOWN_SECONDS.ceil() as u32 + 1,
            elapsed: 0.0,
            finishers: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == RacePhase::Running
    }

    pub fn has_player(&self, player_id: u32) -> bool {
        self.cars.contains_key(&player_id)
    }

    /// Applies a reported input window to the player's car. The report
    /// carries heading and duration only; throttle is implied for the
    /// whole window and clients reconcile against the broadcast state.
    pub fn apply_input(&mut self, player_id: u32, direction_angle: Option<f32>, elapsed_time: f32) {
        if self.phase != RacePhase::Running {
            return;
        }
        if let Some(car) = self.cars.get_mut(&player_id) {
            if let Some(angle) = direction_angle {
                car.direction = normalize_angle(angle);
            }
            car.accelerate(elapsed_time.clamp(0.0, 0.25));
        }
    }

    /// Records a finish in arrival order. Returns false for repeat reports.
    pub fn record_finish(&mut self, player_id: u32, player_name: &str, elapsed_time: f32) -> bool {
        if self.finishers.iter().any(|r| r.player_id == player_id) {
            return false;
        }
        let placement = self.finishers.len() as u32 + 1;
        self.finishers.push(RaceResult {
            player_id,
            player_name: player_name.to_string(),
            placement,
            elapsed_time,
        });
        info!("Player {} finished in place {}", player_id, placement);
        true
    }

    /// True once every remaining car belongs to a finisher.
    pub fn all_finished(&self) -> bool {
        self.cars
            .keys()
            .all(|id| self.finishers.iter().any(|r| r.player_id == *id))
    }

    pub fn results(&self) -> Vec<RaceResult> {
        self.finishers.clone()
    }

    pub fn remove_player(&mut self, player_id: u32) {
        self.cars.remove(&player_id);
        self.checkpoints.remove_car(player_id);
    }

    pub fn player_count(&self) -> usize {
        self.cars.len()
    }

    /// Advances the race one tick and returns the messages to broadcast.
    pub fn tick(&mut self, dt: f32) -> Vec<ServerMessage> {
        match self.phase {
            RacePhase::Countdown => self.tick_countdown(dt),
            RacePhase::Running => self.tick_running(dt),
        }
    }

    fn tick_countdown(&mut self, dt: f32) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        self.countdown_remaining -= dt;

        let second = self.countdown_remaining.max(0.0).ceil() as u32;
        if second < self.announced_second {
            self.announced_second = second;
            out.push(ServerMessage::GameCountdownUpdate {
                remaining_time: second as f32,
            });
        }

        if self.countdown_remaining <= 0.0 {
            debug!("Countdown complete, race running");
            self.phase = RacePhase::Running;
        }
        out
    }

    fn tick_running(&mut self, dt: f32) -> Vec<ServerMessage> {
        self.elapsed += dt;

        let ids: Vec<u32> = self.cars.keys().cloned().collect();
        for id in &ids {
            if let Some(car) = self.cars.get_mut(id) {
                car.terrain_modifier = self.map.speed_modifier_at(&car.position);
                car.update(dt);
            }
        }

        // Pairwise collision pass over the id list
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                if let (Some(mut a), Some(mut b)) =
                    (self.cars.remove(&ids[i]), self.cars.remove(&ids[j]))
                {
                    if let Some(penetration) = collision::detect(&a, &b) {
                        let impact = collision::closing_speed(&a, &b, &penetration);
                        if impact >= collision::CRASH_CLOSING_SPEED {
                            crash_slower(&mut a, &mut b);
                        }
                        collision::resolve(&mut a, &mut b, penetration);
                    }
                    self.cars.insert(ids[i], a);
                    self.cars.insert(ids[j], b);
                }
            }
        }

        for id in &ids {
            if let Some(car) = self.cars.get(id) {
                let position = car.position;
                self.checkpoints.checkpoint_reached(*id, &position);
            }
        }

        vec![ServerMessage::GameStateUpdate {
            players: self.snapshots(),
        }]
    }

    fn snapshots(&self) -> Vec<CarSnapshot> {
        let route_len = self.checkpoints.route_len() as u32;
        let mut players: Vec<CarSnapshot> = self
            .cars
            .values()
            .map(|car| {
                let laps = self.checkpoints.laps_for(car.id);
                let rings = laps * route_len + self.checkpoints.next_index_for(car.id) as u32;
                CarSnapshot {
                    player_id: car.id,
                    x: car.position.x,
                    y: car.position.y,
                    direction_angle: car.direction,
                    speed: car.speed,
                    rings_crossed: rings,
                    laps,
                }
            })
            .collect();
        players.sort_by_key(|s| s.player_id);
        players
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_player_race() -> Race {
        Race::new(&[(1, "Alice".to_string()), (2, "Bob".to_string())])
    }

    #[test]
    fn test_countdown_announces_each_second() {
        let mut race = two_player_race();
        let mut announced = Vec::new();

        for _ in 0..((COUNTDOWN_SECONDS * 30.0) as usize + 2) {
            for message in race.tick(1.0 / 30.0) {
                if let ServerMessage::GameCountdownUpdate { remaining_time } = message {
                    announced.push(remaining_time as u32);
                }
            }
        }

        assert_eq!(announced, vec![3, 2, 1, 0]);
        assert!(race.is_running());
    }

    #[test]
    fn test_no_snapshots_during_countdown() {
        let mut race = two_player_race();
        let out = race.tick(1.0 / 30.0);
        assert!(out
            .iter()
            .all(|m| !matches!(m, ServerMessage::GameStateUpdate { .. })));
    }

    #[test]
    fn test_input_ignored_until_running() {
        let mut race = two_player_race();
        race.apply_input(1, Some(0.0), 0.1);
        race.tick(COUNTDOWN_SECONDS + 0.1);

        let out = race.tick(1.0 / 30.0);
        if let Some(ServerMessage::GameStateUpdate { players }) = out.first() {
            let car = players.iter().find(|s| s.player_id == 1).unwrap();
            assert_eq!(car.speed, 0.0);
        } else {
            panic!("expected a state update");
        }
    }

    #[test]
    fn test_input_moves_car_when_running() {
        let mut race = two_player_race();
        race.tick(COUNTDOWN_SECONDS + 0.1);
        assert!(race.is_running());

        for _ in 0..30 {
            race.apply_input(1, Some(0.0), 1.0 / 30.0);
            race.tick(1.0 / 30.0);
        }

        let out = race.tick(1.0 / 30.0);
        if let Some(ServerMessage::GameStateUpdate { players }) = out.first() {
            let car = players.iter().find(|s| s.player_id == 1).unwrap();
            assert!(car.speed > 0.0);
        } else {
            panic!("expected a state update");
        }
    }

    #[test]
    fn test_high_speed_collision_wrecks_slower_car() {
        let mut race = two_player_race();
        race.tick(COUNTDOWN_SECONDS + 0.1);
        assert!(race.is_running());

        let base = race.cars.get(&1).map(|c| c.position).unwrap();
        if let Some(car) = race.cars.get_mut(&1) {
            car.direction = 0.0;
            car.visual_direction = 0.0;
            car.speed = shared::MAX_SPEED;
        }
        // Stationary car overlapping nose-to-tail with the fast one
        if let Some(car) = race.cars.get_mut(&2) {
            car.position = Vector2::new(base.x + 58.0, base.y);
            car.direction = 0.0;
            car.visual_direction = 0.0;
            car.speed = 0.0;
        }

        race.tick(0.0);

        assert!(race.cars.get(&1).unwrap().is_alive);
        assert!(!race.cars.get(&2).unwrap().is_alive);
        assert_eq!(race.cars.get(&2).unwrap().speed, 0.0);
    }

    #[test]
    fn test_finish_order_sets_placement() {
        let mut race = two_player_race();
        assert!(race.record_finish(2, "Bob", 61.2));
        assert!(race.record_finish(1, "Alice", 65.8));
        assert!(!race.record_finish(2, "Bob", 70.0));

        let results = race.results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].player_id, 2);
        assert_eq!(results[0].placement, 1);
        assert_eq!(results[1].player_id, 1);
        assert_eq!(results[1].placement, 2);
        assert!(race.all_finished());
    }

    #[test]
    fn test_leaver_does_not_block_finish() {
        let mut race = two_player_race();
        race.record_finish(1, "Alice", 59.0);
        assert!(!race.all_finished());

        race.remove_player(2);
        assert!(race.all_finished());
        assert_eq!(race.player_count(), 1);
    }
}
