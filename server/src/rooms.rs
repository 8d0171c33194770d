//! Room and player registry.
//!
//! One task owns every room, player and race; the transport feeds it
//! `NetworkEvent`s and a tick interval drives the simulations. Requests
//! that cannot be honored answer with an error message on the requesting
//! connection and leave all state untouched.

use crate::network::NetworkEvent;
use crate::race::Race;
use log::{debug, info, warn};
use shared::protocol::{ClientMessage, PlayerInfo, ServerMessage};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

pub const EVENT_CAPACITY: usize = 1024;
/// Delta time cap, matching a 20 Hz floor
const MAX_DELTA_TIME: f32 = 1.0 / 20.0;

struct Connection {
    outbound: mpsc::Sender<ServerMessage>,
    player_id: Option<u32>,
    player_name: String,
    room: Option<String>,
}

struct Room {
    /// Player ids in join order.
    members: Vec<u32>,
    race: Option<Race>,
}

#[derive(Default)]
pub struct RoomManager {
    connections: HashMap<u64, Connection>,
    player_conns: HashMap<u32, u64>,
    rooms: HashMap<String, Room>,
    next_player_id: u32,
}

impl RoomManager {
    pub fn new() -> Self {
        RoomManager {
            next_player_id: 1,
            ..Default::default()
        }
    }

    /// Drives the manager until the event channel closes.
    pub async fn run(mut self, mut events: mpsc::Receiver<NetworkEvent>, tick_rate: u32) {
        let mut ticker = interval(Duration::from_secs_f32(1.0 / tick_rate as f32));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_update = Instant::now();

        // The first tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            info!("Transport channel closed, stopping room manager");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let mut dt = (now - last_update).as_secs_f32();
                    last_update = now;
                    if dt > MAX_DELTA_TIME {
                        warn!("Large delta time {:.3}s, capping to {:.3}s", dt, MAX_DELTA_TIME);
                        dt = MAX_DELTA_TIME;
                    }
                    self.tick(dt).await;
                }
            }
        }
    }

    pub async fn handle_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Connected { conn_id, outbound } => {
                self.connections.insert(
                    conn_id,
                    Connection {
                        outbound,
                        player_id: None,
                        player_name: String::new(),
                        room: None,
                    },
                );
            }
            NetworkEvent::Message { conn_id, message } => {
                self.handle_message(conn_id, message).await;
            }
            NetworkEvent::Disconnected { conn_id } => {
                self.handle_disconnect(conn_id).await;
            }
        }
    }

    /// Advances every running race and broadcasts its output.
    pub async fn tick(&mut self, dt: f32) {
        let room_names: Vec<String> = self.rooms.keys().cloned().collect();
        for name in room_names {
            let messages = match self.rooms.get_mut(&name) {
                Some(room) => match room.race.as_mut() {
                    Some(race) => race.tick(dt),
                    None => continue,
                },
                None => continue,
            };
            for message in messages {
                self.broadcast_room(&name, &message).await;
            }
        }
    }

    async fn handle_message(&mut self, conn_id: u64, message: ClientMessage) {
        match message {
            ClientMessage::InitPlayer { name } => self.init_player(conn_id, name).await,
            ClientMessage::CreateRoom { name } => self.create_room(conn_id, name).await,
            ClientMessage::JoinRoom { name } => self.join_room(conn_id, name).await,
            ClientMessage::LeaveRoom => self.leave_room(conn_id, true).await,
            ClientMessage::StartGame { name } => self.start_game(conn_id, name).await,
            ClientMessage::PlayerAction { name } => self.relay_action(conn_id, name).await,
            ClientMessage::PlayerInput {
                direction_angle,
                elapsed_time,
                ..
            } => self.player_input(conn_id, direction_angle, elapsed_time),
            ClientMessage::PlayerFinished { elapsed_time } => {
                self.player_finished(conn_id, elapsed_time).await
            }
        }
    }

    async fn init_player(&mut self, conn_id: u64, name: String) {
        if let Some(conn) = self.connections.get(&conn_id) {
            if conn.player_id.is_some() {
                self.send_error(conn_id, "alreadyRegistered", "player already registered")
                    .await;
                return;
            }
        } else {
            return;
        }

        let player_id = self.next_player_id;
        self.next_player_id += 1;
        self.player_conns.insert(player_id, conn_id);

        if let Some(conn) = self.connections.get_mut(&conn_id) {
            conn.player_id = Some(player_id);
            conn.player_name = name.clone();
        }

        info!("Registered player {} ({})", player_id, name);
        self.send_to_conn(
            conn_id,
            &ServerMessage::PlayerConnected {
                player_id,
                player_name: name,
            },
        )
        .await;
    }

    async fn create_room(&mut self, conn_id: u64, name: String) {
        let player_id = match self.registered_player(conn_id).await {
            Some(id) => id,
            None => return,
        };
        if self.in_a_room(conn_id) {
            self.send_error(conn_id, "alreadyInRoom", "leave the current room first")
                .await;
            return;
        }
        if self.rooms.contains_key(&name) {
            self.send_error(conn_id, "roomExists", "a room with that name exists")
                .await;
            return;
        }

        self.rooms.insert(
            name.clone(),
            Room {
                members: vec![player_id],
                race: None,
            },
        );
        if let Some(conn) = self.connections.get_mut(&conn_id) {
            conn.room = Some(name.clone());
        }

        info!("Player {} created room '{}'", player_id, name);
        self.send_to_conn(conn_id, &ServerMessage::RoomCreated { room_id: name.clone() })
            .await;
        self.broadcast_roster(&name).await;
    }

    async fn join_room(&mut self, conn_id: u64, name: String) {
        let player_id = match self.registered_player(conn_id).await {
            Some(id) => id,
            None => return,
        };
        if self.in_a_room(conn_id) {
            self.send_error(conn_id, "alreadyInRoom", "leave the current room first")
                .await;
            return;
        }

        match self.rooms.get_mut(&name) {
            None => {
                self.send_error(conn_id, "roomNotFound", "no room with that name")
                    .await;
            }
            Some(room) if room.race.is_some() => {
                self.send_error(conn_id, "gameRunning", "a race is already running")
                    .await;
            }
            Some(room) => {
                room.members.push(player_id);
                if let Some(conn) = self.connections.get_mut(&conn_id) {
                    conn.room = Some(name.clone());
                }

                info!("Player {} joined room '{}'", player_id, name);
                self.send_to_conn(conn_id, &ServerMessage::JoinedRoom { room_id: name.clone() })
                    .await;
                self.broadcast_roster(&name).await;
            }
        }
    }

    /// Removes the player from their room. `confirm` controls whether a
    /// left-room confirmation goes back; disconnects skip it.
    async fn leave_room(&mut self, conn_id: u64, confirm: bool) {
        let (player_id, room_name) = match self.connections.get(&conn_id) {
            Some(conn) => match (conn.player_id, conn.room.clone()) {
                (Some(id), Some(room)) => (id, room),
                _ => {
                    if confirm {
                        self.send_error(conn_id, "notInRoom", "not currently in a room")
                            .await;
                    }
                    return;
                }
            },
            None => return,
        };

        if let Some(conn) = self.connections.get_mut(&conn_id) {
            conn.room = None;
        }

        let mut race_done = false;
        let mut room_empty = false;
        if let Some(room) = self.rooms.get_mut(&room_name) {
            room.members.retain(|id| *id != player_id);
            room_empty = room.members.is_empty();
            if let Some(race) = room.race.as_mut() {
                race.remove_player(player_id);
                race_done = race.player_count() > 0 && race.all_finished();
            }
        }

        if confirm {
            self.send_to_conn(
                conn_id,
                &ServerMessage::LeftRoom {
                    room_id: room_name.clone(),
                },
            )
            .await;
        }

        if room_empty {
            info!("Room '{}' is empty, removing it", room_name);
            self.rooms.remove(&room_name);
            return;
        }

        self.broadcast_room(&room_name, &ServerMessage::PlayerDisconnected { player_id })
            .await;
        self.broadcast_roster(&room_name).await;
        if race_done {
            self.finish_race(&room_name).await;
        }
    }

    async fn start_game(&mut self, conn_id: u64, name: String) {
        let player_id = match self.registered_player(conn_id).await {
            Some(id) => id,
            None => return,
        };
        let in_this_room = self
            .connections
            .get(&conn_id)
            .and_then(|c| c.room.as_deref())
            == Some(name.as_str());
        if !in_this_room {
            self.send_error(conn_id, "notInRoom", "join the room before starting it")
                .await;
            return;
        }

        let roster: Vec<(u32, String)> = match self.rooms.get(&name) {
            Some(room) if room.race.is_some() => {
                self.send_error(conn_id, "gameRunning", "a race is already running")
                    .await;
                return;
            }
            Some(room) => room
                .members
                .iter()
                .filter_map(|id| {
                    let conn_id = self.player_conns.get(id)?;
                    let conn = self.connections.get(conn_id)?;
                    Some((*id, conn.player_name.clone()))
                })
                .collect(),
            None => {
                self.send_error(conn_id, "roomNotFound", "no room with that name")
                    .await;
                return;
            }
        };

        if let Some(room) = self.rooms.get_mut(&name) {
            room.race = Some(Race::new(&roster));
        }

        info!("Player {} started a race in room '{}'", player_id, name);
        self.broadcast_room(&name, &ServerMessage::StartedGame).await;
    }

    async fn relay_action(&mut self, conn_id: u64, name: String) {
        let room_name = match self.connections.get(&conn_id).and_then(|c| c.room.clone()) {
            Some(room) => room,
            None => {
                self.send_error(conn_id, "notInRoom", "not currently in a room")
                    .await;
                return;
            }
        };
        self.broadcast_room(&room_name, &ServerMessage::PlayerAction { name })
            .await;
    }

    fn player_input(&mut self, conn_id: u64, direction_angle: Option<f32>, elapsed_time: f32) {
        let (player_id, room_name) = match self.connections.get(&conn_id) {
            Some(conn) => match (conn.player_id, conn.room.clone()) {
                (Some(id), Some(room)) => (id, room),
                // Stray input outside a race is dropped, not an error
                _ => return,
            },
            None => return,
        };

        if let Some(race) = self.rooms.get_mut(&room_name).and_then(|r| r.race.as_mut()) {
            race.apply_input(player_id, direction_angle, elapsed_time);
        }
    }

    async fn player_finished(&mut self, conn_id: u64, elapsed_time: f32) {
        let (player_id, player_name, room_name) = match self.connections.get(&conn_id) {
            Some(conn) => match (conn.player_id, conn.room.clone()) {
                (Some(id), Some(room)) => (id, conn.player_name.clone(), room),
                _ => {
                    self.send_error(conn_id, "notInRoom", "not currently in a room")
                        .await;
                    return;
                }
            },
            None => return,
        };

        let done = match self.rooms.get_mut(&room_name).and_then(|r| r.race.as_mut()) {
            Some(race) => {
                if !race.has_player(player_id) {
                    return;
                }
                if !race.record_finish(player_id, &player_name, elapsed_time) {
                    debug!("Repeat finish report from player {}", player_id);
                }
                race.all_finished()
            }
            None => {
                self.send_error(conn_id, "noGame", "no race is running").await;
                return;
            }
        };

        if done {
            self.finish_race(&room_name).await;
        }
    }

    /// Publishes the final standings and returns the room to its lobby state.
    async fn finish_race(&mut self, room_name: &str) {
        let results = match self.rooms.get_mut(room_name) {
            Some(room) => match room.race.take() {
                Some(race) => race.results(),
                None => return,
            },
            None => return,
        };

        info!("Race in room '{}' finished", room_name);
        self.broadcast_room(room_name, &ServerMessage::GameStop { results })
            .await;
    }

    async fn handle_disconnect(&mut self, conn_id: u64) {
        self.leave_room(conn_id, false).await;

        if let Some(conn) = self.connections.remove(&conn_id) {
            if let Some(player_id) = conn.player_id {
                info!("Player {} disconnected", player_id);
                self.player_conns.remove(&player_id);
            }
        }
    }

    /// Resolves the connection's player id, answering with an error when the
    /// connection never registered.
    async fn registered_player(&mut self, conn_id: u64) -> Option<u32> {
        match self.connections.get(&conn_id).and_then(|c| c.player_id) {
            Some(id) => Some(id),
            None => {
                self.send_error(conn_id, "notRegistered", "register a player first")
                    .await;
                None
            }
        }
    }

    fn in_a_room(&self, conn_id: u64) -> bool {
        self.connections
            .get(&conn_id)
            .map(|c| c.room.is_some())
            .unwrap_or(false)
    }

    fn roster(&self, room_name: &str) -> Vec<PlayerInfo> {
        let room = match self.rooms.get(room_name) {
            Some(room) => room,
            None => return Vec::new(),
        };
        room.members
            .iter()
            .filter_map(|id| {
                let conn_id = self.player_conns.get(id)?;
                let conn = self.connections.get(conn_id)?;
                Some(PlayerInfo {
                    player_id: *id,
                    player_name: conn.player_name.clone(),
                })
            })
            .collect()
    }

    async fn broadcast_roster(&self, room_name: &str) {
        let message = ServerMessage::RoomUpdated {
            room_id: room_name.to_string(),
            players: self.roster(room_name),
        };
        self.broadcast_room(room_name, &message).await;
    }

    async fn broadcast_room(&self, room_name: &str, message: &ServerMessage) {
        let members = match self.rooms.get(room_name) {
            Some(room) => room.members.clone(),
            None => return,
        };
        for player_id in members {
            if let Some(conn_id) = self.player_conns.get(&player_id) {
                self.send_to_conn(*conn_id, message).await;
            }
        }
    }

    async fn send_error(&self, conn_id: u64, code: &str, text: &str) {
        self.send_to_conn(
            conn_id,
            &ServerMessage::Error {
                code: code.to_string(),
                message: text.to_string(),
            },
        )
        .await;
    }

    async fn send_to_conn(&self, conn_id: u64, message: &ServerMessage) {
        if let Some(conn) = self.connections.get(&conn_id) {
            if conn.outbound.send(message.clone()).await.is_err() {
                debug!("Dropping message for gone connection {}", conn_id);
            }
        }
    }
}
