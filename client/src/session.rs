//! Client-side room/session state machine.
//!
//! Transitions are driven exclusively by inbound protocol messages, matched
//! exhaustively so a new message kind cannot be silently ignored. Server
//! errors become state, never panics: the consuming layer renders
//! `last_error` instead of crashing.

use log::{debug, info, warn};
use shared::protocol::{PlayerInfo, RaceResult, ServerMessage};

/// Connection/room lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    Connected,
    InRoom,
    GameRunning,
}

/// Error reported by the server, kept as user-visible state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub code: String,
    pub message: String,
}

/// Everything the client knows about its own connection, room membership and
/// game progress. Mutated only from the message-handling task.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub local_player_id: Option<u32>,
    /// Empty until a room-created/joined confirmation arrives.
    pub room_id: String,
    /// Grows and shrinks only via explicit connected/disconnected/room-updated
    /// messages; never silently reconciled.
    pub players: Vec<PlayerInfo>,
    pub countdown: f32,
    pub results: Vec<RaceResult>,
    pub last_info: Option<String>,
    pub last_error: Option<SessionError>,
    pub last_action: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        SessionState {
            phase: SessionPhase::Disconnected,
            local_player_id: None,
            room_id: String::new(),
            players: Vec::new(),
            countdown: 0.0,
            results: Vec::new(),
            last_info: None,
            last_error: None,
            last_action: None,
        }
    }

    pub fn is_game_started(&self) -> bool {
        self.phase == SessionPhase::GameRunning
    }

    pub fn mark_connecting(&mut self) {
        self.phase = SessionPhase::Connecting;
    }

    pub fn mark_connected(&mut self) {
        self.phase = SessionPhase::Connected;
    }

    /// Transport gone: back to square one. Room and game state cannot outlive
    /// the session that produced them.
    pub fn mark_disconnected(&mut self) {
        self.phase = SessionPhase::Disconnected;
        self.local_player_id = None;
        self.room_id.clear();
        self.players.clear();
        self.countdown = 0.0;
    }

    /// Records the id the server assigned to this client. The caller decides
    /// which reply is the registration confirmation; connect announcements for
    /// other players pass through `handle` as roster growth only.
    pub fn adopt_player_id(&mut self, player_id: u32) {
        info!("Connected as player {}", player_id);
        self.local_player_id = Some(player_id);
        if self.phase == SessionPhase::Connecting {
            self.phase = SessionPhase::Connected;
        }
    }

    /// Applies one inbound message to the session.
    pub fn handle(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::PlayerConnected {
                player_id,
                player_name,
            } => {
                if !self.players.iter().any(|p| p.player_id == *player_id) {
                    self.players.push(PlayerInfo {
                        player_id: *player_id,
                        player_name: player_name.clone(),
                    });
                }
            }

            ServerMessage::PlayerDisconnected { player_id } => {
                self.players.retain(|p| p.player_id != *player_id);
                debug!("Player {} disconnected", player_id);
            }

            ServerMessage::Info { message } => {
                self.last_info = Some(message.clone());
            }

            ServerMessage::Error { code, message } => {
                // Recoverable by policy: surface as state, never throw
                warn!("Server error {}: {}", code, message);
                self.last_error = Some(SessionError {
                    code: code.clone(),
                    message: message.clone(),
                });
            }

            ServerMessage::RoomCreated { room_id } | ServerMessage::JoinedRoom { room_id } => {
                info!("Entered room {}", room_id);
                self.room_id = room_id.clone();
                self.phase = SessionPhase::InRoom;
            }

            ServerMessage::LeftRoom { room_id } => {
                if *room_id == self.room_id {
                    info!("Left room {}", room_id);
                    self.room_id.clear();
                    let local_id = self.local_player_id;
                    self.players.retain(|p| Some(p.player_id) == local_id);
                    self.phase = SessionPhase::Connected;
                } else {
                    debug!("Ignoring left-room for foreign room {}", room_id);
                }
            }

            ServerMessage::StartedGame => {
                info!("Game started in room {}", self.room_id);
                self.results.clear();
                self.phase = SessionPhase::GameRunning;
            }

            ServerMessage::RoomUpdated { room_id, players } => {
                if *room_id == self.room_id {
                    self.players = players.clone();
                } else {
                    debug!("Ignoring room update for foreign room {}", room_id);
                }
            }

            ServerMessage::PlayerAction { name } => {
                self.last_action = Some(name.clone());
            }

            ServerMessage::GameCountdownUpdate { remaining_time } => {
                self.countdown = *remaining_time;
            }

            // Car positions belong to the simulation layer, not the session
            ServerMessage::GameStateUpdate { .. } => {}

            ServerMessage::GameStop { results } => {
                info!("Race over, {} results", results.len());
                self.results = results.clone();
                self.countdown = 0.0;
                self.phase = SessionPhase::InRoom;
            }
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
