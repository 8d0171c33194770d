//! Wire protocol: tagged JSON text frames exchanged over the game connection.
//!
//! Every frame is a JSON object whose `kind` field selects the variant.
//! Unknown fields are ignored on decode and every field is always emitted,
//! so both ends can evolve independently.

use serde::{Deserialize, Serialize};

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Register the player's display name after connecting.
    InitPlayer { name: String },
    CreateRoom { name: String },
    JoinRoom { name: String },
    LeaveRoom,
    StartGame { name: String },
    /// Discrete action forwarded to everyone in the room (horn, taunt, ...).
    PlayerAction { name: String },
    /// Periodic input report while a race is running.
    PlayerInput {
        /// Current heading, absent when the player has not steered yet.
        direction_angle: Option<f32>,
        /// Seconds covered by this report.
        elapsed_time: f32,
        /// Checkpoints crossed since the race started.
        rings_crossed: u32,
    },
    PlayerFinished { elapsed_time: f32 },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    PlayerConnected {
        player_id: u32,
        player_name: String,
    },
    PlayerDisconnected {
        player_id: u32,
    },
    Info {
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
    RoomCreated {
        room_id: String,
    },
    JoinedRoom {
        room_id: String,
    },
    LeftRoom {
        room_id: String,
    },
    StartedGame,
    RoomUpdated {
        room_id: String,
        players: Vec<PlayerInfo>,
    },
    PlayerAction {
        name: String,
    },
    GameCountdownUpdate {
        remaining_time: f32,
    },
    GameStateUpdate {
        players: Vec<CarSnapshot>,
    },
    GameStop {
        results: Vec<RaceResult>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub player_id: u32,
    pub player_name: String,
}

/// One car's state inside a `GameStateUpdate` broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarSnapshot {
    pub player_id: u32,
    pub x: f32,
    pub y: f32,
    pub direction_angle: f32,
    pub speed: f32,
    pub rings_crossed: u32,
    pub laps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceResult {
    pub player_id: u32,
    pub player_name: String,
    pub placement: u32,
    pub elapsed_time: f32,
}

/// Serializes a message into a text frame.
pub fn encode<T: Serialize>(message: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Decodes a text frame; malformed frames surface as an error for the caller
/// to drop and log.
pub fn decode<'a, T: Deserialize<'a>>(frame: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_client_messages() -> Vec<ClientMessage> {
        vec![
            ClientMessage::InitPlayer {
                name: "Alice".to_string(),
            },
            ClientMessage::CreateRoom {
                name: "Track1".to_string(),
            },
            ClientMessage::JoinRoom {
                name: "Track1".to_string(),
            },
            ClientMessage::LeaveRoom,
            ClientMessage::StartGame {
                name: "Track1".to_string(),
            },
            ClientMessage::PlayerAction {
                name: "horn".to_string(),
            },
            ClientMessage::PlayerInput {
                direction_angle: Some(1.25),
                elapsed_time: 0.016,
                rings_crossed: 3,
            },
            ClientMessage::PlayerInput {
                direction_angle: None,
                elapsed_time: 0.016,
                rings_crossed: 0,
            },
            ClientMessage::PlayerFinished { elapsed_time: 93.5 },
        ]
    }

    fn all_server_messages() -> Vec<ServerMessage> {
        vec![
            ServerMessage::PlayerConnected {
                player_id: 1,
                player_name: "Alice".to_string(),
            },
            ServerMessage::PlayerDisconnected { player_id: 1 },
            ServerMessage::Info {
                message: "welcome".to_string(),
            },
            ServerMessage::Error {
                code: "room_exists".to_string(),
                message: "room already exists".to_string(),
            },
            ServerMessage::RoomCreated {
                room_id: "Track1".to_string(),
            },
            ServerMessage::JoinedRoom {
                room_id: "Track1".to_string(),
            },
            ServerMessage::LeftRoom {
                room_id: "Track1".to_string(),
            },
            ServerMessage::StartedGame,
            ServerMessage::RoomUpdated {
                room_id: "Track1".to_string(),
                players: vec![PlayerInfo {
                    player_id: 1,
                    player_name: "Alice".to_string(),
                }],
            },
            ServerMessage::PlayerAction {
                name: "horn".to_string(),
            },
            ServerMessage::GameCountdownUpdate { remaining_time: 2.0 },
            ServerMessage::GameStateUpdate {
                players: vec![CarSnapshot {
                    player_id: 1,
                    x: 96.0,
                    y: 160.0,
                    direction_angle: 0.5,
                    speed: 120.0,
                    rings_crossed: 4,
                    laps: 1,
                }],
            },
            ServerMessage::GameStop {
                results: vec![RaceResult {
                    player_id: 1,
                    player_name: "Alice".to_string(),
                    placement: 1,
                    elapsed_time: 93.5,
                }],
            },
        ]
    }

    #[test]
    fn test_client_message_roundtrip() {
        for message in all_client_messages() {
            let frame = encode(&message).unwrap();
            let decoded: ClientMessage = decode(&frame).unwrap();
            assert_eq!(decoded, message, "frame: {}", frame);
        }
    }

    #[test]
    fn test_server_message_roundtrip() {
        for message in all_server_messages() {
            let frame = encode(&message).unwrap();
            let decoded: ServerMessage = decode(&frame).unwrap();
            assert_eq!(decoded, message, "frame: {}", frame);
        }
    }

    #[test]
    fn test_kind_discriminator_present() {
        for message in all_client_messages() {
            let value: serde_json::Value = serde_json::from_str(&encode(&message).unwrap()).unwrap();
            assert!(value.get("kind").is_some());
        }
        for message in all_server_messages() {
            let value: serde_json::Value = serde_json::from_str(&encode(&message).unwrap()).unwrap();
            assert!(value.get("kind").is_some());
        }
    }

    #[test]
    fn test_absent_direction_angle_serializes_as_null() {
        let message = ClientMessage::PlayerInput {
            direction_angle: None,
            elapsed_time: 1.0,
            rings_crossed: 0,
        };
        let frame = encode(&message).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert!(value.get("directionAngle").unwrap().is_null());
    }

    #[test]
    fn test_all_fields_emitted_at_defaults() {
        let message = ClientMessage::PlayerInput {
            direction_angle: Some(0.0),
            elapsed_time: 0.0,
            rings_crossed: 0,
        };
        let value: serde_json::Value = serde_json::from_str(&encode(&message).unwrap()).unwrap();
        assert!(value.get("directionAngle").is_some());
        assert!(value.get("elapsedTime").is_some());
        assert!(value.get("ringsCrossed").is_some());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let frame = r#"{"kind":"joinedRoom","roomId":"Track1","futureField":7}"#;
        let decoded: ServerMessage = decode(frame).unwrap();
        assert_eq!(
            decoded,
            ServerMessage::JoinedRoom {
                room_id: "Track1".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(decode::<ServerMessage>("not json").is_err());
        assert!(decode::<ServerMessage>(r#"{"kind":"noSuchKind"}"#).is_err());
        assert!(decode::<ServerMessage>("").is_err());
    }

    #[test]
    fn test_wire_naming_is_camel_case() {
        let frame = encode(&ClientMessage::InitPlayer {
            name: "Alice".to_string(),
        })
        .unwrap();
        assert!(frame.contains(r#""kind":"initPlayer""#), "frame: {}", frame);
    }
}
