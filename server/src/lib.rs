//! # Race Server Library
//!
//! Authoritative server for the multiplayer racing game. It accepts
//! websocket connections, keeps the canonical room and race state and
//! broadcasts updates so every client converges on the same world.
//!
//! ## Architecture
//!
//! ### Single-Writer State
//! All rooms, players and races are owned by one manager task. The
//! transport feeds it events over an mpsc channel and a tick interval
//! drives the simulations, so no state is ever shared across tasks and
//! no locking is needed.
//!
//! ### Websocket Transport
//! Connections are accepted on a TCP listener and upgraded with
//! tokio-tungstenite. Each connection runs its own read loop and a writer
//! task fed by a bounded channel, so a slow socket never stalls the
//! manager. Frames are JSON with a `kind` discriminator, shared with the
//! client through the common protocol crate.
//!
//! ### Authoritative Simulation
//! Physics, collision and checkpoint logic come from the same shared
//! crate the client predicts with. The server's outcome wins: clients
//! reconcile their prediction against the broadcast snapshots.
//!
//! ## Module Organization
//!
//! - [`network`] accepts connections and translates frames to events
//! - [`rooms`] owns the player registry and room lifecycle
//! - [`race`] simulates one running race inside a room

pub mod network;
pub mod race;
pub mod rooms;
