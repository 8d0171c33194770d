//! Game client: websocket gateway, room session tracking and a locally
//! predicted race simulation reconciled against server snapshots.

pub mod camera;
pub mod game;
pub mod gateway;
pub mod input;
pub mod session;
