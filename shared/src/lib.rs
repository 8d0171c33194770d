//! # Shared Racing Core
//!
//! Types and simulation code compiled into both the client and the server:
//! 2D math, car kinematics, oriented-bounding-box collision, the track grid,
//! checkpoint/lap tracking, and the wire protocol. Running the identical
//! simulation on both ends is what makes client-side prediction line up with
//! the server's broadcasts.

pub mod car;
pub mod checkpoint;
pub mod collision;
pub mod math;
pub mod protocol;
pub mod track;

pub use car::{
    crash_slower, Car, ACCELERATION_RATE, CAR_LENGTH, CAR_WIDTH, DECELERATION_RATE, DRIFT_FACTOR,
    MAX_SPEED, MIN_SPEED, TURN_ANIMATION_SPEED, TURN_RATE,
};
pub use checkpoint::{CheckpointTracker, CHECKPOINT_RADIUS};
pub use collision::{closing_speed, detect, resolve, CRASH_CLOSING_SPEED, RESTITUTION};
pub use math::{normalize_angle, Vector2};
pub use protocol::{
    decode, encode, CarSnapshot, ClientMessage, PlayerInfo, RaceResult, ServerMessage,
};
pub use track::{
    Terrain, TileKind, TrackMap, DEFAULT_TRACK_SEED, TILE_SIZE, TRACK_HEIGHT, TRACK_ROOMS,
    TRACK_WIDTH,
};
