use clap::Parser;
use client::game::RaceGame;
use client::gateway::{Gateway, ServerTarget};
use client::input::{Controls, InputTracker};
use client::session::{SessionPhase, SessionState};
use log::{error, info, warn};
use shared::protocol::{ClientMessage, ServerMessage};
use shared::{
    normalize_angle, TrackMap, DEFAULT_TRACK_SEED, TRACK_HEIGHT, TRACK_ROOMS, TRACK_WIDTH,
};
use std::time::{Duration, Instant};
use tokio::time::interval;

const HANDSHAKE_WAIT: Duration = Duration::from_secs(5);
const TICK: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(author, version, about = "Multiplayer racing client")]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Websocket path on the server
    #[arg(long, default_value = "/")]
    path: String,

    /// Player name shown to other racers
    #[arg(long, default_value = "Player")]
    name: String,

    /// Room to join
    #[arg(long, default_value = "main")]
    room: String,

    /// Create the room instead of joining an existing one
    #[arg(long)]
    create: bool,

    /// Ask the server to start the race once in the room
    #[arg(long)]
    start: bool,

    /// Laps to complete before reporting a finish
    #[arg(long, default_value_t = 1)]
    laps: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut session = SessionState::new();
    let mut gateway = Gateway::new(ServerTarget::new(&args.host, args.port, &args.path));

    session.mark_connecting();
    gateway.connect().await;
    if !gateway.is_connected() {
        return Err("could not reach server".into());
    }
    session.mark_connected();

    let mut rx = gateway.subscribe();

    // Registration, then room entry. Each step waits for its own
    // confirmation shape rather than sleeping a fixed amount.
    let registered = gateway
        .request(
            &ClientMessage::InitPlayer {
                name: args.name.clone(),
            },
            |m| matches!(m, ServerMessage::PlayerConnected { .. } | ServerMessage::Error { .. }),
            HANDSHAKE_WAIT,
        )
        .await
        .ok_or("registration timed out")?;
    if let ServerMessage::PlayerConnected { player_id, .. } = &registered {
        session.adopt_player_id(*player_id);
    }
    session.handle(&registered);
    if let Some(ref e) = session.last_error {
        return Err(format!("registration rejected: {} ({})", e.message, e.code).into());
    }

    let room_request = if args.create {
        ClientMessage::CreateRoom {
            name: args.room.clone(),
        }
    } else {
        ClientMessage::JoinRoom {
            name: args.room.clone(),
        }
    };
    let entered = gateway
        .request(
            &room_request,
            |m| {
                matches!(
                    m,
                    ServerMessage::RoomCreated { .. }
                        | ServerMessage::JoinedRoom { .. }
                        | ServerMessage::Error { .. }
                )
            },
            HANDSHAKE_WAIT,
        )
        .await
        .ok_or("room entry timed out")?;
    session.handle(&entered);
    if let Some(ref e) = session.last_error {
        return Err(format!("room entry rejected: {} ({})", e.message, e.code).into());
    }
    info!("In room '{}' as {:?}", session.room_id, session.local_player_id);

    if args.start {
        gateway
            .send(&ClientMessage::StartGame {
                name: args.room.clone(),
            })
            .await;
    }

    // Wait for the race to begin, tracking countdown and roster changes.
    while session.phase != SessionPhase::GameRunning {
        match rx.recv().await {
            Ok(message) => session.handle(&message),
            Err(e) => {
                error!("Lost server stream before start: {}", e);
                gateway.disconnect().await;
                return Err("connection lost".into());
            }
        }
    }

    let local_id = session.local_player_id.ok_or("no player id assigned")?;
    // Both ends derive the same track from the shared seed; the start
    // message carries no map payload.
    let map =
        TrackMap::generate_seeded(TRACK_WIDTH, TRACK_HEIGHT, TRACK_ROOMS, DEFAULT_TRACK_SEED);
    let mut game = RaceGame::new(local_id, &args.name, map, 800.0, 600.0);
    for player in &session.players {
        game.set_player_name(player.player_id, &player.player_name);
    }

    let mut tracker = InputTracker::new();
    let mut ticker = interval(TICK);
    let race_start = Instant::now();
    let mut finished = false;

    info!("Race started, driving {} lap(s)", args.laps);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let controls = autopilot(&game);
                game.tick(&controls, TICK.as_secs_f32());

                if let Some(message) =
                    tracker.update(&controls, game.local_car.direction, game.rings_crossed())
                {
                    gateway.send(&message).await;
                }

                if !finished && game.laps_completed() >= args.laps {
                    finished = true;
                    let elapsed_time = race_start.elapsed().as_secs_f32();
                    info!("Finished {} lap(s) in {:.2}s", args.laps, elapsed_time);
                    gateway
                        .send(&ClientMessage::PlayerFinished { elapsed_time })
                        .await;
                }
            }
            inbound = rx.recv() => {
                match inbound {
                    Ok(message) => {
                        session.handle(&message);
                        match &message {
                            ServerMessage::GameStateUpdate { players } => {
                                game.apply_server_state(players);
                            }
                            ServerMessage::PlayerDisconnected { player_id } => {
                                game.remove_player(*player_id);
                            }
                            ServerMessage::RoomUpdated { players, .. } => {
                                for player in players {
                                    game.set_player_name(player.player_id, &player.player_name);
                                }
                            }
                            ServerMessage::GameStop { results } => {
                                for result in results {
                                    info!(
                                        "#{} {} ({:.2}s)",
                                        result.placement, result.player_name, result.elapsed_time
                                    );
                                }
                                break;
                            }
                            _ => {}
                        }
                    }
                    Err(e) => {
                        warn!("Server stream ended: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, leaving race");
                break;
            }
        }
    }

    gateway.send(&ClientMessage::LeaveRoom).await;
    gateway.disconnect().await;
    session.mark_disconnected();
    Ok(())
}

/// Steers toward the next checkpoint at full throttle.
fn autopilot(game: &RaceGame) -> Controls {
    let mut controls = Controls {
        throttle: true,
        ..Controls::default()
    };

    if let Some(target) = game.checkpoints.next_checkpoint(game.local_car.id) {
        let to_target = target.sub(&game.local_car.position);
        let error = normalize_angle(to_target.angle() - game.local_car.direction);
        controls.steer = if error.abs() < 0.05 {
            0.0
        } else {
            error.signum()
        };
    }

    controls
}
