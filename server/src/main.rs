use clap::Parser;
use log::{error, info};
use server::network::{self, NetworkEvent};
use server::rooms::{RoomManager, EVENT_CAPACITY};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Multiplayer racing server")]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Simulation updates per second
    #[arg(short, long, default_value_t = 30)]
    tick_rate: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Listening on {}", address);

    let (event_tx, event_rx) = mpsc::channel::<NetworkEvent>(EVENT_CAPACITY);

    let manager_handle = tokio::spawn(RoomManager::new().run(event_rx, args.tick_rate));
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = network::run_listener(listener, event_tx).await {
            error!("Listener failed: {}", e);
        }
    });

    tokio::select! {
        result = listener_handle => {
            if let Err(e) = result {
                error!("Transport task panicked: {}", e);
            }
        }
        result = manager_handle => {
            if let Err(e) = result {
                error!("Room manager task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
