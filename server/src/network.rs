//! Websocket transport: accepts connections, decodes inbound frames and
//! funnels everything into the room manager's event channel.
//!
//! Each connection gets its own writer task fed by a bounded mpsc channel,
//! so the manager never awaits a slow socket.

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::protocol::{self, ClientMessage, ServerMessage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

pub const OUTBOUND_CAPACITY: usize = 256;

/// Events from the transport to the room manager task.
#[derive(Debug)]
pub enum NetworkEvent {
    Connected {
        conn_id: u64,
        outbound: mpsc::Sender<ServerMessage>,
    },
    Message {
        conn_id: u64,
        message: ClientMessage,
    },
    Disconnected {
        conn_id: u64,
    },
}

/// Accepts connections forever; one task per connection.
pub async fn run_listener(
    listener: TcpListener,
    events: mpsc::Sender<NetworkEvent>,
) -> Result<(), Box<dyn std::error::Error>> {
    let next_conn_id = Arc::new(AtomicU64::new(1));

    loop {
        let (stream, addr) = listener.accept().await?;
        let conn_id = next_conn_id.fetch_add(1, Ordering::Relaxed);
        let events = events.clone();

        info!("Connection {} accepted from {}", conn_id, addr);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(conn_id, stream, events).await {
                warn!("Connection {} ended with error: {}", conn_id, e);
            }
        });
    }
}

async fn handle_connection(
    conn_id: u64,
    stream: TcpStream,
    events: mpsc::Sender<NetworkEvent>,
) -> Result<(), Box<dyn std::error::Error>> {
    let websocket = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = websocket.split();

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            match protocol::encode(&message) {
                Ok(frame) => {
                    if let Err(e) = sink.send(Message::Text(frame)).await {
                        debug!("Write to connection {} failed: {}", conn_id, e);
                        break;
                    }
                }
                Err(e) => error!("Failed to encode outbound message: {}", e),
            }
        }
        let _ = sink.close().await;
    });

    events
        .send(NetworkEvent::Connected {
            conn_id,
            outbound: outbound_tx.clone(),
        })
        .await?;

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => match protocol::decode::<ClientMessage>(&text) {
                Ok(message) => {
                    events.send(NetworkEvent::Message { conn_id, message }).await?;
                }
                Err(e) => {
                    // Malformed frames are reported, not fatal
                    warn!("Undecodable frame on connection {}: {}", conn_id, e);
                    let _ = outbound_tx
                        .send(ServerMessage::Error {
                            code: "badMessage".to_string(),
                            message: "message could not be decoded".to_string(),
                        })
                        .await;
                }
            },
            Ok(Message::Close(_)) => {
                debug!("Connection {} closed by peer", conn_id);
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(other) => debug!("Ignoring non-text frame on {}: {:?}", conn_id, other),
            Err(e) => {
                debug!("Read error on connection {}: {}", conn_id, e);
                break;
            }
        }
    }

    events.send(NetworkEvent::Disconnected { conn_id }).await?;
    writer.abort();
    let _ = writer.await;
    Ok(())
}
