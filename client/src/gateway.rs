//! Connection gateway: owns the WebSocket session, the outbound send path
//! and the inbound dispatch loop.
//!
//! Transport failures never cross this boundary as errors. They are logged
//! and reflected in the connection status; higher layers observe them as
//! state, not exceptions.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::protocol::{self, ClientMessage, ServerMessage};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Secure transport is selected when connecting to the standard HTTPS port.
pub const SECURE_PORT: u16 = 443;

/// Subscribers that fall this far behind start losing messages; delivery is
/// at-most-once with no replay.
const BROADCAST_CAPACITY: usize = 256;

/// Where the gateway connects: host, port and request path.
#[derive(Debug, Clone)]
pub struct ServerTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl ServerTarget {
    pub fn new(host: &str, port: u16, path: &str) -> Self {
        ServerTarget {
            host: host.to_string(),
            port,
            path: path.to_string(),
        }
    }

    /// Connection URL, `wss` on the HTTPS port and `ws` everywhere else.
    pub fn url(&self) -> String {
        let scheme = if self.port == SECURE_PORT { "wss" } else { "ws" };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("{}://{}:{}{}", scheme, self.host, self.port, path)
    }
}

/// Client side of the game connection.
pub struct Gateway {
    target: ServerTarget,
    sink: Option<WsSink>,
    receive_task: Option<JoinHandle<()>>,
    inbound_tx: broadcast::Sender<ServerMessage>,
}

impl Gateway {
    pub fn new(target: ServerTarget) -> Self {
        let (inbound_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Gateway {
            target,
            sink: None,
            receive_task: None,
            inbound_tx,
        }
    }

    /// The session counts as connected only while both halves are alive: the
    /// sink still held and the receive loop not yet terminated.
    pub fn is_connected(&self) -> bool {
        let receiving = self
            .receive_task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false);
        self.sink.is_some() && receiving
    }

    /// Fan-out subscription to decoded inbound messages, in wire order.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.inbound_tx.subscribe()
    }

    /// Establishes the transport session and starts the receive loop.
    ///
    /// Failure is logged and leaves the gateway disconnected; callers check
    /// `is_connected` instead of handling an error.
    pub async fn connect(&mut self) {
        if self.is_connected() {
            debug!("connect() ignored, session already active");
            return;
        }

        let url = self.target.url();
        info!("Connecting to {}", url);

        match connect_async(&url).await {
            Ok((stream, _)) => {
                let (sink, stream) = stream.split();
                self.sink = Some(sink);
                self.receive_task = Some(Self::spawn_receive_loop(stream, self.inbound_tx.clone()));
                info!("Connected to {}", url);
            }
            Err(e) => {
                error!("Failed to connect to {}: {}", url, e);
            }
        }
    }

    /// Reads frames until the channel closes or errors. Frames that fail to
    /// decode are dropped with a warning; the loop never crashes on them.
    fn spawn_receive_loop(
        mut stream: WsStream,
        inbound_tx: broadcast::Sender<ServerMessage>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match protocol::decode::<ServerMessage>(&text) {
                        Ok(message) => {
                            // Send only fails with no subscribers, which is fine
                            let _ = inbound_tx.send(message);
                        }
                        Err(e) => {
                            warn!("Dropping undecodable frame: {} ({})", e, text);
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!("Server closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Receive error, leaving receive loop: {}", e);
                        break;
                    }
                }
            }
            debug!("Receive loop terminated");
        })
    }

    /// Serializes and transmits one message if the session is active.
    /// Otherwise the message is dropped with a local notification; there is
    /// no queueing and no retry.
    pub async fn send(&mut self, message: &ClientMessage) {
        let sink = match self.sink.as_mut() {
            Some(sink) => sink,
            None => {
                warn!("Dropping outbound message while disconnected: {:?}", message);
                return;
            }
        };

        let frame = match protocol::encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode {:?}: {}", message, e);
                return;
            }
        };

        if let Err(e) = sink.send(Message::Text(frame)).await {
            error!("Send failed, dropping session: {}", e);
            self.sink = None;
        }
    }

    /// Sends a request and awaits the first inbound message matching
    /// `predicate`, up to `wait`. Correlation by response shape replaces any
    /// fixed-delay sequencing between request and response.
    pub async fn request<F>(
        &mut self,
        message: &ClientMessage,
        predicate: F,
        wait: Duration,
    ) -> Option<ServerMessage>
    where
        F: Fn(&ServerMessage) -> bool,
    {
        let mut rx = self.subscribe();
        self.send(message).await;

        timeout(wait, async move {
            loop {
                match rx.recv().await {
                    Ok(message) if predicate(&message) => return Some(message),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Response watcher lagged, skipped {} messages", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    /// Cancels the receive loop, awaits its termination, then releases the
    /// transport session. Cleanup runs unconditionally; once this returns no
    /// further message is published.
    pub async fn disconnect(&mut self) {
        if let Some(task) = self.receive_task.take() {
            task.abort();
            // Await termination so nothing is published after we return
            let _ = task.await;
        }

        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close().await {
                debug!("Error closing session (ignored): {}", e);
            }
            info!("Disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_plaintext_by_default() {
        let target = ServerTarget::new("localhost", 8080, "/race");
        assert_eq!(target.url(), "ws://localhost:8080/race");
    }

    #[test]
    fn test_url_secure_on_https_port() {
        let target = ServerTarget::new("example.com", 443, "/race");
        assert_eq!(target.url(), "wss://example.com:443/race");
    }

    #[test]
    fn test_url_path_gets_leading_slash() {
        let target = ServerTarget::new("localhost", 9000, "race");
        assert_eq!(target.url(), "ws://localhost:9000/race");
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_dropped() {
        let mut gateway = Gateway::new(ServerTarget::new("localhost", 1, "/"));
        assert!(!gateway.is_connected());

        // Must not panic or block; the message is dropped locally
        gateway
            .send(&ClientMessage::InitPlayer {
                name: "Alice".to_string(),
            })
            .await;
        assert!(!gateway.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_noop() {
        let mut gateway = Gateway::new(ServerTarget::new("localhost", 1, "/"));
        gateway.disconnect().await;
        assert!(!gateway.is_connected());
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_disconnected() {
        // Port 1 on localhost refuses the connection
        let mut gateway = Gateway::new(ServerTarget::new("127.0.0.1", 1, "/"));
        gateway.connect().await;
        assert!(!gateway.is_connected());
    }

    #[tokio::test]
    async fn test_dead_receive_loop_reports_disconnected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                // Complete the handshake, hold briefly, then drop the socket
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    drop(ws);
                }
            }
        });

        let mut gateway = Gateway::new(ServerTarget::new("127.0.0.1", port, "/"));
        gateway.connect().await;
        assert!(gateway.is_connected());

        // Once the peer hangs up the receive loop exits and the gateway
        // must stop reporting an active session
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!gateway.is_connected());
    }

    #[tokio::test]
    async fn test_request_times_out_while_disconnected() {
        let mut gateway = Gateway::new(ServerTarget::new("localhost", 1, "/"));
        let response = gateway
            .request(
                &ClientMessage::CreateRoom {
                    name: "Track1".to_string(),
                },
                |m| matches!(m, ServerMessage::RoomCreated { .. }),
                Duration::from_millis(20),
            )
            .await;
        assert!(response.is_none());
    }
}
