//! Relay client implementation

use crate::config::CasabusConfig;
use crate::error::{CasabusError, Result};
use crate::messages::{Command, RelayEvent, Role, TelemetryFrame, CONNECTION_ACK};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Capacity of the outbound frame queue and the received-event queue
const FRAME_BUFFER: usize = 100;

/// Connection state of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected to the relay
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Waiting for the role-claim acknowledgment
    Identifying,
    /// Connected and ready
    Connected,
    /// Attempting to reconnect after a drop
    Reconnecting,
}

/// Message to the connection task
enum OutboundFrame {
    Send(String),
    Ping,
    Shutdown,
}

/// Internal client state
struct ClientInner {
    config: CasabusConfig,
    role: Mutex<Option<Role>>,
    state: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,

    // Channel for sending frames to the connection task
    tx: Mutex<Option<mpsc::Sender<OutboundFrame>>>,

    // Frames received from the relay, classified
    event_tx: mpsc::Sender<RelayEvent>,
    event_rx: tokio::sync::Mutex<mpsc::Receiver<RelayEvent>>,

    // Shutdown signal for the connection task
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

/// Casabus relay client
///
/// Dials the relay, claims a role, and exchanges frames. This struct is
/// cheaply cloneable as it uses an internal Arc; clones share the same
/// connection.
#[derive(Clone)]
pub struct CasabusClient {
    inner: Arc<ClientInner>,
}

impl CasabusClient {
    /// Create a new client with the given configuration
    pub fn new(config: CasabusConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, event_rx) = mpsc::channel(FRAME_BUFFER);

        let inner = Arc::new(ClientInner {
            config,
            role: Mutex::new(None),
            state: state_tx,
            state_rx,
            tx: Mutex::new(None),
            event_tx,
            event_rx: tokio::sync::Mutex::new(event_rx),
            shutdown: Mutex::new(None),
        });

        Self { inner }
    }

    /// Get the current connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Get a receiver for connection state changes
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// The role this client claims, once `connect` has been called
    pub fn role(&self) -> Option<Role> {
        *self.inner.role.lock()
    }

    /// Connect to the relay and claim `role`
    ///
    /// Resolves once the relay acknowledges the claim. With auto-reconnect
    /// enabled the client keeps retrying failed attempts and this call
    /// resolves on the first successful handshake.
    pub async fn connect(&self, role: Role) -> Result<()> {
        let current_state = self.connection_state();
        if current_state != ConnectionState::Disconnected
            && current_state != ConnectionState::Reconnecting
        {
            return Err(CasabusError::Connection(format!(
                "Cannot connect in state: {:?}",
                current_state
            )));
        }

        *self.inner.role.lock() = Some(role);
        self.inner.set_state(ConnectionState::Connecting);

        // Spawn connection task
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Err(e) = connection_task(inner.clone()).await {
                error!("Connection task error: {}", e);
                handle_disconnect(&inner);
            }
        });

        // Wait for connected state or failure
        let mut state_rx = self.inner.state_rx.clone();
        loop {
            if state_rx.changed().await.is_err() {
                return Err(CasabusError::Shutdown);
            }

            match *state_rx.borrow() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected => {
                    return Err(CasabusError::Connection("Connection failed".into()));
                }
                _ => continue,
            }
        }
    }

    /// Disconnect from the relay
    ///
    /// Frames already queued are written out before the socket closes.
    pub async fn disconnect(&self) -> Result<()> {
        let tx = self.inner.tx.lock().take();
        if let Some(tx) = tx {
            let _ = tx.send(OutboundFrame::Shutdown).await;
            // The connection task drops its receiver once the queue is
            // flushed and the close frame is on the wire
            tx.closed().await;
        } else if let Some(shutdown) = self.inner.shutdown.lock().take() {
            let _ = shutdown.send(());
        }

        self.inner.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    /// Send an actuation command to the device via the relay
    pub async fn send_command(&self, command: Command) -> Result<()> {
        self.send_raw(command.as_token()).await
    }

    /// Publish a sensor reading (device role)
    pub async fn publish_reading(&self, reading: &TelemetryFrame) -> Result<()> {
        let payload = serde_json::to_string(reading)?;
        self.send_raw(payload).await
    }

    /// Send a raw text frame to the relay
    pub async fn send_raw(&self, frame: impl Into<String>) -> Result<()> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(CasabusError::NotConnected);
        }

        let tx = self.inner.tx.lock().clone();
        if let Some(tx) = tx {
            tx.send(OutboundFrame::Send(frame.into()))
                .await
                .map_err(|_| CasabusError::NotConnected)
        } else {
            Err(CasabusError::NotConnected)
        }
    }

    /// Next frame from the relay
    ///
    /// Waits across reconnects; returns `None` only if the event channel
    /// closes.
    pub async fn next_event(&self) -> Option<RelayEvent> {
        self.inner.event_rx.lock().await.recv().await
    }
}

impl ClientInner {
    fn set_state(&self, state: ConnectionState) {
        let _ = self.state.send(state);
    }

    fn handle_frame(&self, raw: &str) {
        let event = RelayEvent::from_frame(raw);
        debug!(?event, "Received frame");
        if self.event_tx.try_send(event).is_err() {
            warn!("Event buffer full, dropping frame");
        }
    }
}

fn handle_disconnect(inner: &Arc<ClientInner>) {
    *inner.tx.lock() = None;

    if inner.config.auto_reconnect {
        inner.set_state(ConnectionState::Reconnecting);
        schedule_reconnect(inner.clone());
    } else {
        inner.set_state(ConnectionState::Disconnected);
    }
}

fn schedule_reconnect(inner: Arc<ClientInner>) {
    tokio::spawn(async move {
        let mut attempt = 0u32;

        loop {
            let delay = inner.config.reconnect_delay;
            info!("Reconnecting in {:?}...", delay);
            tokio::time::sleep(delay).await;

            if *inner.state_rx.borrow() == ConnectionState::Disconnected {
                // Manual disconnect, stop reconnecting
                break;
            }

            inner.set_state(ConnectionState::Connecting);

            match connection_task(inner.clone()).await {
                Ok(()) => break,
                Err(e) => {
                    attempt += 1;
                    warn!("Reconnect attempt {} failed: {}", attempt, e);
                    inner.set_state(ConnectionState::Reconnecting);
                }
            }
        }
    });
}

/// Main connection task: dial, claim the role, then pump frames both ways
/// until shutdown or a transport failure
async fn connection_task(inner: Arc<ClientInner>) -> Result<()> {
    let role = (*inner.role.lock())
        .ok_or_else(|| CasabusError::Connection("No role to claim".into()))?;

    debug!(url = %inner.config.url, "Connecting");
    let (mut ws_stream, _) = timeout(
        inner.config.connect_timeout,
        connect_async(inner.config.url.as_str()),
    )
    .await
    .map_err(|_| CasabusError::Timeout)?
    .map_err(|e| CasabusError::Connection(e.to_string()))?;

    // Claim the role and wait for the relay's acknowledgment. The role is
    // re-claimed on every attempt, so reconnects restore it.
    inner.set_state(ConnectionState::Identifying);

    ws_stream
        .send(Message::text(role.claim_token()))
        .await
        .map_err(|e| CasabusError::Transport(e.to_string()))?;

    timeout(inner.config.handshake_timeout, async {
        loop {
            match ws_stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if text.as_str() == CONNECTION_ACK {
                        return Ok(());
                    }
                    // Broadcasts can race ahead of the acknowledgment
                    inner.handle_frame(text.as_str());
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(CasabusError::Handshake(
                        "Connection closed before acknowledgment".into(),
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(CasabusError::Transport(e.to_string())),
            }
        }
    })
    .await
    .map_err(|_| CasabusError::Timeout)??;

    info!(role = ?role, "Connected to relay");

    // Channel for outbound frames
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(FRAME_BUFFER);
    let ping_tx = tx.clone();
    *inner.tx.lock() = Some(tx);

    // Shutdown channel
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    *inner.shutdown.lock() = Some(shutdown_tx);

    inner.set_state(ConnectionState::Connected);

    // Spawn keepalive task. The relay answers WebSocket pings at the
    // transport level, so a half-open connection stops producing traffic
    // and is torn down by the deadline check in the main loop.
    let ping_inner = inner.clone();
    let ping_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_inner.config.ping_interval);
        loop {
            ticker.tick().await;
            if *ping_inner.state_rx.borrow() != ConnectionState::Connected {
                break;
            }
            if ping_tx.send(OutboundFrame::Ping).await.is_err() {
                break;
            }
        }
    });

    // The peer is gone once nothing has arrived for a full interval past
    // the pong window
    let liveness_deadline = inner.config.ping_interval + inner.config.pong_timeout;
    let mut last_read = Instant::now();

    // Main loop
    let result: Result<()> = loop {
        tokio::select! {
            frame = rx.recv() => {
                match frame {
                    Some(OutboundFrame::Send(text)) => {
                        if let Err(e) = ws_stream.send(Message::text(text)).await {
                            break Err(CasabusError::Transport(e.to_string()));
                        }
                    }
                    Some(OutboundFrame::Ping) => {
                        if last_read.elapsed() > liveness_deadline {
                            warn!("No traffic within the keepalive window, dropping connection");
                            break Err(CasabusError::Timeout);
                        }
                        if let Err(e) = ws_stream.send(Message::Ping(Vec::new().into())).await {
                            break Err(CasabusError::Transport(e.to_string()));
                        }
                    }
                    Some(OutboundFrame::Shutdown) | None => {
                        let _ = ws_stream.send(Message::Close(None)).await;
                        break Ok(());
                    }
                }
            }

            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        last_read = Instant::now();
                        match msg {
                            Message::Text(text) => inner.handle_frame(text.as_str()),
                            Message::Close(_) => {
                                debug!("Connection closed by relay");
                                break Err(CasabusError::Connection("Connection closed".into()));
                            }
                            // Pongs land here; tungstenite answers pings itself
                            _ => {}
                        }
                    }
                    None => {
                        debug!("Connection closed by relay");
                        break Err(CasabusError::Connection("Connection closed".into()));
                    }
                    Some(Err(e)) => {
                        break Err(CasabusError::Transport(e.to_string()));
                    }
                }
            }

            _ = &mut shutdown_rx => {
                break Ok(());
            }
        }
    };

    // Cleanup
    ping_task.abort();
    *inner.tx.lock() = None;
    *inner.shutdown.lock() = None;

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_initial_state() {
        let client = CasabusClient::new(CasabusConfig::new("ws://localhost:3000"));

        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert!(client.role().is_none());
    }

    #[test]
    fn test_connection_state_equality() {
        assert_eq!(ConnectionState::Disconnected, ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
        assert_ne!(ConnectionState::Disconnected, ConnectionState::Connected);
        assert_ne!(ConnectionState::Connecting, ConnectionState::Identifying);
    }

    #[test]
    fn test_state_receiver() {
        let client = CasabusClient::new(CasabusConfig::new("ws://localhost:3000"));

        let rx = client.state_receiver();
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_client_with_custom_config() {
        use std::time::Duration;

        let config = CasabusConfig::new("ws://relay.local:3000")
            .no_reconnect()
            .connect_timeout(Duration::from_secs(2));

        let client = CasabusClient::new(config);
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }
}
