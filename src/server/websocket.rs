//! WebSocket transport
//!
//! All peers dial "/": the device firmware connects to the bare origin, so
//! the upgrade cannot live on a dedicated path. Plain GETs on the same
//! route serve as the liveness check. Each socket gets a bounded outbound
//! queue drained by a writer task; inbound frames go straight to the
//! router, and the close event feeds registry cleanup.

use crate::server::registry::{PeerHandle, Registry};
use crate::server::router::MessageRouter;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        FromRequestParts, Request, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Capacity of each connection's outbound queue
const OUTBOUND_BUFFER: usize = 100;

/// Shared state for the WebSocket handlers
#[derive(Clone)]
pub struct WsState {
    pub router: MessageRouter,
}

impl WsState {
    pub fn new() -> Self {
        Self {
            router: MessageRouter::new(Registry::new()),
        }
    }
}

impl Default for WsState {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the relay router
pub fn create_router(state: WsState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn root_handler(State(state): State<WsState>, req: Request) -> Response {
    // axum 0.8 has no Option<WebSocketUpgrade> extractor, so split the
    // upgrade-or-banner cases by hand
    let (mut parts, _body) = req.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade
            .on_upgrade(move |socket| handle_socket(socket, state))
            .into_response(),
        Err(_) => "casabus relay is running".into_response(),
    }
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();

    // Queue for outbound frames, drained by the writer task
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let peer = Arc::new(PeerHandle::new(tx));
    let conn_id = peer.id;

    debug!(conn_id = %conn_id, "WebSocket connection established");

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Process incoming frames inline; the router never suspends
    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                state.router.handle_message(&peer, text.as_str());
            }
            Ok(Message::Binary(data)) => {
                // Tolerate binary frames by treating their bytes as text
                let text = String::from_utf8_lossy(&data);
                state.router.handle_message(&peer, &text);
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Handled automatically by axum
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Cleanup
    debug!(conn_id = %conn_id, "WebSocket connection closed");
    state.router.handle_disconnect(conn_id);
    send_task.abort();
}

/// Run the relay server
pub async fn run_websocket_server(bind_addr: SocketAddr, state: WsState) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "Relay listening");

    axum::serve(listener, app).await?;

    Ok(())
}
