//! Relay server implementation
//!
//! Connection registry, message dispatch, and the WebSocket transport.

mod registry;
mod router;
pub mod websocket;

pub use registry::{PeerHandle, Registry};
pub use router::MessageRouter;
pub use websocket::{create_router, run_websocket_server, WsState};
