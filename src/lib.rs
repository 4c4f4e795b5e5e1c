//! Casabus - WebSocket relay between a sensor device and interactive clients
//!
//! A small relay bridging one ESP32-style sensor/actuator device and any
//! number of interactive clients. Clients send actuation commands that are
//! forwarded verbatim to the device; the device publishes sensor readings
//! that are tagged with their origin and fanned out to every client.

pub mod protocol;
pub mod server;

pub use protocol::{classify, Command, Inbound, Role};
pub use server::{MessageRouter, PeerHandle, Registry, WsState};
