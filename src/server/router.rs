//! Message dispatch: role claims, command forwarding, telemetry fan-out

use crate::protocol::{self, Command, Inbound, Role};
use crate::server::registry::{PeerHandle, Registry};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Applies classified frames to the registry and performs the resulting
/// sends. Dispatch is synchronous: every send is queued before
/// `handle_message` returns, and nothing is retried.
#[derive(Clone)]
pub struct MessageRouter {
    registry: Registry,
}

impl MessageRouter {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Handle one inbound text frame from `peer`
    pub fn handle_message(&self, peer: &Arc<PeerHandle>, raw: &str) {
        match protocol::classify(raw) {
            Inbound::RoleClaim(Role::Device) => {
                match self.registry.claim_device(peer.clone()) {
                    Some(displaced) => info!(
                        conn_id = %peer.id,
                        displaced = %displaced.id,
                        "Device registered, displacing previous connection"
                    ),
                    None => info!(conn_id = %peer.id, "Device registered"),
                }
                self.ack(peer);
            }
            Inbound::RoleClaim(Role::Client) => {
                if self.registry.claim_client(peer.clone()) {
                    info!(
                        conn_id = %peer.id,
                        clients = self.registry.client_count(),
                        "Client registered"
                    );
                }
                self.ack(peer);
            }
            Inbound::Command(command) => self.forward_command(peer, command),
            Inbound::Telemetry(fields) => self.broadcast_telemetry(peer, fields),
            Inbound::Unrecognized(raw) => {
                debug!(conn_id = %peer.id, raw = %raw, "Ignoring unrecognized message");
            }
        }
    }

    /// Handle the close of `peer_id`, called exactly once per connection
    pub fn handle_disconnect(&self, peer_id: Uuid) {
        match self.registry.remove(peer_id) {
            Some(Role::Device) => info!(conn_id = %peer_id, "Device disconnected"),
            Some(Role::Client) => info!(
                conn_id = %peer_id,
                clients = self.registry.client_count(),
                "Client disconnected"
            ),
            None => debug!(conn_id = %peer_id, "Unregistered connection closed"),
        }
    }

    /// Every accepted role claim is acknowledged, including repeats
    fn ack(&self, peer: &Arc<PeerHandle>) {
        if let Err(e) = peer.send(protocol::CONNECTION_ACK) {
            debug!(conn_id = %peer.id, error = %e, "Failed to send acknowledgment");
        }
    }

    fn forward_command(&self, peer: &Arc<PeerHandle>, command: Command) {
        match self.registry.device() {
            Some(device) if device.is_open() => {
                debug!(conn_id = %peer.id, command = %command, "Forwarding command to device");
                if let Err(e) = device.send(command.as_token()) {
                    warn!(command = %command, error = %e, "Command lost: device queue rejected it");
                }
            }
            Some(_) => {
                warn!(command = %command, "Command lost: device connection is closed");
            }
            None => {
                warn!(command = %command, "Command lost: no device connected");
            }
        }
    }

    fn broadcast_telemetry(&self, peer: &Arc<PeerHandle>, fields: Map<String, Value>) {
        let payload = protocol::broadcast_payload(fields);
        let clients = self.registry.clients();

        if clients.is_empty() {
            debug!(conn_id = %peer.id, "No clients connected, dropping telemetry");
            return;
        }

        let mut delivered = 0usize;
        for client in &clients {
            // Closed clients are skipped here; their close handler removes them
            if !client.is_open() {
                debug!(conn_id = %client.id, "Skipping closed client");
                continue;
            }
            if let Err(e) = client.send(payload.clone()) {
                // Expected during rapid disconnect or when a buffer is full
                debug!(conn_id = %client.id, error = %e, "Failed to send telemetry to client");
            } else {
                delivered += 1;
            }
        }

        debug!(delivered, clients = clients.len(), "Telemetry fanned out");
    }
}
