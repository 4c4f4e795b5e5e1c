//! Connection registry: the single device slot and the client set

use crate::protocol::Role;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Handle to one connected peer
///
/// Wraps the outbound queue drained by the connection's writer task.
/// Sending never blocks; a frame that does not fit, or arrives after the
/// peer closed, is dropped.
pub struct PeerHandle {
    /// Unique connection ID
    pub id: Uuid,
    /// Queue for outbound text frames
    tx: mpsc::Sender<String>,
}

impl PeerHandle {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    /// Whether the peer's outbound queue is still accepting frames
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a text frame for this peer, best-effort
    pub fn send(
        &self,
        frame: impl Into<String>,
    ) -> Result<(), mpsc::error::TrySendError<String>> {
        self.tx.try_send(frame.into())
    }
}

#[derive(Default)]
struct RegistryInner {
    device: Option<Arc<PeerHandle>>,
    clients: HashMap<Uuid, Arc<PeerHandle>>,
}

/// Process-wide record of who is connected and in which role
///
/// At most one device, any number of clients, and never both roles for the
/// same connection. One lock guards both slots so a role switch moves the
/// peer atomically.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `peer` as the device, displacing whichever connection held
    /// the slot. Returns the displaced handle, if there was a different one.
    /// The peer leaves the client set if it was a member.
    pub fn claim_device(&self, peer: Arc<PeerHandle>) -> Option<Arc<PeerHandle>> {
        let mut inner = self.inner.write();
        inner.clients.remove(&peer.id);
        let id = peer.id;
        inner.device.replace(peer).filter(|old| old.id != id)
    }

    /// Add `peer` to the client set. Returns false if it was already a
    /// member. The device slot is vacated if this peer held it.
    pub fn claim_client(&self, peer: Arc<PeerHandle>) -> bool {
        let mut inner = self.inner.write();
        if inner.device.as_ref().is_some_and(|d| d.id == peer.id) {
            inner.device = None;
        }
        inner.clients.insert(peer.id, peer).is_none()
    }

    /// Current device handle, if any
    pub fn device(&self) -> Option<Arc<PeerHandle>> {
        self.inner.read().device.clone()
    }

    /// Snapshot of the client set
    pub fn clients(&self) -> Vec<Arc<PeerHandle>> {
        self.inner.read().clients.values().cloned().collect()
    }

    pub fn has_device(&self) -> bool {
        self.inner.read().device.is_some()
    }

    pub fn client_count(&self) -> usize {
        self.inner.read().clients.len()
    }

    /// Remove a closed connection. Returns the role it held, if any.
    pub fn remove(&self, id: Uuid) -> Option<Role> {
        let mut inner = self.inner.write();
        if inner.device.as_ref().is_some_and(|d| d.id == id) {
            inner.device = None;
            return Some(Role::Device);
        }
        inner.clients.remove(&id).map(|_| Role::Client)
    }
}
