//! Configuration for the relay client

use std::time::Duration;

/// Configuration for connecting to a casabus relay
#[derive(Debug, Clone)]
pub struct CasabusConfig {
    /// Relay URL (e.g., "ws://localhost:3000")
    pub url: String,

    /// Whether to automatically reconnect on disconnect
    pub auto_reconnect: bool,

    /// Delay between reconnection attempts
    pub reconnect_delay: Duration,

    /// Timeout for establishing the WebSocket connection
    pub connect_timeout: Duration,

    /// Timeout for the role-claim acknowledgment
    pub handshake_timeout: Duration,

    /// Interval between keepalive pings
    pub ping_interval: Duration,

    /// Grace period for the pong after each ping; a connection with no
    /// traffic for a full interval past this window is dropped
    pub pong_timeout: Duration,
}

impl CasabusConfig {
    /// Create a new configuration for the given relay URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(3),
        }
    }

    /// Disable automatic reconnection
    pub fn no_reconnect(mut self) -> Self {
        self.auto_reconnect = false;
        self
    }

    /// Set the delay between reconnection attempts
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the role-claim acknowledgment timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the keepalive ping interval
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the pong grace period
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = timeout;
        self
    }
}
