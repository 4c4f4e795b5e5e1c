//! Error types for the casabus client

use thiserror::Error;

/// Errors that can occur when using the casabus client
#[derive(Error, Debug)]
pub enum CasabusError {
    /// Connection to the relay failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// The relay did not acknowledge the role claim
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Not currently connected to the relay
    #[error("Not connected")]
    NotConnected,

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Failed to serialize/deserialize a payload
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// WebSocket error
    #[error("Transport error: {0}")]
    Transport(String),

    /// The client has been shut down
    #[error("Client shut down")]
    Shutdown,
}

/// Result type for casabus client operations
pub type Result<T> = std::result::Result<T, CasabusError>;
