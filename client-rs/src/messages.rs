//! Message vocabulary for the relay protocol
//!
//! These mirror the server-side definitions to ensure wire compatibility.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Role claim sent by the device as its first frame
pub const DEVICE_CONNECTED: &str = "ESP32_CONNECTED";
/// Role claim sent by an interactive client as its first frame
pub const CLIENT_CONNECTED: &str = "FLUTTER_CONNECTED";
/// Relay acknowledgment for an accepted role claim
pub const CONNECTION_ACK: &str = "connection_successful";

/// Connection role to claim after dialing the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The sensor/actuator endpoint; receives commands, publishes readings
    Device,
    /// An interactive endpoint; sends commands, receives readings
    Client,
}

impl Role {
    /// The first frame sent after connecting
    pub fn claim_token(&self) -> &'static str {
        match self {
            Role::Device => DEVICE_CONNECTED,
            Role::Client => CLIENT_CONNECTED,
        }
    }
}

/// Actuation commands understood by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    LightOn,
    LightOff,
    FanOn,
    FanOff,
    AutoOn,
    AutoOff,
}

impl Command {
    /// Wire token for this command
    pub fn as_token(&self) -> &'static str {
        match self {
            Command::LightOn => "LIGHT_ON",
            Command::LightOff => "LIGHT_OFF",
            Command::FanOn => "FAN_ON",
            Command::FanOff => "FAN_OFF",
            Command::AutoOn => "AUTO_ON",
            Command::AutoOff => "AUTO_OFF",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

/// Error parsing a command token
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown command: {0}")]
pub struct CommandParseError(pub String);

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LIGHT_ON" => Ok(Command::LightOn),
            "LIGHT_OFF" => Ok(Command::LightOff),
            "FAN_ON" => Ok(Command::FanOn),
            "FAN_OFF" => Ok(Command::FanOff),
            "AUTO_ON" => Ok(Command::AutoOn),
            "AUTO_OFF" => Ok(Command::AutoOff),
            _ => Err(CommandParseError(s.to_string())),
        }
    }
}

/// Timestamp a device attaches to a reading
///
/// Devices with a synced clock stamp readings with a formatted date
/// string; others report a plain milliseconds counter. Both forms pass
/// through the relay untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Milliseconds counter, typically device uptime
    Millis(u64),
    /// Formatted clock string, e.g. "2024-01-05 12:00:00"
    Text(String),
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Millis(ms) => write!(f, "{} ms", ms),
            Timestamp::Text(text) => f.write_str(text),
        }
    }
}

impl From<u64> for Timestamp {
    fn from(ms: u64) -> Self {
        Timestamp::Millis(ms)
    }
}

/// One sensor reading, as published by the device and rebroadcast to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub temperature: f64,
    pub humidity: f64,
    pub light: u16,

    /// Device-reported timestamp, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,

    /// Origin tag, set by the relay on rebroadcast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A frame received from the relay, classified for convenience
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// Acknowledgment of a role claim
    Ack,
    /// Actuation command; the device role receives these
    Command(Command),
    /// Sensor reading; the client role receives these
    Telemetry(TelemetryFrame),
    /// Anything else, verbatim
    Text(String),
}

impl RelayEvent {
    /// Classify a raw frame from the relay
    pub fn from_frame(raw: &str) -> RelayEvent {
        if raw == CONNECTION_ACK {
            return RelayEvent::Ack;
        }
        if let Ok(command) = raw.parse::<Command>() {
            return RelayEvent::Command(command);
        }
        if let Ok(frame) = serde_json::from_str::<TelemetryFrame>(raw) {
            return RelayEvent::Telemetry(frame);
        }
        RelayEvent::Text(raw.to_string())
    }
}
