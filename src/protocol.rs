//! Wire protocol for the relay
//!
//! Everything on the wire is a text frame. Connections identify themselves
//! with a reserved role-claim token, clients send command tokens, and the
//! device sends JSON sensor readings. Tokens match exactly and are
//! case-sensitive.

use serde_json::{Map, Value};

/// Role claim sent by the device as its first message
pub const DEVICE_CONNECTED: &str = "ESP32_CONNECTED";
/// Role claim sent by an interactive client as its first message
pub const CLIENT_CONNECTED: &str = "FLUTTER_CONNECTED";
/// Acknowledgment returned for every accepted role claim
pub const CONNECTION_ACK: &str = "connection_successful";

/// Origin tag added to sensor readings before fan-out
pub const TELEMETRY_SOURCE: &str = "esp32";

/// Keys a JSON object must carry to count as a sensor reading
pub const TELEMETRY_KEYS: [&str; 3] = ["temperature", "humidity", "light"];

/// Connection roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The single sensor/actuator endpoint
    Device,
    /// An interactive endpoint; many may be connected
    Client,
}

/// Actuation commands, forwarded verbatim to the device
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
    pub const ALL: [Command; 6] = [
        Command::LightOn,
        Command::LightOff,
        Command::FanOn,
        Command::FanOff,
        Command::AutoOn,
        Command::AutoOff,
    ];

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

    /// Parse a wire token, exact match only
    pub fn from_token(raw: &str) -> Option<Command> {
        match raw {
            "LIGHT_ON" => Some(Command::LightOn),
            "LIGHT_OFF" => Some(Command::LightOff),
            "FAN_ON" => Some(Command::FanOn),
            "FAN_OFF" => Some(Command::FanOff),
            "AUTO_ON" => Some(Command::AutoOn),
            "AUTO_OFF" => Some(Command::AutoOff),
            _ => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_token())
    }
}

/// A classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A reserved role-claim token
    RoleClaim(Role),
    /// An actuation command
    Command(Command),
    /// A JSON object with all the sensor reading keys
    Telemetry(Map<String, Value>),
    /// Anything else, carried verbatim for logging
    Unrecognized(String),
}

/// Classify a raw inbound frame.
///
/// Checks run in order: role claims, then the command vocabulary, then
/// telemetry-shaped JSON. The telemetry check is presence-only: any value
/// counts, including `null`. Malformed JSON and wrong-shaped objects both
/// fall through to `Unrecognized`.
pub fn classify(raw: &str) -> Inbound {
    match raw {
        DEVICE_CONNECTED => return Inbound::RoleClaim(Role::Device),
        CLIENT_CONNECTED => return Inbound::RoleClaim(Role::Client),
        _ => {}
    }

    if let Some(command) = Command::from_token(raw) {
        return Inbound::Command(command);
    }

    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(raw) {
        if TELEMETRY_KEYS.iter().all(|key| fields.contains_key(*key)) {
            return Inbound::Telemetry(fields);
        }
    }

    Inbound::Unrecognized(raw.to_string())
}

/// Build the payload fanned out to clients for a sensor reading.
///
/// Adds `source: "esp32"` unless the reading already carries a `source`
/// field; everything else, including extra fields like `timestamp`, passes
/// through unchanged.
pub fn broadcast_payload(mut fields: Map<String, Value>) -> String {
    fields
        .entry("source")
        .or_insert_with(|| Value::String(TELEMETRY_SOURCE.to_string()));
    Value::Object(fields).to_string()
}
