//! Casabus Rust Client
//!
//! A WebSocket client for the Casabus relay. Claims a role on connect, then
//! sends commands or sensor readings and receives whatever the relay routes
//! back, with support for auto-reconnection.
//!
//! # Example
//!
//! ```no_run
//! use casabus_client::{CasabusClient, CasabusConfig, Command, RelayEvent, Role};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CasabusConfig::new("ws://localhost:3000");
//!     let client = CasabusClient::new(config);
//!
//!     // Register as an interactive client
//!     client.connect(Role::Client).await?;
//!
//!     // Ask the device to switch the light on
//!     client.send_command(Command::LightOn).await?;
//!
//!     // Watch the readings the device publishes
//!     while let Some(event) = client.next_event().await {
//!         if let RelayEvent::Telemetry(reading) = event {
//!             println!("{:.1} C at light level {}", reading.temperature, reading.light);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod messages;

pub use client::{CasabusClient, ConnectionState};
pub use config::CasabusConfig;
pub use error::CasabusError;
pub use messages::{Command, CommandParseError, RelayEvent, Role, TelemetryFrame, Timestamp};
