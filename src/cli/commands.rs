//! CLI command definitions

use casabus_client::Command;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "casabus")]
#[command(about = "WebSocket relay between a sensor device and its clients", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay server
    Serve {
        /// Address to bind to
        #[arg(long, env = "CASABUS_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, env = "PORT", default_value_t = 3000)]
        port: u16,
    },

    /// Send a single actuation command to the device
    ///
    /// Examples:
    ///   casabus send LIGHT_ON
    ///   casabus send fan_off
    Send {
        /// Command: LIGHT_ON, LIGHT_OFF, FAN_ON, FAN_OFF, AUTO_ON or AUTO_OFF
        #[arg(value_parser = parse_command)]
        command: Command,

        /// Relay URL
        #[arg(long, env = "CASABUS_URL", default_value = "ws://127.0.0.1:3000/")]
        url: String,
    },

    /// Connect as a client and print incoming sensor readings
    Watch {
        /// Relay URL
        #[arg(long, env = "CASABUS_URL", default_value = "ws://127.0.0.1:3000/")]
        url: String,
    },

    /// Stand in for the device: publish synthetic readings, print commands
    Simulate {
        /// Relay URL
        #[arg(long, env = "CASABUS_URL", default_value = "ws://127.0.0.1:3000/")]
        url: String,

        /// Seconds between readings
        #[arg(long, default_value_t = 3)]
        interval: u64,
    },
}

fn parse_command(s: &str) -> Result<Command, String> {
    s.to_uppercase().parse().map_err(|_| {
        format!(
            "Invalid command: {}. Must be LIGHT_ON, LIGHT_OFF, FAN_ON, FAN_OFF, AUTO_ON or AUTO_OFF",
            s
        )
    })
}
