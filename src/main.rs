//! Casabus CLI entry point

mod cli;

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result};
use casabus::server::{run_websocket_server, WsState};
use casabus_client::{
    CasabusClient, CasabusConfig, Command, RelayEvent, Role, TelemetryFrame, Timestamp,
};
use clap::Parser;
use rand::Rng;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => serve(host, port).await,
        Commands::Send { command, url } => send(command, url).await,
        Commands::Watch { url } => watch(url).await,
        Commands::Simulate { url, interval } => simulate(url, interval).await,
    }
}

async fn serve(host: String, port: u16) -> Result<()> {
    let bind_addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid bind address")?;

    let state = WsState::new();

    // Run the relay with graceful shutdown on signals
    tokio::select! {
        result = run_websocket_server(bind_addr, state) => result,
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping relay");
            Ok(())
        }
    }
}

async fn send(command: Command, url: String) -> Result<()> {
    let client = CasabusClient::new(CasabusConfig::new(&url).no_reconnect());
    client
        .connect(Role::Client)
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;

    client.send_command(command).await?;
    client.disconnect().await?;

    println!("Sent {}", command);
    Ok(())
}

async fn watch(url: String) -> Result<()> {
    let client = CasabusClient::new(CasabusConfig::new(&url));
    client
        .connect(Role::Client)
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;

    println!("Watching sensor readings from {} (Ctrl+C to stop)", url);

    loop {
        tokio::select! {
            event = client.next_event() => {
                match event {
                    Some(RelayEvent::Telemetry(reading)) => {
                        let stamp = reading
                            .timestamp
                            .as_ref()
                            .map(|t| format!("  [{}]", t))
                            .unwrap_or_default();
                        println!(
                            "{:.1} C  {:.1} %RH  light {}{}",
                            reading.temperature, reading.humidity, reading.light, stamp
                        );
                    }
                    Some(RelayEvent::Text(raw)) => println!("{}", raw),
                    Some(_) => {}
                    None => break,
                }
            }
            _ = signal::ctrl_c() => break,
        }
    }

    client.disconnect().await?;
    Ok(())
}

async fn simulate(url: String, interval: u64) -> Result<()> {
    let client = CasabusClient::new(CasabusConfig::new(&url));
    client
        .connect(Role::Device)
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;

    println!("Simulating device against {} (Ctrl+C to stop)", url);

    let started = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reading = synthetic_reading(started.elapsed().as_millis() as u64);
                match client.publish_reading(&reading).await {
                    Ok(()) => info!(
                        temperature = reading.temperature,
                        humidity = reading.humidity,
                        light = reading.light,
                        "Published reading"
                    ),
                    Err(e) => warn!(error = %e, "Failed to publish reading"),
                }
            }
            event = client.next_event() => {
                match event {
                    Some(RelayEvent::Command(command)) => println!("Command received: {}", command),
                    Some(_) => {}
                    None => break,
                }
            }
            _ = signal::ctrl_c() => break,
        }
    }

    client.disconnect().await?;
    Ok(())
}

fn synthetic_reading(uptime_ms: u64) -> TelemetryFrame {
    let mut rng = rand::thread_rng();
    TelemetryFrame {
        temperature: rng.gen_range(18.0..30.0),
        humidity: rng.gen_range(35.0..75.0),
        light: rng.gen_range(200..3800),
        timestamp: Some(Timestamp::Millis(uptime_ms)),
        source: None,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
