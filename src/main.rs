//! Serial Bridge
//!
//! WebSocket server exposing local serial ports to browser clients.

use std::net::IpAddr;

use anyhow::Context;
use clap::Parser;
use serial_bridge::SerialServer;
use serial_bridge::server::{DEFAULT_HOST, DEFAULT_PORT};
use tracing_subscriber::EnvFilter;

/// Serial Bridge - serial ports over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "serial-bridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, default_value_t = DEFAULT_HOST)]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Reply to a duplicate openserial with the error only
    #[arg(long)]
    pub strict_ack: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// List available serial ports and exit
    #[arg(short, long)]
    pub list: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "serial_bridge=debug"
    } else {
        "serial_bridge=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server = SerialServer::builder()
        .host(cli.host)
        .port(cli.port)
        .legacy_double_ack(!cli.strict_ack)
        .build()
        .context("Invalid configuration")?;

    if cli.list {
        let ports = server
            .list_ports()
            .await
            .context("Failed to list serial ports")?;
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            match port.description {
                Some(description) => println!("{}\t{}", port.name, description),
                None => println!("{}", port.name),
            }
        }
        return Ok(());
    }

    let running = server
        .start()
        .await
        .with_context(|| format!("Failed to listen on {}:{}", cli.host, cli.port))?;

    tracing::info!(url = %running.ws_url(), "Ready for connections");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl-C")?;

    tracing::info!("Shutdown requested");
    running.stop().await;

    Ok(())
}
