//! Query bridge (v1)
//!
//! Exposes a stable HTTP query endpoint and forwards each query over a
//! single long-lived WebSocket to one backend peer.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!                     │                 QUERY BRIDGE                  │
//!                     │                                               │
//!   GET /query        │  ┌────────┐    ┌──────────────────────────┐  │
//!   ──────────────────┼─▶│  http  │───▶│    ConnectionManager     │  │
//!                     │  │ server │    │  ┌────────────────────┐  │  │   WebSocket
//!   200 payload /     │  └────────┘    │  │ correlation table  │  │◀─┼──────────── Backend
//!   500 reason        │       ▲        │  └────────────────────┘  │  │  /backend-    peer
//!   ◀─────────────────┼───────┘        │  connection handle+pump  │──┼────────────▶
//!                     │                └──────────────────────────┘  │  connect
//!                     │                                               │
//!                     │  config · observability · lifecycle           │
//!                     └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use query_bridge::config::validation::validate_config;
use query_bridge::config::{load_config, BridgeConfig, ConfigError};
use query_bridge::lifecycle::startup;
use query_bridge::observability::logging;

#[derive(Parser)]
#[command(name = "query-bridge")]
#[command(about = "HTTP query endpoint bridged to a single WebSocket backend peer", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listening port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(port) = args.port {
        config.listener.port = port;
    }
    if let Some(level) = args.log_level {
        config.observability.log_level = level;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config_file = ?args.config,
        "query-bridge starting"
    );

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
