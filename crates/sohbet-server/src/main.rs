//! # sohbet
//!
//! Real-time messaging relay server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! sohbet
//!
//! # Run with custom config
//! # (first match wins: ./sohbet.toml, /etc/sohbet/sohbet.toml,
//! #  ~/.config/sohbet/sohbet.toml)
//!
//! # Run with environment variables
//! SOHBET_PORT=8080 SOHBET_HOST=0.0.0.0 sohbet
//! ```

mod config;
mod handlers;
mod identity;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sohbet=debug,sohbet_core=debug,sohbet_protocol=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting sohbet relay on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
