//! # roslink
//!
//! Rosbridge-compatible WebSocket bridge in front of a Foxglove WebSocket
//! server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! roslink
//!
//! # Point at a different upstream
//! ROSLINK_UPSTREAM=ws://robot:8765 roslink
//!
//! # Run with environment variables
//! ROSLINK_PORT=9090 ROSLINK_HOST=0.0.0.0 roslink
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roslink=debug,roslink_core=debug,roslink_transport=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;

    tracing::info!(
        "Starting roslink on {}:{} (upstream {})",
        config.host,
        config.port,
        config.upstream.url
    );

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
