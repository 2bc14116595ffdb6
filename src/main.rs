//! Media Catalog Server - Entry Point
//!
//! Loads configuration, initializes logging and starts the public and admin
//! HTTP servers.

use media_catalog_server::{
    config::{Config, LoggingConfig},
    run,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_default()?;

    init_logging(&config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        folder = %config.storage.folder,
        "Starting Media Catalog Server"
    );

    run(config).await
}

/// `RUST_LOG` overrides the configured level
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
}
