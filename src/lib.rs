//! # Media Catalog Server
//!
//! Backend for a storefront media library. It reconciles a media table
//! (authoritative for alt text, tags and SEO metadata) with an object
//! storage bucket (authoritative for which files exist).
//!
//! ## Features
//!
//! - **Merged listing**: table rows and storage-only objects in one list,
//!   never duplicating a path
//! - **Validated uploads**: type and size checks before any I/O, storage
//!   write undone when the table insert fails
//! - **Delete by id or path**: storage-only objects can be removed too
//! - **Extended metadata**: SEO fields, bulk tags, AI-generated alt text
//! - **Admin API**: stats, explicit backfill, cache purge
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  HTTP Server                     │
//! │  ┌─────────────┐ ┌─────────────┐ ┌───────────┐ │
//! │  │  Media API  │ │ Serve API   │ │ Admin API │ │
//! │  └─────────────┘ └─────────────┘ └───────────┘ │
//! ├─────────────────────────────────────────────────┤
//! │                 MediaCatalog                     │
//! │  ┌─────────────┐ ┌─────────────┐ ┌───────────┐ │
//! │  │ ObjectStore │ │ MediaTable  │ │ Metadata  │ │
//! │  │             │ │             │ │  Store    │ │
//! │  └─────────────┘ └─────────────┘ └───────────┘ │
//! ├─────────────────────────────────────────────────┤
//! │        File System / RocksDB / AI endpoint       │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the server
//! cargo run --release
//!
//! # Upload an image
//! curl -X POST http://localhost:3000/api/media -F "file=@image.jpg"
//!
//! # List the library
//! curl http://localhost:3000/api/media
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;

pub use config::{AuthConfig, Config};
pub use error::{AppError, Result};
pub use middleware::{ApiKeyAuth, RateLimiter};
pub use state::AppState;

use axum::{extract::DefaultBodyLimit, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Run the media catalog server with the given configuration.
///
/// This function starts both the public and admin API servers.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let public_addr: SocketAddr =
        format!("{}:{}", config.server.host, config.server.port).parse()?;
    let admin_addr: SocketAddr =
        format!("{}:{}", config.server.admin_host, config.server.admin_port).parse()?;

    let state = AppState::new(config).await?;

    let rate_limiter = RateLimiter::new(&state.config.rate_limit);
    let public_app = build_public_router(state.clone(), &rate_limiter);
    let admin_app = create_admin_router(state.clone());

    if rate_limiter.is_enabled() {
        let window = Duration::from_secs(state.config.rate_limit.window_seconds);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(window);
            loop {
                ticker.tick().await;
                rate_limiter.retain_recent();
            }
        });
    }

    info!(address = %public_addr, "Public API server starting");
    info!(address = %admin_addr, "Admin API server starting");

    let public_listener = TcpListener::bind(public_addr).await?;
    let admin_listener = TcpListener::bind(admin_addr).await?;

    tokio::select! {
        result = axum::serve(
            public_listener,
            public_app.into_make_service_with_connect_info::<SocketAddr>(),
        ) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Public server error");
            }
        }
        result = axum::serve(admin_listener, admin_app) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin server error");
            }
        }
    }

    Ok(())
}

/// Create the public API router
pub fn create_public_router(state: AppState) -> Router {
    let rate_limiter = RateLimiter::new(&state.config.rate_limit);
    build_public_router(state, &rate_limiter)
}

fn build_public_router(state: AppState, rate_limiter: &RateLimiter) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = RequestBodyLimitLayer::new(state.body_limit());

    let api_auth = ApiKeyAuth::new(&state.config.auth);

    if api_auth.is_enabled() {
        info!(keys_count = api_auth.key_count(), "API key authentication enabled");
    }

    if rate_limiter.is_enabled() {
        info!(
            requests_per_window = state.config.rate_limit.requests_per_window,
            window_seconds = state.config.rate_limit.window_seconds,
            "Rate limiting enabled"
        );
    }

    Router::new()
        .nest("/api/media", handlers::media_routes())
        .nest("/storage", handlers::serve_routes())
        .nest("/health", handlers::health_routes())
        .layer(cors)
        .layer(DefaultBodyLimit::disable())
        .layer(body_limit)
        .layer(api_auth.layer())
        .layer(rate_limiter.layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the admin API router (localhost only)
pub fn create_admin_router(state: AppState) -> Router {
    Router::new()
        .nest("/admin", handlers::admin_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
