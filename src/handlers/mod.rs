//! HTTP request handlers for the media catalog server.
//!
//! - `media`: listing, upload, delete and bulk tag endpoints
//! - `metadata`: extended metadata and AI generation
//! - `serve`: public object URLs
//! - `admin`: stats, backfill and cache purge (local only)
//! - `health`: liveness and readiness probes

pub mod admin;
pub mod health;
pub mod media;
pub mod metadata;
pub mod serve;

pub use admin::admin_routes;
pub use health::health_routes;
pub use media::media_routes;
pub use metadata::metadata_routes;
pub use serve::serve_routes;
