//! Public object serving.
//!
//! Public URLs handed out by the catalog resolve here.
//!
//! ## Endpoints
//!
//! - `GET /storage/{*path}` - stream an object from the bucket
//!
//! ## Caching
//!
//! Object paths carry an upload timestamp and are never overwritten, so
//! responses are `Cache-Control: public, max-age={from config}, immutable`.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Serve a stored object
///
/// GET /storage/{*path}
async fn serve_object(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response> {
    let file_path = state.storage.object_path(&path)?;

    let file = match File::open(&file_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::not_found(format!("Object not found: {}", path)));
        }
        Err(e) => return Err(e.into()),
    };

    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(AppError::not_found(format!("Object not found: {}", path)));
    }

    let content_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .to_string();
    let cache_control = format!("public, max-age={}, immutable", state.cache_max_age());

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, metadata.len())
        .header(header::CACHE_CONTROL, cache_control)
        .header("X-Content-Type-Options", "nosniff")
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::internal(format!("Failed to build response: {}", e)))?;

    debug!(path = %path, size = metadata.len(), "Served object");

    Ok(response)
}

/// Create serve routes
pub fn serve_routes() -> Router<AppState> {
    Router::new().route("/{*path}", get(serve_object))
}
