//! Admin API handlers (local only).
//!
//! ## Endpoints
//!
//! - `GET /admin/stats` - table, storage and reconciliation counts
//! - `POST /admin/backfill` - persist rows for storage-only objects
//! - `POST /admin/cache/purge` - drop cached records and metadata
//!
//! ## Security
//!
//! The admin API is bound to 127.0.0.1 only and should never be
//! exposed to the public internet.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::services::catalog::{BackfillReport, CatalogStats};
use crate::services::storage::StorageStats;
use crate::state::AppState;

/// Admin stats response
#[derive(Debug, Serialize)]
pub struct AdminStatsResponse {
    pub catalog: CatalogStats,
    pub storage: StorageStats,
}

/// Get catalog and storage statistics
///
/// GET /admin/stats
async fn get_stats(State(state): State<AppState>) -> Result<Json<AdminStatsResponse>> {
    let catalog = state.catalog.stats().await?;
    let storage = state.storage.stats().await?;

    Ok(Json(AdminStatsResponse { catalog, storage }))
}

/// Backfill request; no paths means every storage-only object
#[derive(Debug, Default, Deserialize)]
pub struct BackfillRequest {
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Persist table rows for objects that only exist in storage
///
/// POST /admin/backfill
async fn backfill(
    State(state): State<AppState>,
    request: Option<Json<BackfillRequest>>,
) -> Result<Json<BackfillReport>> {
    let Json(request) = request.unwrap_or_default();
    let report = state.catalog.backfill(&request.paths).await?;

    info!(
        inserted = report.inserted.len(),
        failed = report.failed.len(),
        "Admin backfill completed"
    );

    Ok(Json(report))
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub success: bool,
}

/// Drop cached records and metadata
///
/// POST /admin/cache/purge
async fn purge_caches(State(state): State<AppState>) -> Json<PurgeResponse> {
    state.catalog.purge_caches();
    Json(PurgeResponse { success: true })
}

/// Create admin routes
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/backfill", post(backfill))
        .route("/cache/purge", post(purge_caches))
}
