//! Extended metadata endpoints.
//!
//! These are also what `HttpMetadataClient` calls when another instance is
//! configured as the metadata endpoint.
//!
//! ## Endpoints
//!
//! - `GET /api/media/metadata?media_id=` or `?media_ids=a,b`
//! - `PATCH /api/media/metadata` - `{media_id, ...fields}`
//! - `PUT /api/media/metadata` - `{media_ids, ...fields}`
//! - `DELETE /api/media/metadata?media_id=`
//! - `POST /api/media/metadata/ai` - `{media_id, image_url?}`

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::error::{AppError, Result};
use crate::models::{
    AiGenerateRequest, BulkMetadataRequest, BulkUpdateResponse, MediaMetadata,
    MetadataDeleteResponse, MetadataQuery, PatchMetadataRequest,
};
use crate::state::AppState;

/// GET /api/media/metadata
///
/// `media_ids` returns the list of entries that exist; `media_id` returns
/// one entry or 404.
async fn get_metadata(
    State(state): State<AppState>,
    Query(query): Query<MetadataQuery>,
) -> Result<Response> {
    let ids = query.ids();
    if !ids.is_empty() {
        let entries = state.catalog.get_metadata_many(&ids).await?;
        return Ok(Json(entries).into_response());
    }

    let id = required_id(query.media_id.as_deref())?;
    let metadata = state
        .catalog
        .get_metadata(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("No metadata for media: {}", id)))?;

    Ok(Json(metadata).into_response())
}

/// PATCH /api/media/metadata
async fn patch_metadata(
    State(state): State<AppState>,
    Json(request): Json<PatchMetadataRequest>,
) -> Result<Json<MediaMetadata>> {
    let id = required_id(Some(request.media_id.as_str()))?;
    Ok(Json(state.catalog.update_metadata(id, &request.update).await?))
}

/// PUT /api/media/metadata
async fn bulk_update_metadata(
    State(state): State<AppState>,
    Json(request): Json<BulkMetadataRequest>,
) -> Result<Json<BulkUpdateResponse>> {
    if request.media_ids.is_empty() {
        return Err(AppError::validation("media_ids must not be empty"));
    }

    let updated = state
        .catalog
        .bulk_update_metadata(&request.media_ids, &request.update)
        .await?;

    Ok(Json(BulkUpdateResponse {
        updated,
        requested: request.media_ids.len(),
    }))
}

/// DELETE /api/media/metadata
async fn delete_metadata(
    State(state): State<AppState>,
    Query(query): Query<MetadataQuery>,
) -> Result<Json<MetadataDeleteResponse>> {
    let id = required_id(query.media_id.as_deref())?;
    let deleted = state.catalog.delete_metadata(id).await?;

    Ok(Json(MetadataDeleteResponse {
        media_id: id.to_string(),
        deleted,
    }))
}

/// POST /api/media/metadata/ai
async fn generate_ai_metadata(
    State(state): State<AppState>,
    Json(request): Json<AiGenerateRequest>,
) -> Result<Json<MediaMetadata>> {
    let id = required_id(Some(request.media_id.as_str()))?;
    let metadata = state
        .catalog
        .generate_ai_metadata(id, request.image_url.clone())
        .await?;

    Ok(Json(metadata))
}

fn required_id(id: Option<&str>) -> Result<&str> {
    id.map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::validation("media_id is required"))
}

/// Metadata routes, merged into the media router
pub fn metadata_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/metadata",
            get(get_metadata)
                .patch(patch_metadata)
                .put(bulk_update_metadata)
                .delete(delete_metadata),
        )
        .route("/metadata/ai", post(generate_ai_metadata))
}
