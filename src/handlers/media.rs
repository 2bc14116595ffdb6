//! Media library handlers for the admin console.
//!
//! ## Endpoints
//!
//! - `GET /api/media?search=&from=&to=` - merged listing of table and storage
//! - `POST /api/media` - multipart upload (`file` one or more times,
//!   optional `alt_text` and `tags`)
//! - `GET /api/media/items/{*id}` - one record
//! - `PATCH /api/media/items/{*id}` - change alt text or tags
//! - `DELETE /api/media/items/{*id}` - delete by id or storage path
//! - `POST /api/media/bulk-delete` - delete many
//! - `POST /api/media/tags` - add or remove tags on many records
//! - `GET /api/media/needs-seo` - records still missing SEO metadata
//!
//! # Example
//!
//! ```bash
//! curl -X POST http://localhost:3000/api/media \
//!   -F "file=@hero.jpg" -F "alt_text=Red running shoe" -F "tags=shoes,red"
//! ```

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::{
    BulkDeleteRequest, BulkDeleteResponse, BulkTagRequest, BulkUpdateResponse, DeleteResponse,
    MediaFilter, MediaListResponse, MediaRecord, MediaUpdate, UploadBatchResponse, UploadFile,
    UploadOptions,
};
use crate::services::image_processor::ImageProcessor;
use crate::state::AppState;

use super::metadata::metadata_routes;

/// List media
///
/// GET /api/media
///
/// Never fails: an unreachable table or bucket yields whatever the other
/// side returned.
async fn list_media(
    State(state): State<AppState>,
    Query(filter): Query<MediaFilter>,
) -> Json<MediaListResponse> {
    let items = state.catalog.list_media(&filter).await;
    Json(MediaListResponse::new(items))
}

/// Upload one or more files
///
/// POST /api/media
///
/// A single file returns the created record and propagates its validation
/// error. Several files return the records that made it; failed files are
/// skipped.
async fn upload_media(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let (files, options) = read_upload_form(multipart).await?;

    match <[UploadFile; 1]>::try_from(files) {
        Ok([file]) => {
            let record = state.catalog.upload_media(file, &options).await?;
            Ok((StatusCode::CREATED, Json(record)).into_response())
        }
        Err(files) if files.is_empty() => Err(AppError::validation("No file provided")),
        Err(files) => {
            let requested = files.len();
            let items = state.catalog.upload_multiple(files, &options).await;
            info!(requested, uploaded = items.len(), "Multi-file upload handled");
            Ok((
                StatusCode::CREATED,
                Json(UploadBatchResponse { items, requested }),
            )
                .into_response())
        }
    }
}

/// Collect files and options from the multipart body
async fn read_upload_form(mut multipart: Multipart) -> Result<(Vec<UploadFile>, UploadOptions)> {
    let mut files = Vec::new();
    let mut options = UploadOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Invalid multipart data: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" | "files" | "files[]" => {
                let filename = field.file_name().unwrap_or("file").to_string();
                let declared = field.content_type().map(str::to_string);
                let data: Bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(format!("Failed to read file: {}", e)))?;

                let mime_type =
                    ImageProcessor::resolve_mime_type(declared.as_deref(), &filename, &data);

                debug!(
                    filename = %filename,
                    declared = ?declared,
                    mime_type = %mime_type,
                    size = data.len(),
                    "Received file"
                );

                files.push(UploadFile::new(filename, mime_type, data));
            }
            "alt_text" => {
                let text = read_text(field).await?;
                options.alt_text = Some(text).filter(|t| !t.trim().is_empty());
            }
            "tags" => {
                let text = read_text(field).await?;
                options.tags.extend(parse_tags(&text));
            }
            _ => {}
        }
    }

    Ok((files, options))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::validation(format!("Invalid form field: {}", e)))
}

/// Tags arrive as a JSON array or a comma-separated list
fn parse_tags(raw: &str) -> Vec<String> {
    if let Ok(tags) = serde_json::from_str::<Vec<String>>(raw) {
        return tags;
    }

    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Get one record
///
/// GET /api/media/items/{*id}
async fn get_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MediaRecord>> {
    Ok(Json(state.catalog.get_media(&id).await?))
}

/// Change the alt text or tags of a record
///
/// PATCH /api/media/items/{*id}
async fn update_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<MediaUpdate>,
) -> Result<Json<MediaRecord>> {
    Ok(Json(state.catalog.update_media(&id, &update).await?))
}

/// Delete one record, or a storage-only object by its path
///
/// DELETE /api/media/items/{*id}
async fn delete_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.catalog.delete_media(&id).await?;

    Ok(Json(DeleteResponse { success: true, id }))
}

/// Delete many records
///
/// POST /api/media/bulk-delete
async fn bulk_delete(
    State(state): State<AppState>,
    Json(request): Json<BulkDeleteRequest>,
) -> Json<BulkDeleteResponse> {
    let deleted = state.catalog.delete_multiple(&request.ids).await;

    Json(BulkDeleteResponse {
        deleted,
        requested: request.ids.len(),
    })
}

/// Add or remove tags on many records
///
/// POST /api/media/tags
async fn bulk_tags(
    State(state): State<AppState>,
    Json(request): Json<BulkTagRequest>,
) -> Result<Json<BulkUpdateResponse>> {
    let updated = state
        .catalog
        .bulk_tags(&request.media_ids, &request.tags, request.action)
        .await?;

    Ok(Json(BulkUpdateResponse {
        updated,
        requested: request.media_ids.len(),
    }))
}

/// Table records without SEO metadata
///
/// GET /api/media/needs-seo
async fn needs_seo(State(state): State<AppState>) -> Result<Json<MediaListResponse>> {
    let items = state.catalog.media_needing_seo().await?;
    Ok(Json(MediaListResponse::new(items)))
}

/// Create media routes, including the metadata endpoints
pub fn media_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_media).post(upload_media))
        .route(
            "/items/{*id}",
            get(get_media).patch(update_media).delete(delete_media),
        )
        .route("/bulk-delete", post(bulk_delete))
        .route("/tags", post(bulk_tags))
        .route("/needs-seo", get(needs_seo))
        .merge(metadata_routes())
}
