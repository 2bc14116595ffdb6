//! Extended metadata backends.
//!
//! [`LocalMetadataStore`] keeps metadata in the RocksDB `media_metadata`
//! column family. [`HttpMetadataClient`] talks to a sibling instance's
//! `/api/media/metadata` endpoints instead.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::MetadataConfig;
use crate::error::{AppError, Result};
use crate::models::{
    AiGenerateRequest, BulkMetadataRequest, BulkUpdateResponse, MediaMetadata,
    MetadataDeleteResponse, MetadataUpdate, PatchMetadataRequest,
};
use crate::services::ai_tagger::AiTagger;
use crate::services::database::DatabaseService;

/// Where extended metadata lives
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, media_id: &str) -> Result<Option<MediaMetadata>>;

    /// Apply a partial update, creating the entry if absent
    async fn update(&self, media_id: &str, update: &MetadataUpdate) -> Result<MediaMetadata>;

    /// Apply the same update to many records; returns how many were written
    async fn bulk_update(&self, media_ids: &[String], update: &MetadataUpdate) -> Result<usize> {
        let mut updated = 0;
        for id in media_ids {
            match self.update(id, update).await {
                Ok(_) => updated += 1,
                Err(e) => warn!(media_id = %id, error = %e, "Bulk metadata update failed"),
            }
        }
        Ok(updated)
    }

    async fn delete(&self, media_id: &str) -> Result<bool>;

    /// Run the AI tagger and store its suggestion
    async fn generate_ai(&self, media_id: &str, image_url: &str) -> Result<MediaMetadata>;
}

// =============================================================================
// Local (RocksDB)
// =============================================================================

/// Metadata in the local database
pub struct LocalMetadataStore {
    db: Arc<DatabaseService>,
    tagger: Option<AiTagger>,
}

impl LocalMetadataStore {
    pub fn new(db: Arc<DatabaseService>, tagger: Option<AiTagger>) -> Self {
        Self { db, tagger }
    }
}

#[async_trait]
impl MetadataStore for LocalMetadataStore {
    async fn get(&self, media_id: &str) -> Result<Option<MediaMetadata>> {
        Ok(self.db.get_metadata(media_id)?)
    }

    async fn update(&self, media_id: &str, update: &MetadataUpdate) -> Result<MediaMetadata> {
        let mut metadata = self
            .db
            .get_metadata(media_id)?
            .unwrap_or_else(|| MediaMetadata::new(media_id));
        metadata.apply(update);
        self.db.put_metadata(&metadata)?;

        debug!(media_id = %media_id, "Metadata updated");
        Ok(metadata)
    }

    async fn delete(&self, media_id: &str) -> Result<bool> {
        Ok(self.db.delete_metadata(media_id)?)
    }

    async fn generate_ai(&self, media_id: &str, image_url: &str) -> Result<MediaMetadata> {
        let tagger = self
            .tagger
            .as_ref()
            .ok_or_else(|| AppError::config("AI tagging endpoint is not configured"))?;

        let suggestion = tagger.generate(media_id, image_url).await?;

        let mut metadata = self
            .db
            .get_metadata(media_id)?
            .unwrap_or_else(|| MediaMetadata::new(media_id));
        metadata.apply_ai(&suggestion);
        self.db.put_metadata(&metadata)?;

        Ok(metadata)
    }
}

impl std::fmt::Debug for LocalMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMetadataStore")
            .field("ai_enabled", &self.tagger.is_some())
            .finish()
    }
}

// =============================================================================
// Remote (HTTP)
// =============================================================================

/// Metadata held by another instance, reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpMetadataClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMetadataClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Build a client when an endpoint is configured
    pub fn from_config(config: &MetadataConfig) -> Result<Option<Self>> {
        match &config.endpoint {
            Some(endpoint) => Ok(Some(Self::new(
                endpoint.clone(),
                Duration::from_secs(config.timeout_seconds),
            )?)),
            None => Ok(None),
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/api/media/metadata{}", self.base_url, suffix)
    }

    async fn check(response: reqwest::Response, operation: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            operation = operation,
            status = %status,
            body = %body,
            "Metadata endpoint returned an error"
        );
        Err(AppError::metadata_api(format!(
            "Metadata {} failed with status {}",
            operation, status
        )))
    }
}

#[async_trait]
impl MetadataStore for HttpMetadataClient {
    async fn get(&self, media_id: &str) -> Result<Option<MediaMetadata>> {
        let response = self
            .client
            .get(self.url(""))
            .query(&[("media_id", media_id)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::check(response, "get").await?;
        Ok(Some(response.json().await?))
    }

    async fn update(&self, media_id: &str, update: &MetadataUpdate) -> Result<MediaMetadata> {
        let response = self
            .client
            .patch(self.url(""))
            .json(&PatchMetadataRequest {
                media_id: media_id.to_string(),
                update: update.clone(),
            })
            .send()
            .await?;

        let response = Self::check(response, "update").await?;
        Ok(response.json().await?)
    }

    async fn bulk_update(&self, media_ids: &[String], update: &MetadataUpdate) -> Result<usize> {
        let response = self
            .client
            .put(self.url(""))
            .json(&BulkMetadataRequest {
                media_ids: media_ids.to_vec(),
                update: update.clone(),
            })
            .send()
            .await?;

        let response = Self::check(response, "bulk update").await?;
        let body: BulkUpdateResponse = response.json().await?;
        Ok(body.updated)
    }

    async fn delete(&self, media_id: &str) -> Result<bool> {
        let response = self
            .client
            .delete(self.url(""))
            .query(&[("media_id", media_id)])
            .send()
            .await?;

        let response = Self::check(response, "delete").await?;
        let body: MetadataDeleteResponse = response.json().await?;
        Ok(body.deleted)
    }

    async fn generate_ai(&self, media_id: &str, image_url: &str) -> Result<MediaMetadata> {
        let response = self
            .client
            .post(self.url("/ai"))
            .json(&AiGenerateRequest {
                media_id: media_id.to_string(),
                image_url: Some(image_url.to_string()),
            })
            .send()
            .await?;

        let response = Self::check(response, "AI generation").await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use tempfile::TempDir;

    fn create_store() -> (LocalMetadataStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let config = StorageConfig {
            data_dir: temp.path().to_path_buf(),
            bucket: "media".to_string(),
            folder: "uploads".to_string(),
        };
        let db = DatabaseService::new(&config).unwrap();
        (LocalMetadataStore::new(Arc::new(db), None), temp)
    }

    #[tokio::test]
    async fn test_update_creates_then_merges() {
        let (store, _temp) = create_store();

        let first = store
            .update(
                "m1",
                &MetadataUpdate {
                    title: Some("Hero".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(first.title.as_deref(), Some("Hero"));

        let second = store
            .update(
                "m1",
                &MetadataUpdate {
                    caption: Some("Caption".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(second.title.as_deref(), Some("Hero"));
        assert_eq!(second.caption.as_deref(), Some("Caption"));
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_bulk_update_and_delete() {
        let (store, _temp) = create_store();
        let ids = vec!["a".to_string(), "b".to_string()];

        let updated = store
            .bulk_update(&ids, &MetadataUpdate::tags(vec!["x".to_string()]))
            .await
            .unwrap();
        assert_eq!(updated, 2);
        assert_eq!(store.get("b").await.unwrap().unwrap().tags, vec!["x"]);

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ai_without_tagger_is_config_error() {
        let (store, _temp) = create_store();
        let err = store
            .generate_ai("m1", "http://x/storage/uploads/a.png")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
