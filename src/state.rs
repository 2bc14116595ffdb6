//! Application state management.
//!
//! Shared resources handed to every request handler through Axum's `State`
//! extractor.
//!
//! # Usage
//!
//! ```rust,ignore
//! async fn handler(State(state): State<AppState>) -> impl IntoResponse {
//!     let items = state.catalog.list_media(&filter).await;
//!     // ...
//! }
//! ```

use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::services::{
    AiTagger, DatabaseService, HttpMetadataClient, LocalMetadataStore, LocalObjectStore,
    MediaCatalog, MetadataStore,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    /// RocksDB handle, also used for readiness checks
    pub db: Arc<DatabaseService>,

    /// Filesystem object store, also used to serve public URLs
    pub storage: Arc<LocalObjectStore>,

    pub catalog: Arc<MediaCatalog>,
}

impl AppState {
    /// Open the database and bucket and wire the catalog.
    ///
    /// Extended metadata goes to `metadata.endpoint` when configured,
    /// otherwise to the local database.
    ///
    /// # Errors
    /// Returns error if the database or bucket cannot be opened, or an HTTP
    /// client cannot be built
    pub async fn new(config: Config) -> Result<Self> {
        let db = Arc::new(DatabaseService::new(&config.storage)?);
        let storage = Arc::new(
            LocalObjectStore::new(&config.storage, &config.server.base_url)
                .await
                .map_err(|e| AppError::config(format!("Failed to open bucket: {}", e)))?,
        );

        let metadata: Arc<dyn MetadataStore> =
            match HttpMetadataClient::from_config(&config.metadata)? {
                Some(client) => {
                    info!(endpoint = ?config.metadata.endpoint, "Using remote metadata endpoint");
                    Arc::new(client)
                }
                None => {
                    let tagger = AiTagger::from_config(&config.ai)?;
                    if tagger.is_some() {
                        info!(endpoint = ?config.ai.endpoint, "AI tagging enabled");
                    }
                    Arc::new(LocalMetadataStore::new(Arc::clone(&db), tagger))
                }
            };

        let catalog = MediaCatalog::new(db.clone(), storage.clone(), metadata, &config);

        Ok(Self {
            config: Arc::new(config),
            db,
            storage,
            catalog: Arc::new(catalog),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.server.base_url
    }

    /// Cache-Control max-age for served objects
    pub fn cache_max_age(&self) -> u64 {
        self.config.server.cache_max_age
    }

    /// Largest request body the public router accepts
    pub fn body_limit(&self) -> usize {
        // Multipart framing and the non-file fields ride on top of the files
        (self.config.upload.max_file_size as usize).saturating_mul(10) + 64 * 1024
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"<Config>")
            .field("db", &self.db)
            .field("storage", &self.storage)
            .field("catalog", &self.catalog)
            .finish()
    }
}
