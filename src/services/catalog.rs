//! Media catalog: the reconciler between the media table and object storage.
//!
//! The table is authoritative for metadata, storage is authoritative for
//! existence. Reads merge both and never fail; writes span both and undo the
//! storage side when the table write fails.
//!
//! # Operations
//!
//! - [`MediaCatalog::list_media`]: merged listing, newest first
//! - [`MediaCatalog::upload_media`] / [`MediaCatalog::upload_multiple`]
//! - [`MediaCatalog::update_media`]: alt text and tags of a table row
//! - [`MediaCatalog::delete_media`] / [`MediaCatalog::delete_multiple`]
//! - metadata enrichment, bulk tags and AI generation
//! - [`MediaCatalog::backfill`]: explicit persistence of storage-only objects

use chrono::Utc;
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    normalize_tags, DateRange, MediaFilter, MediaMetadata, MediaRecord, MediaUpdate,
    MetadataUpdate, TagAction, UploadFile, UploadOptions,
};
use crate::services::cache::TtlCache;
use crate::services::database::{MediaTable, TableError};
use crate::services::image_processor::{derive_storage_path, ImageProcessor};
use crate::services::metadata::MetadataStore;
use crate::services::reconcile::{reconcile, ReconcileSummary, Reconciled};
use crate::services::saga::Saga;
use crate::services::storage::{ObjectStore, StorageError};

/// Result of an explicit backfill
#[derive(Debug, Default, Serialize)]
pub struct BackfillReport {
    /// Rows inserted for storage-only objects
    pub inserted: Vec<MediaRecord>,
    /// Paths that could not be persisted
    pub failed: Vec<String>,
}

/// Catalog-level counts
#[derive(Debug, Serialize)]
pub struct CatalogStats {
    pub table_rows: u64,
    pub storage_objects: usize,
    #[serde(flatten)]
    pub reconcile: ReconcileSummary,
    pub cached_records: usize,
    pub cached_metadata: usize,
}

/// Media library operations over a table, an object store and a metadata
/// backend
pub struct MediaCatalog {
    table: Arc<dyn MediaTable>,
    store: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    processor: ImageProcessor,
    folder: String,
    list_page_size: usize,
    records: TtlCache<MediaRecord>,
    metadata_cache: TtlCache<MediaMetadata>,
}

impl MediaCatalog {
    pub fn new(
        table: Arc<dyn MediaTable>,
        store: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        config: &Config,
    ) -> Self {
        let ttl = Duration::from_secs(config.catalog.cache_ttl_seconds);
        let max_entries = config.catalog.cache_max_entries;

        Self {
            table,
            store,
            metadata,
            processor: ImageProcessor::new(&config.upload),
            folder: config.storage.folder.trim_matches('/').to_string(),
            list_page_size: config.catalog.list_page_size,
            records: TtlCache::new(ttl, max_entries),
            metadata_cache: TtlCache::new(ttl, max_entries),
        }
    }

    /// Folder uploads are written to
    pub fn folder(&self) -> &str {
        &self.folder
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Merged listing of table rows and storage objects, newest table rows
    /// first, storage-only objects after them.
    ///
    /// Never fails: a table or storage error is logged and that side is
    /// treated as empty. The date range bounds table rows only and is applied
    /// after the merge, so an object owned by an out-of-range row is never
    /// reported as storage-only.
    pub async fn list_media(&self, filter: &MediaFilter) -> Vec<MediaRecord> {
        let range = filter.date_range();
        let rows = self.select_all_rows().await;
        let listing = match self.store.list(&self.folder, self.list_page_size).await {
            Ok(objects) => objects,
            Err(e) => {
                error!(folder = %self.folder, error = %e, "Failed to list storage folder");
                Vec::new()
            }
        };

        let entries = reconcile(rows, listing, &self.folder);
        let mut items: Vec<MediaRecord> = entries
            .into_iter()
            .filter(|entry| match entry {
                Reconciled::InTableOnly(record) | Reconciled::InBoth(record, _) => {
                    range.contains(record.created_at)
                }
                Reconciled::InStorageOnly { .. } => true,
            })
            .map(|entry| entry.into_record(|path| self.store.public_url(path)))
            .collect();

        if let Some(needle) = filter.search_term() {
            items.retain(|record| record.matches_search(&needle));
        }

        debug!(count = items.len(), "Listed media");
        items
    }

    async fn select_all_rows(&self) -> Vec<MediaRecord> {
        match self.table.select(&DateRange::default()).await {
            Ok(rows) => rows,
            Err(e) => {
                log_table_error("select", &e);
                Vec::new()
            }
        }
    }

    /// Record by id, from cache when fresh
    pub async fn get_media(&self, id: &str) -> Result<MediaRecord> {
        if let Some(record) = self.records.get(id) {
            return Ok(record);
        }

        let record = self
            .table
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Media not found: {}", id)))?;

        self.records.insert(id, record.clone());
        Ok(record)
    }

    // =========================================================================
    // Upload
    // =========================================================================

    /// Validate, store and register one file.
    ///
    /// Validation happens before any I/O. If the table insert fails after
    /// the object was written, the object is removed again and the table
    /// error is returned.
    pub async fn upload_media(
        &self,
        file: UploadFile,
        options: &UploadOptions,
    ) -> Result<MediaRecord> {
        self.processor.validate(&file.mime_type, file.size())?;

        let path = derive_storage_path(&self.folder, &file.name, &file.mime_type);

        self.store
            .upload(&path, file.data.clone(), &file.mime_type)
            .await
            .map_err(|e| storage_failure(&path, "upload", e))?;

        let mut saga = Saga::new("upload_media");
        let store = Arc::clone(&self.store);
        let written = path.clone();
        saga.record("storage_write", move || -> BoxFuture<'static, Result<()>> {
            Box::pin(async move {
                store.remove(&[written]).await?;
                Ok(())
            })
        });

        let url = self.store.public_url(&path);
        let dimensions = if file.mime_type.starts_with("image/") {
            ImageProcessor::measure_dimensions(&file.mime_type, &file.data)
        } else {
            None
        };

        let size = file.size();
        let mut record = MediaRecord::new(path.clone(), file.name, url, size, file.mime_type)
            .with_dimensions(dimensions);
        record.alt_text = options
            .alt_text
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        record.tags = normalize_tags(options.tags.iter().map(String::as_str));

        if let Err(e) = self.table.insert(&record).await {
            log_table_error("insert", &e);
            let report = saga.compensate().await;
            if !report.is_clean() {
                warn!(path = %path, "Orphaned object left in storage after failed insert");
            }
            return Err(e.into());
        }
        saga.commit();

        info!(
            id = %record.id,
            path = %record.filename,
            size = record.size,
            mime_type = %record.mime_type,
            "Media uploaded"
        );

        self.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    /// Upload files one after another; failures are logged and skipped
    pub async fn upload_multiple(
        &self,
        files: Vec<UploadFile>,
        options: &UploadOptions,
    ) -> Vec<MediaRecord> {
        let requested = files.len();
        let mut uploaded = Vec::with_capacity(requested);

        for file in files {
            let name = file.name.clone();
            match self.upload_media(file, options).await {
                Ok(record) => uploaded.push(record),
                Err(e) => warn!(file = %name, error = %e, "Upload failed, skipping file"),
            }
        }

        info!(requested, uploaded = uploaded.len(), "Batch upload finished");
        uploaded
    }

    // =========================================================================
    // Record updates
    // =========================================================================

    /// Change the alt text or tags of a table row
    pub async fn update_media(&self, id: &str, update: &MediaUpdate) -> Result<MediaRecord> {
        if update.is_empty() {
            return Err(AppError::validation("No media fields provided"));
        }

        let mut record = self
            .table
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Media not found: {}", id)))?;

        if let Some(alt_text) = &update.alt_text {
            let alt_text = alt_text.trim();
            record.alt_text = (!alt_text.is_empty()).then(|| alt_text.to_string());
        }
        if let Some(tags) = &update.tags {
            record.tags = normalize_tags(tags.iter().map(String::as_str));
        }
        record.updated_at = Utc::now();

        if let Err(e) = self.table.update(&record).await {
            log_table_error("update", &e);
            self.records.invalidate(id);
            return Err(e.into());
        }
        self.records.insert(id, record.clone());

        debug!(id = %id, "Media record updated");
        Ok(record)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete a record and everything attached to it.
    ///
    /// Ids unknown to the table that look like a storage path are resolved
    /// through the path index first; a path no row owns is removed from
    /// storage directly, which is how storage-only entries go away.
    ///
    /// Steps run in order (object, row, metadata) and the first failure
    /// aborts the rest.
    pub async fn delete_media(&self, id: &str) -> Result<()> {
        let record = match self.table.get(id).await? {
            Some(record) => record,
            None if id.contains('/') => match self.table.get_by_path(id).await? {
                Some(record) => {
                    debug!(path = %id, id = %record.id, "Path is owned by a table row");
                    record
                }
                None => return self.delete_storage_only(id).await,
            },
            None => return Err(AppError::not_found(format!("Media not found: {}", id))),
        };

        self.store
            .remove(std::slice::from_ref(&record.filename))
            .await
            .map_err(|e| storage_failure(&record.filename, "delete", e))?;

        if !self.table.delete(&record.id).await? {
            warn!(id = %record.id, "Row disappeared before delete");
        }
        self.records.invalidate(&record.id);

        self.metadata.delete(&record.id).await?;
        self.metadata_cache.invalidate(&record.id);

        info!(id = %record.id, path = %record.filename, "Media deleted");
        Ok(())
    }

    async fn delete_storage_only(&self, path: &str) -> Result<()> {
        let removed = self
            .store
            .remove(&[path.to_string()])
            .await
            .map_err(|e| storage_failure(path, "delete", e))?;

        if removed.is_empty() {
            return Err(AppError::not_found(format!("Media not found: {}", path)));
        }

        // AI generation may have stored metadata under the path
        self.metadata.delete(path).await?;
        self.metadata_cache.invalidate(path);
        self.records.invalidate(path);

        info!(path = %path, "Storage-only object deleted");
        Ok(())
    }

    /// Delete ids one after another; returns how many succeeded
    pub async fn delete_multiple(&self, ids: &[String]) -> usize {
        let mut deleted = 0;

        for id in ids {
            match self.delete_media(id).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(id = %id, error = %e, "Delete failed, skipping"),
            }
        }

        info!(requested = ids.len(), deleted, "Batch delete finished");
        deleted
    }

    // =========================================================================
    // Extended metadata
    // =========================================================================

    pub async fn get_metadata(&self, media_id: &str) -> Result<Option<MediaMetadata>> {
        if let Some(metadata) = self.metadata_cache.get(media_id) {
            return Ok(Some(metadata));
        }

        let metadata = self.metadata.get(media_id).await?;
        if let Some(m) = &metadata {
            self.metadata_cache.insert(media_id, m.clone());
        }
        Ok(metadata)
    }

    /// Metadata for several records; records without metadata are omitted
    pub async fn get_metadata_many(&self, media_ids: &[String]) -> Result<Vec<MediaMetadata>> {
        let mut found = Vec::with_capacity(media_ids.len());
        for id in media_ids {
            if let Some(metadata) = self.get_metadata(id).await? {
                found.push(metadata);
            }
        }
        Ok(found)
    }

    pub async fn update_metadata(
        &self,
        media_id: &str,
        update: &MetadataUpdate,
    ) -> Result<MediaMetadata> {
        validate_update(update)?;

        let metadata = self.metadata.update(media_id, update).await?;
        self.metadata_cache.insert(media_id, metadata.clone());

        debug!(media_id = %media_id, "Metadata updated");
        Ok(metadata)
    }

    /// Apply one patch to many records; returns how many were written
    pub async fn bulk_update_metadata(
        &self,
        media_ids: &[String],
        update: &MetadataUpdate,
    ) -> Result<usize> {
        validate_update(update)?;

        let updated = self.metadata.bulk_update(media_ids, update).await?;
        for id in media_ids {
            self.metadata_cache.invalidate(id);
        }

        info!(requested = media_ids.len(), updated, "Bulk metadata update finished");
        Ok(updated)
    }

    pub async fn delete_metadata(&self, media_id: &str) -> Result<bool> {
        let deleted = self.metadata.delete(media_id).await?;
        self.metadata_cache.invalidate(media_id);
        Ok(deleted)
    }

    pub async fn bulk_add_tags(&self, media_ids: &[String], tags: &[String]) -> Result<usize> {
        self.bulk_tags(media_ids, tags, TagAction::Add).await
    }

    pub async fn bulk_remove_tags(&self, media_ids: &[String], tags: &[String]) -> Result<usize> {
        self.bulk_tags(media_ids, tags, TagAction::Remove).await
    }

    /// Read-modify-write of each record's tags; per-item failures are
    /// logged and not counted
    pub async fn bulk_tags(
        &self,
        media_ids: &[String],
        tags: &[String],
        action: TagAction,
    ) -> Result<usize> {
        if normalize_tags(tags.iter().map(String::as_str)).is_empty() {
            return Err(AppError::validation("At least one tag is required"));
        }

        let mut updated = 0;
        for id in media_ids {
            match self.retag(id, tags, action).await {
                Ok(()) => updated += 1,
                Err(e) => warn!(media_id = %id, action = ?action, error = %e, "Tag update failed"),
            }
        }

        info!(
            requested = media_ids.len(),
            updated,
            action = ?action,
            "Bulk tag update finished"
        );
        Ok(updated)
    }

    async fn retag(&self, media_id: &str, tags: &[String], action: TagAction) -> Result<()> {
        let current = self
            .metadata
            .get(media_id)
            .await?
            .map(|m| m.tags)
            .unwrap_or_default();

        let next = action.apply(&current, tags);
        let metadata = self
            .metadata
            .update(media_id, &MetadataUpdate::tags(next))
            .await?;
        self.metadata_cache.insert(media_id, metadata);
        Ok(())
    }

    /// Ask the AI tagger for alt text and tags and store the result.
    ///
    /// Without an explicit URL the record's public URL is used; storage-only
    /// ids resolve to the URL of their path.
    pub async fn generate_ai_metadata(
        &self,
        media_id: &str,
        image_url: Option<String>,
    ) -> Result<MediaMetadata> {
        let image_url = match image_url.filter(|u| !u.trim().is_empty()) {
            Some(url) => url,
            None => match self.get_media(media_id).await {
                Ok(record) => record.url,
                Err(AppError::NotFound(_)) if media_id.contains('/') => {
                    self.store.public_url(media_id)
                }
                Err(e) => return Err(e),
            },
        };

        let metadata = self.metadata.generate_ai(media_id, &image_url).await?;
        self.metadata_cache.insert(media_id, metadata.clone());

        info!(
            media_id = %media_id,
            tags = metadata.ai_tags.len(),
            "AI metadata generated"
        );
        Ok(metadata)
    }

    /// Table records without usable SEO metadata
    pub async fn media_needing_seo(&self) -> Result<Vec<MediaRecord>> {
        let rows = self.table.select(&DateRange::default()).await?;
        let mut pending = Vec::new();

        for record in rows {
            let needs = match self.get_metadata(&record.id).await? {
                Some(metadata) => metadata.needs_seo(),
                None => true,
            };
            if needs {
                pending.push(record);
            }
        }

        Ok(pending)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Persist table rows for storage-only objects.
    ///
    /// An empty `paths` backfills every storage-only object in the folder.
    pub async fn backfill(&self, paths: &[String]) -> Result<BackfillReport> {
        let rows = self.table.select(&DateRange::default()).await?;
        let listing = self
            .store
            .list(&self.folder, usize::MAX)
            .await
            .map_err(|e| storage_failure(&self.folder, "list", e))?;

        let wanted: HashSet<&str> = paths.iter().map(String::as_str).collect();
        let mut report = BackfillReport::default();

        for entry in reconcile(rows, listing, &self.folder) {
            let Reconciled::InStorageOnly { path, object } = entry else {
                continue;
            };
            if !wanted.is_empty() && !wanted.contains(path.as_str()) {
                continue;
            }

            let data = match self.store.download(&path).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(path = %path, error = %e, "Backfill could not read object");
                    report.failed.push(path);
                    continue;
                }
            };

            let mime_type =
                ImageProcessor::resolve_mime_type(object.mime_type.as_deref(), &object.name, &data);
            let mut record = MediaRecord::new(
                path.clone(),
                object.name.clone(),
                self.store.public_url(&path),
                data.len() as u64,
                mime_type.clone(),
            )
            .with_dimensions(ImageProcessor::measure_dimensions(&mime_type, &data));
            if let Some(created_at) = object.created_at {
                record.created_at = created_at;
            }

            match self.table.insert(&record).await {
                Ok(()) => {
                    debug!(id = %record.id, path = %path, "Backfilled object");
                    report.inserted.push(record);
                }
                Err(e) => {
                    log_table_error("insert", &e);
                    report.failed.push(path);
                }
            }
        }

        info!(
            inserted = report.inserted.len(),
            failed = report.failed.len(),
            "Backfill finished"
        );
        Ok(report)
    }

    pub async fn stats(&self) -> Result<CatalogStats> {
        let table_rows = self.table.count().await?;
        let rows = self.table.select(&DateRange::default()).await?;
        let listing = self
            .store
            .list(&self.folder, usize::MAX)
            .await
            .map_err(|e| storage_failure(&self.folder, "list", e))?;
        let storage_objects = listing.len();

        let entries = reconcile(rows, listing, &self.folder);

        Ok(CatalogStats {
            table_rows,
            storage_objects,
            reconcile: ReconcileSummary::from_entries(&entries),
            cached_records: self.records.len(),
            cached_metadata: self.metadata_cache.len(),
        })
    }

    pub fn purge_caches(&self) {
        self.records.clear();
        self.metadata_cache.clear();
        info!("Catalog caches purged");
    }
}

impl std::fmt::Debug for MediaCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaCatalog")
            .field("folder", &self.folder)
            .field("list_page_size", &self.list_page_size)
            .finish()
    }
}

fn validate_update(update: &MetadataUpdate) -> Result<()> {
    if update.is_empty() {
        return Err(AppError::validation("No metadata fields provided"));
    }
    if let Some(point) = &update.focal_point {
        if !point.is_valid() {
            return Err(AppError::validation(
                "Focal point coordinates must be between 0 and 1",
            ));
        }
    }
    Ok(())
}

fn log_table_error(operation: &str, e: &TableError) {
    error!(
        operation = operation,
        error = %e.message,
        code = ?e.code,
        hint = ?e.hint,
        "Media table operation failed"
    );
}

/// Log the provider error and map it to what the caller should see
fn storage_failure(path: &str, action: &str, e: StorageError) -> AppError {
    error!(path = %path, action = action, error = %e, "Storage operation failed");
    match e {
        StorageError::AlreadyExists(_) | StorageError::InvalidPath(_) | StorageError::NotFound(_) => {
            e.into()
        }
        _ => AppError::storage(format!("Failed to {} file", action)),
    }
}
