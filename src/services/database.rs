//! Metadata table backed by RocksDB.
//!
//! RocksDB provides crash safety through its write-ahead log; every
//! multi-key mutation below goes through a single `WriteBatch`.
//!
//! # Data Organization
//!
//! Uses column families to separate data types:
//! - `media`: media rows (key: record id)
//! - `media_path_index`: storage path → record id (enforces unique paths)
//! - `media_metadata`: extended metadata (key: record id)
//!
//! The catalog only sees the [`MediaTable`] trait; the extended metadata
//! column family is exposed through `services::metadata::LocalMetadataStore`.

use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options, WriteBatch};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::models::{DateRange, MediaMetadata, MediaRecord, RecordSource};

type DB = DBWithThreadMode<MultiThreaded>;

/// Column family names
const CF_MEDIA: &str = "media";
const CF_PATH_INDEX: &str = "media_path_index";
const CF_METADATA: &str = "media_metadata";

/// Failure reported by the metadata table, with provider detail
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TableError {
    pub message: String,
    pub code: Option<String>,
    pub hint: Option<String>,
}

impl TableError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            hint: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<rocksdb::Error> for TableError {
    fn from(err: rocksdb::Error) -> Self {
        Self::new(err.to_string()).with_code(format!("{:?}", err.kind()))
    }
}

impl From<serde_json::Error> for TableError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("Corrupt row: {}", err)).with_code("serialization")
    }
}

/// Result type for table operations
pub type TableResult<T> = std::result::Result<T, TableError>;

/// Row store for media records
#[async_trait]
pub trait MediaTable: Send + Sync {
    /// All rows created inside `range`, newest first
    async fn select(&self, range: &DateRange) -> TableResult<Vec<MediaRecord>>;

    async fn get(&self, id: &str) -> TableResult<Option<MediaRecord>>;

    /// Row that owns a storage path, whatever its creation date
    async fn get_by_path(&self, path: &str) -> TableResult<Option<MediaRecord>>;

    /// Insert a new row; the storage path must not already be taken
    async fn insert(&self, record: &MediaRecord) -> TableResult<()>;

    /// Replace an existing row
    async fn update(&self, record: &MediaRecord) -> TableResult<()>;

    /// Delete a row, returns whether it existed
    async fn delete(&self, id: &str) -> TableResult<bool>;

    async fn count(&self) -> TableResult<u64>;
}

/// Database service for media rows and extended metadata
///
/// Uses RocksDB for high performance and crash safety.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<DB>,
    db_path: PathBuf,
}

impl std::fmt::Debug for DatabaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseService")
            .field("path", &self.db_path)
            .finish()
    }
}

impl DatabaseService {
    /// Open (or create) the database under `data_dir/rocksdb`
    pub fn new(config: &StorageConfig) -> TableResult<Self> {
        let db_path = config.database_path();

        std::fs::create_dir_all(&db_path).map_err(|e| {
            TableError::new(format!("Failed to create database directory: {}", e))
                .with_code("io")
        })?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        // Performance tuning
        opts.set_max_open_files(256);
        opts.set_keep_log_file_num(3);
        opts.set_max_total_wal_size(64 * 1024 * 1024); // 64MB
        opts.set_write_buffer_size(32 * 1024 * 1024); // 32MB
        opts.set_max_write_buffer_number(3);

        let cf_descriptors: Vec<_> = [CF_MEDIA, CF_PATH_INDEX, CF_METADATA]
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, &db_path, cf_descriptors).map_err(|e| {
            TableError::from(e).with_hint("is another process holding the database lock?")
        })?;

        info!(path = %db_path.display(), "Database initialized (RocksDB)");

        Ok(Self {
            db: Arc::new(db),
            db_path,
        })
    }

    fn cf(&self, name: &str) -> TableResult<Arc<rocksdb::BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| TableError::new(format!("Missing column family {}", name)).with_code("schema"))
    }

    // =========================================================================
    // Media rows
    // =========================================================================

    fn get_media(&self, id: &str) -> TableResult<Option<MediaRecord>> {
        match self.db.get_cf(&self.cf(CF_MEDIA)?, id.as_bytes())? {
            Some(data) => {
                let mut record: MediaRecord = serde_json::from_slice(&data)?;
                record.source = RecordSource::Table;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn get_media_by_path(&self, path: &str) -> TableResult<Option<MediaRecord>> {
        match self.db.get_cf(&self.cf(CF_PATH_INDEX)?, path.as_bytes())? {
            Some(id) => self.get_media(&String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }

    fn all_media(&self) -> TableResult<Vec<MediaRecord>> {
        let cf = self.cf(CF_MEDIA)?;
        let mut records = Vec::new();

        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_, value) = item?;
            let mut record: MediaRecord = serde_json::from_slice(&value)?;
            record.source = RecordSource::Table;
            records.push(record);
        }

        Ok(records)
    }

    fn insert_media(&self, record: &MediaRecord) -> TableResult<()> {
        let cf_media = self.cf(CF_MEDIA)?;
        let cf_paths = self.cf(CF_PATH_INDEX)?;

        if self.db.get_cf(&cf_paths, record.filename.as_bytes())?.is_some() {
            return Err(TableError::new(format!(
                "duplicate storage path: {}",
                record.filename
            ))
            .with_code("unique_violation")
            .with_hint("storage paths must be unique across media rows"));
        }

        if self.db.get_cf(&cf_media, record.id.as_bytes())?.is_some() {
            return Err(TableError::new(format!("duplicate media id: {}", record.id))
                .with_code("unique_violation"));
        }

        let data = serde_json::to_vec(record)?;

        // Atomic batch write: row + path index
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_media, record.id.as_bytes(), &data);
        batch.put_cf(&cf_paths, record.filename.as_bytes(), record.id.as_bytes());
        self.db.write(batch)?;

        debug!(id = %record.id, path = %record.filename, "Inserted media row");
        Ok(())
    }

    fn update_media(&self, record: &MediaRecord) -> TableResult<()> {
        let existing = self.get_media(&record.id)?.ok_or_else(|| {
            TableError::new(format!("media row not found: {}", record.id)).with_code("not_found")
        })?;

        if existing.filename != record.filename {
            return Err(TableError::new("storage path of a media row cannot change")
                .with_code("immutable_column"));
        }

        let data = serde_json::to_vec(record)?;
        self.db.put_cf(&self.cf(CF_MEDIA)?, record.id.as_bytes(), data)?;

        debug!(id = %record.id, "Updated media row");
        Ok(())
    }

    fn delete_media(&self, id: &str) -> TableResult<bool> {
        let record = match self.get_media(id)? {
            Some(r) => r,
            None => return Ok(false),
        };

        let mut batch = WriteBatch::default();
        batch.delete_cf(&self.cf(CF_MEDIA)?, id.as_bytes());
        batch.delete_cf(&self.cf(CF_PATH_INDEX)?, record.filename.as_bytes());
        self.db.write(batch)?;

        debug!(id = %id, "Deleted media row");
        Ok(true)
    }

    /// Get total row count
    pub fn get_media_count(&self) -> TableResult<u64> {
        let cf = self.cf(CF_MEDIA)?;
        let mut count = 0u64;

        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            item?;
            count += 1;
        }

        Ok(count)
    }

    // =========================================================================
    // Extended metadata
    // =========================================================================

    pub fn get_metadata(&self, media_id: &str) -> TableResult<Option<MediaMetadata>> {
        match self.db.get_cf(&self.cf(CF_METADATA)?, media_id.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    pub fn put_metadata(&self, metadata: &MediaMetadata) -> TableResult<()> {
        let data = serde_json::to_vec(metadata)?;
        self.db
            .put_cf(&self.cf(CF_METADATA)?, metadata.media_id.as_bytes(), data)?;

        debug!(media_id = %metadata.media_id, "Stored media metadata");
        Ok(())
    }

    pub fn delete_metadata(&self, media_id: &str) -> TableResult<bool> {
        let cf = self.cf(CF_METADATA)?;
        if self.db.get_cf(&cf, media_id.as_bytes())?.is_none() {
            return Ok(false);
        }

        self.db.delete_cf(&cf, media_id.as_bytes())?;
        debug!(media_id = %media_id, "Deleted media metadata");
        Ok(true)
    }
}

#[async_trait]
impl MediaTable for DatabaseService {
    async fn select(&self, range: &DateRange) -> TableResult<Vec<MediaRecord>> {
        let mut records: Vec<_> = self
            .all_media()?
            .into_iter()
            .filter(|r| range.contains(r.created_at))
            .collect();

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn get(&self, id: &str) -> TableResult<Option<MediaRecord>> {
        self.get_media(id)
    }

    async fn get_by_path(&self, path: &str) -> TableResult<Option<MediaRecord>> {
        self.get_media_by_path(path)
    }

    async fn insert(&self, record: &MediaRecord) -> TableResult<()> {
        self.insert_media(record)
    }

    async fn update(&self, record: &MediaRecord) -> TableResult<()> {
        self.update_media(record)
    }

    async fn delete(&self, id: &str) -> TableResult<bool> {
        self.delete_media(id)
    }

    async fn count(&self) -> TableResult<u64> {
        self.get_media_count()
    }
}
