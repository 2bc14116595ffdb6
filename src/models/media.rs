//! Media record model and related types.
//!
//! A `MediaRecord` is either a persisted row of the metadata table or a
//! transient record synthesized from an object that only exists in storage.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a record in a listing came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    /// Persisted row of the metadata table
    #[default]
    Table,
    /// Synthesized from a storage object with no table row
    Storage,
}

/// Media item as seen by the admin console
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// UUID v4 for table rows, the storage path for transient records
    pub id: String,

    /// Storage path inside the bucket (unique)
    pub filename: String,

    /// Filename provided during upload
    pub original_name: String,

    /// Public URL of the stored object
    pub url: String,

    /// Size in bytes
    pub size: u64,

    pub mime_type: String,

    #[serde(default)]
    pub width: Option<u32>,

    #[serde(default)]
    pub height: Option<u32>,

    #[serde(default)]
    pub alt_text: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub source: RecordSource,
}

impl MediaRecord {
    /// Create a new table record with a fresh identifier
    pub fn new(
        filename: String,
        original_name: String,
        url: String,
        size: u64,
        mime_type: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            filename,
            original_name,
            url,
            size,
            mime_type,
            width: None,
            height: None,
            alt_text: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            source: RecordSource::Table,
        }
    }

    /// Set pixel dimensions
    pub fn with_dimensions(mut self, dimensions: Option<(u32, u32)>) -> Self {
        if let Some((width, height)) = dimensions {
            self.width = Some(width);
            self.height = Some(height);
        }
        self
    }

    /// Whether this record only exists in storage
    pub fn is_transient(&self) -> bool {
        self.source == RecordSource::Storage
    }

    /// Case-insensitive match of `needle` (already lowercased) against the
    /// storage path and the original name
    pub fn matches_search(&self, needle: &str) -> bool {
        self.filename.to_lowercase().contains(needle)
            || self.original_name.to_lowercase().contains(needle)
    }
}

/// Creation-date bounds applied to the table query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DateRange {
    /// Inclusive lower bound
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }
}

/// Listing filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaFilter {
    /// Free-text search over filename and original name
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl MediaFilter {
    pub fn date_range(&self) -> DateRange {
        DateRange {
            from: self.from,
            to: self.to,
        }
    }

    /// Lowercased, trimmed search term; `None` when blank
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }
}

/// File received for upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Name the client gave the file
    pub name: String,
    /// Declared MIME type
    pub mime_type: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Caller-supplied fields stored alongside an upload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadOptions {
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Patch of the table-owned fields of a record; absent fields are kept
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaUpdate {
    /// Empty string clears the alt text
    #[serde(default)]
    pub alt_text: Option<String>,
    /// Replaces the tag list
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl MediaUpdate {
    pub fn is_empty(&self) -> bool {
        self.alt_text.is_none() && self.tags.is_none()
    }
}

/// Response DTO for listings
#[derive(Debug, Serialize)]
pub struct MediaListResponse {
    pub items: Vec<MediaRecord>,
    pub total: usize,
    /// Entries that exist in storage without a table row
    pub needs_backfill: usize,
}

impl MediaListResponse {
    pub fn new(items: Vec<MediaRecord>) -> Self {
        let needs_backfill = items.iter().filter(|r| r.is_transient()).count();
        Self {
            total: items.len(),
            needs_backfill,
            items,
        }
    }
}

/// Response DTO for multi-file uploads
#[derive(Debug, Serialize)]
pub struct UploadBatchResponse {
    pub items: Vec<MediaRecord>,
    pub requested: usize,
}

/// Delete response
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub id: String,
}

/// Bulk delete request
#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<String>,
}

/// Bulk delete response
#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub deleted: usize,
    pub requested: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(filename: &str, original: &str) -> MediaRecord {
        MediaRecord::new(
            filename.to_string(),
            original.to_string(),
            format!("http://localhost/storage/media/{}", filename),
            10,
            "image/png".to_string(),
        )
    }

    #[test]
    fn test_new_record_has_uuid_id() {
        let r = record("uploads/1-a.png", "A.png");
        assert!(Uuid::parse_str(&r.id).is_ok());
        assert_eq!(r.source, RecordSource::Table);
        assert!(!r.is_transient());
    }

    #[test]
    fn test_search_matches_either_name() {
        let r = record("uploads/1700000000000-summer-sale.png", "Summer Sale.PNG");
        assert!(r.matches_search("summer"));
        assert!(r.matches_search("sale.png"));
        assert!(r.matches_search("1700000000000"));
        assert!(!r.matches_search("winter"));
    }

    #[test]
    fn test_search_term_normalized() {
        let filter = MediaFilter {
            search: Some("  Banner ".to_string()),
            ..Default::default()
        };
        assert_eq!(filter.search_term().as_deref(), Some("banner"));

        let blank = MediaFilter {
            search: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(blank.search_term().is_none());
    }

    #[test]
    fn test_date_range_bounds_inclusive() {
        let now = Utc::now();
        let range = DateRange {
            from: Some(now - Duration::days(1)),
            to: Some(now),
        };
        assert!(range.contains(now));
        assert!(range.contains(now - Duration::days(1)));
        assert!(!range.contains(now + Duration::seconds(1)));
        assert!(DateRange::default().contains(now));
    }
}
