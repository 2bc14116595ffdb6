//! Extended media metadata.
//!
//! SEO and editorial attributes stored separately from the media table,
//! keyed by the media record identifier. A record without metadata still
//! needs SEO work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point of interest used when cropping, both axes in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocalPoint {
    pub x: f32,
    pub y: f32,
}

impl FocalPoint {
    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

/// Extended metadata for one media record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub media_id: String,
    #[serde(default)]
    pub seo_filename: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub focal_point: Option<FocalPoint>,
    #[serde(default)]
    pub copyright: Option<String>,
    #[serde(default)]
    pub photographer: Option<String>,
    #[serde(default)]
    pub ai_alt_text: Option<String>,
    #[serde(default)]
    pub ai_tags: Vec<String>,
    #[serde(default)]
    pub ai_confidence: Option<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaMetadata {
    /// Empty metadata for a media record
    pub fn new(media_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            media_id: media_id.into(),
            seo_filename: None,
            title: None,
            caption: None,
            description: None,
            tags: Vec::new(),
            category: None,
            collection: None,
            focal_point: None,
            copyright: None,
            photographer: None,
            ai_alt_text: None,
            ai_tags: Vec::new(),
            ai_confidence: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update; fields absent from the update are kept
    pub fn apply(&mut self, update: &MetadataUpdate) {
        fn set<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *target = Some(v.clone());
            }
        }

        set(&mut self.seo_filename, &update.seo_filename);
        set(&mut self.title, &update.title);
        set(&mut self.caption, &update.caption);
        set(&mut self.description, &update.description);
        set(&mut self.category, &update.category);
        set(&mut self.collection, &update.collection);
        set(&mut self.focal_point, &update.focal_point);
        set(&mut self.copyright, &update.copyright);
        set(&mut self.photographer, &update.photographer);
        if let Some(tags) = &update.tags {
            self.tags = normalize_tags(tags.iter().map(String::as_str));
        }
        self.updated_at = Utc::now();
    }

    /// Store an AI suggestion
    pub fn apply_ai(&mut self, suggestion: &AiSuggestion) {
        self.ai_alt_text = suggestion.alt_text.clone();
        self.ai_tags = normalize_tags(suggestion.tags.iter().map(String::as_str));
        self.ai_confidence = suggestion.confidence;
        self.updated_at = Utc::now();
    }

    /// Whether the SEO fields still need to be filled in
    pub fn needs_seo(&self) -> bool {
        is_blank(&self.title) && is_blank(&self.seo_filename)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}

/// Trim, drop empties and de-duplicate while keeping first-seen order
pub fn normalize_tags<'a>(tags: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Partial metadata update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focal_point: Option<FocalPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photographer: Option<String>,
}

impl MetadataUpdate {
    pub fn tags(tags: Vec<String>) -> Self {
        Self {
            tags: Some(tags),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Output of the AI tagging model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiSuggestion {
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Bulk tag operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagAction {
    Add,
    Remove,
}

impl TagAction {
    /// Compute the new tag list: ordered union for `Add`, difference for `Remove`
    pub fn apply(&self, current: &[String], tags: &[String]) -> Vec<String> {
        match self {
            Self::Add => {
                normalize_tags(current.iter().chain(tags.iter()).map(String::as_str))
            }
            Self::Remove => current
                .iter()
                .filter(|t| !tags.iter().any(|r| r.trim() == t.as_str()))
                .cloned()
                .collect(),
        }
    }
}

// =============================================================================
// Endpoint DTOs
// =============================================================================

/// Query for `GET`/`DELETE /api/media/metadata`
#[derive(Debug, Default, Deserialize)]
pub struct MetadataQuery {
    #[serde(default)]
    pub media_id: Option<String>,
    /// Comma-separated list of media ids
    #[serde(default)]
    pub media_ids: Option<String>,
}

impl MetadataQuery {
    pub fn ids(&self) -> Vec<String> {
        self.media_ids
            .as_deref()
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Body of `PATCH /api/media/metadata`
#[derive(Debug, Serialize, Deserialize)]
pub struct PatchMetadataRequest {
    pub media_id: String,
    #[serde(flatten)]
    pub update: MetadataUpdate,
}

/// Body of `PUT /api/media/metadata`
#[derive(Debug, Serialize, Deserialize)]
pub struct BulkMetadataRequest {
    pub media_ids: Vec<String>,
    #[serde(flatten)]
    pub update: MetadataUpdate,
}

/// Body of `POST /api/media/metadata/ai`
#[derive(Debug, Serialize, Deserialize)]
pub struct AiGenerateRequest {
    pub media_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Body of `POST /api/media/tags`
#[derive(Debug, Deserialize)]
pub struct BulkTagRequest {
    pub media_ids: Vec<String>,
    pub tags: Vec<String>,
    pub action: TagAction,
}

/// Body returned by `DELETE /api/media/metadata`
#[derive(Debug, Serialize, Deserialize)]
pub struct MetadataDeleteResponse {
    pub media_id: String,
    pub deleted: bool,
}

/// Count of items touched by a bulk operation
#[derive(Debug, Serialize, Deserialize)]
pub struct BulkUpdateResponse {
    pub updated: usize,
    pub requested: usize,
}
