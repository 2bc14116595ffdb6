//! Merge of the metadata table with the raw storage listing.
//!
//! The table is authoritative for metadata (alt text, tags, timestamps) and
//! storage is authoritative for existence. Both sides are keyed by storage
//! path; every key ends up in exactly one [`Reconciled`] entry.

use std::collections::{HashMap, HashSet};

use chrono::Utc;

use crate::models::{MediaRecord, RecordSource};
use crate::services::storage::StorageObject;

/// Outcome of merging one storage path
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// Table row whose object was not in the listing
    InTableOnly(MediaRecord),
    /// Object with no table row; needs backfill
    InStorageOnly {
        path: String,
        object: StorageObject,
    },
    /// Table row and object agree on the path
    InBoth(MediaRecord, StorageObject),
}

impl Reconciled {
    pub fn path(&self) -> &str {
        match self {
            Self::InTableOnly(record) | Self::InBoth(record, _) => &record.filename,
            Self::InStorageOnly { path, .. } => path,
        }
    }

    pub fn needs_backfill(&self) -> bool {
        matches!(self, Self::InStorageOnly { .. })
    }

    /// Collapse into a listable record, synthesizing one for storage-only
    /// entries
    pub fn into_record(self, public_url: impl Fn(&str) -> String) -> MediaRecord {
        match self {
            Self::InTableOnly(record) | Self::InBoth(record, _) => record,
            Self::InStorageOnly { path, object } => transient_record(path, &object, public_url),
        }
    }
}

/// Merge table rows (already ordered) with the listing of `folder`.
///
/// Table entries keep their order and come first; storage-only entries
/// follow in listing order. Duplicate paths on either side are dropped after
/// their first occurrence.
pub fn reconcile(
    table: Vec<MediaRecord>,
    listing: Vec<StorageObject>,
    folder: &str,
) -> Vec<Reconciled> {
    let mut objects: HashMap<String, StorageObject> = HashMap::with_capacity(listing.len());
    let mut listing_order = Vec::with_capacity(listing.len());

    for object in listing {
        let path = object.path_in(folder);
        if !objects.contains_key(&path) {
            listing_order.push(path.clone());
            objects.insert(path, object);
        }
    }

    let mut seen: HashSet<String> = HashSet::with_capacity(table.len());
    let mut merged = Vec::with_capacity(table.len() + listing_order.len());

    for record in table {
        if !seen.insert(record.filename.clone()) {
            continue;
        }
        match objects.remove(&record.filename) {
            Some(object) => merged.push(Reconciled::InBoth(record, object)),
            None => merged.push(Reconciled::InTableOnly(record)),
        }
    }

    for path in listing_order {
        if let Some(object) = objects.remove(&path) {
            merged.push(Reconciled::InStorageOnly { path, object });
        }
    }

    merged
}

/// Record for an object that has no table row; never persisted by reads
pub fn transient_record(
    path: String,
    object: &StorageObject,
    public_url: impl Fn(&str) -> String,
) -> MediaRecord {
    let now = Utc::now();
    let created_at = object.created_at.unwrap_or(now);

    MediaRecord {
        id: path.clone(),
        url: public_url(&path),
        original_name: object.name.clone(),
        filename: path,
        size: object.size.unwrap_or(0),
        mime_type: object
            .mime_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        width: None,
        height: None,
        alt_text: None,
        tags: Vec::new(),
        created_at,
        updated_at: object.updated_at.unwrap_or(created_at),
        source: RecordSource::Storage,
    }
}

/// Tallies over a reconciled set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReconcileSummary {
    pub in_both: usize,
    pub table_only: usize,
    pub storage_only: usize,
}

impl ReconcileSummary {
    pub fn from_entries(entries: &[Reconciled]) -> Self {
        entries.iter().fold(Self::default(), |mut acc, entry| {
            match entry {
                Reconciled::InBoth(..) => acc.in_both += 1,
                Reconciled::InTableOnly(_) => acc.table_only += 1,
                Reconciled::InStorageOnly { .. } => acc.storage_only += 1,
            }
            acc
        })
    }
}
