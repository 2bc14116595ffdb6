//! Service layer for the media catalog server.
//!
//! This module contains the business logic behind the HTTP handlers:
//! - Object storage and the media table (behind traits)
//! - Extended metadata and AI tagging
//! - Upload validation and image inspection
//! - The catalog that reconciles table and storage

pub mod ai_tagger;
pub mod cache;
pub mod catalog;
pub mod database;
pub mod image_processor;
pub mod metadata;
pub mod reconcile;
pub mod saga;
pub mod storage;

pub use ai_tagger::AiTagger;
pub use catalog::MediaCatalog;
pub use database::{DatabaseService, MediaTable, TableError};
pub use image_processor::ImageProcessor;
pub use metadata::{HttpMetadataClient, LocalMetadataStore, MetadataStore};
pub use storage::{LocalObjectStore, ObjectStore, StorageStats};
