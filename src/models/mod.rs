//! Data models for the media catalog server.
//!
//! This module contains the domain models and data transfer objects (DTOs)
//! used throughout the application.

mod media;
pub mod metadata;

pub use media::*;
pub use metadata::*;
