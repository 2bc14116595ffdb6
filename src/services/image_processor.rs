//! Upload validation and image helpers.
//!
//! This module handles the checks and derivations an upload goes through
//! before anything is written:
//! - MIME type and size validation against the upload configuration
//! - MIME detection when the client did not declare a usable type
//! - Storage path derivation from the original filename
//! - Pixel dimension measurement
//!
//! # Supported Formats
//!
//! Configurable via `allowed_types`; defaults to JPEG, PNG, WebP and GIF.

use chrono::Utc;
use image::ImageReader;
use std::io::Cursor;
use tracing::debug;

use crate::config::UploadConfig;
use crate::error::{AppError, Result};
use crate::services::storage::join_path;

/// Service for upload validation and image inspection
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    max_file_size: u64,
    allowed_types: Vec<String>,
}

impl ImageProcessor {
    /// Create a new processor with the given configuration
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            allowed_types: config.allowed_types.clone(),
        }
    }

    /// Validate a file's MIME type and size
    ///
    /// Runs before any network or disk I/O.
    ///
    /// # Errors
    /// `UnsupportedMediaType` naming the rejected type, or `PayloadTooLarge`
    /// naming the rejected size
    pub fn validate(&self, mime_type: &str, size: u64) -> Result<()> {
        if !self.allowed_types.iter().any(|t| t == mime_type) {
            return Err(AppError::unsupported_media_type(format!(
                "File type '{}' is not allowed. Allowed types: {}",
                mime_type,
                self.allowed_types.join(", ")
            )));
        }

        if size > self.max_file_size {
            return Err(AppError::payload_too_large(format!(
                "File size {} ({}) exceeds the {} limit",
                size,
                format_size(size),
                format_size(self.max_file_size)
            )));
        }

        Ok(())
    }

    /// Resolve the MIME type of an upload
    ///
    /// The declared type wins unless it is missing or generic, in which case
    /// magic bytes are inspected, then the file extension.
    pub fn resolve_mime_type(declared: Option<&str>, filename: &str, data: &[u8]) -> String {
        if let Some(declared) = declared {
            let declared = declared.trim();
            if !declared.is_empty() && declared != "application/octet-stream" {
                return declared.to_lowercase();
            }
        }

        if let Some(kind) = infer::get(data) {
            debug!(mime = %kind.mime_type(), "Detected MIME type from content");
            return kind.mime_type().to_string();
        }

        mime_guess::from_path(filename)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string()
    }

    /// Measure pixel dimensions from the image header
    ///
    /// Returns `None` for non-image types or undecodable data.
    pub fn measure_dimensions(mime_type: &str, data: &[u8]) -> Option<(u32, u32)> {
        if !mime_type.starts_with("image/") {
            return None;
        }

        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .ok()?;

        match reader.into_dimensions() {
            Ok(dimensions) => Some(dimensions),
            Err(e) => {
                debug!(error = %e, "Could not measure image dimensions");
                None
            }
        }
    }

    /// Get file extension for MIME type
    pub fn mime_to_extension(mime: &str) -> &'static str {
        match mime {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "bin",
        }
    }
}

/// Lowercase, collapse every run of non-alphanumeric characters into a single
/// hyphen and trim hyphens from both ends
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    out
}

/// Derive the storage path for an upload:
/// `{folder}/{unix_millis}-{sanitized stem}.{ext}`
pub fn derive_storage_path(folder: &str, original_name: &str, mime_type: &str) -> String {
    derive_storage_path_at(folder, original_name, mime_type, Utc::now().timestamp_millis())
}

pub(crate) fn derive_storage_path_at(
    folder: &str,
    original_name: &str,
    mime_type: &str,
    millis: i64,
) -> String {
    let stem = match original_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => original_name,
    };

    let mut sanitized = sanitize_filename(stem);
    if sanitized.is_empty() {
        sanitized = "file".to_string();
    }

    let ext = ImageProcessor::mime_to_extension(mime_type);
    join_path(folder, &format!("{}-{}.{}", millis, sanitized, ext))
}

/// Human-readable byte size (binary units)
pub fn format_size(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    const KIB: f64 = 1024.0;

    let b = bytes as f64;
    if b >= MIB {
        format!("{:.2} MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.2} KiB", b / KIB)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_FILE_SIZE;

    fn create_test_processor() -> ImageProcessor {
        ImageProcessor::new(&UploadConfig::default())
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_validate_accepts_allowed_image() {
        let processor = create_test_processor();
        assert!(processor.validate("image/jpeg", 1024).is_ok());
        assert!(processor.validate("image/gif", MAX_FILE_SIZE).is_ok());
    }

    #[test]
    fn test_validate_rejects_oversized_file() {
        let processor = create_test_processor();
        let err = processor
            .validate("image/jpeg", 12 * 1024 * 1024)
            .unwrap_err();

        assert!(matches!(err, AppError::PayloadTooLarge(_)));
        let message = err.to_string();
        assert!(message.contains("12.00 MiB"), "{}", message);
        assert!(message.contains("10.00 MiB"), "{}", message);
    }

    #[test]
    fn test_validate_rejects_disallowed_type() {
        let processor = create_test_processor();
        let err = processor.validate("image/bmp", 10).unwrap_err();

        assert!(matches!(err, AppError::UnsupportedMediaType(_)));
        assert!(err.to_string().contains("image/bmp"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Summer Photo"), "my-summer-photo");
        assert_eq!(sanitize_filename("--Hello___World!!"), "hello-world");
        assert_eq!(sanitize_filename("IMG_0042 (copy)"), "img-0042-copy");
        assert_eq!(sanitize_filename("!!!"), "");
    }

    #[test]
    fn test_derive_storage_path() {
        let path = derive_storage_path_at("uploads", "Red Shoes (1).JPG", "image/jpeg", 1_700_000_000_000);
        assert_eq!(path, "uploads/1700000000000-red-shoes-1.jpg");

        let path = derive_storage_path_at("uploads", "???.png", "image/png", 5);
        assert_eq!(path, "uploads/5-file.png");

        let path = derive_storage_path_at("uploads/", ".hidden", "image/webp", 7);
        assert_eq!(path, "uploads/7-hidden.webp");
    }

    #[test]
    fn test_resolve_mime_type() {
        let png = png_bytes(2, 2);

        assert_eq!(
            ImageProcessor::resolve_mime_type(Some("image/PNG"), "a.png", &png),
            "image/png"
        );
        assert_eq!(
            ImageProcessor::resolve_mime_type(Some("application/octet-stream"), "a.bin", &png),
            "image/png"
        );
        assert_eq!(
            ImageProcessor::resolve_mime_type(None, "photo.jpg", b"not really"),
            "image/jpeg"
        );
    }

    #[test]
    fn test_measure_dimensions() {
        let png = png_bytes(40, 30);

        assert_eq!(
            ImageProcessor::measure_dimensions("image/png", &png),
            Some((40, 30))
        );
        assert_eq!(
            ImageProcessor::measure_dimensions("image/png", b"garbage"),
            None
        );
        assert_eq!(ImageProcessor::measure_dimensions("text/plain", &png), None);
    }

    #[test]
    fn test_mime_to_extension() {
        assert_eq!(ImageProcessor::mime_to_extension("image/jpeg"), "jpg");
        assert_eq!(ImageProcessor::mime_to_extension("image/png"), "png");
        assert_eq!(ImageProcessor::mime_to_extension("image/webp"), "webp");
        assert_eq!(ImageProcessor::mime_to_extension("video/mp4"), "bin");
    }
}
