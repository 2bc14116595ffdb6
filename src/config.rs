//! Configuration module for the media catalog server.
//!
//! This module handles loading and validating configuration from TOML files.
//! Configuration can be loaded from a file path or from default locations.
//!
//! # Configuration Sources (in order of priority)
//! 1. `config.local.toml` - Local overrides (gitignored)
//! 2. `config.toml` - Main configuration file
//! 3. Default values (for the optional sections)
//!
//! # Example
//! ```rust,ignore
//! let config = Config::load("config.toml")?;
//! println!("Media lives in {}/{}", config.storage.bucket, config.storage.folder);
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Largest accepted upload (10 MiB)
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// MIME types accepted by the media library
pub const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Bucket holding all media objects
pub const DEFAULT_BUCKET: &str = "media";

/// Folder inside the bucket that uploads are written to
pub const DEFAULT_FOLDER: &str = "uploads";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Whether authentication is enabled for the media API
    #[serde(default)]
    pub enabled: bool,

    /// List of valid API keys
    #[serde(default)]
    pub api_keys: Vec<String>,

    /// Paths that require authentication (empty = all paths except public)
    #[serde(default)]
    pub protected_paths: Vec<String>,

    /// Paths that are always public (bypass auth)
    #[serde(default)]
    pub public_paths: Vec<String>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind the public API to
    pub host: String,
    /// Port for the public API
    pub port: u16,
    /// Host to bind the admin API to (should be localhost)
    pub admin_host: String,
    /// Port for the admin API
    pub admin_port: u16,
    /// Base URL public object URLs are built from
    pub base_url: String,
    /// Cache-Control max-age in seconds for served objects
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age: u64,
}

fn default_cache_max_age() -> u64 {
    31_536_000
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all data (RocksDB and buckets)
    pub data_dir: PathBuf,
    /// Bucket name (a directory under data_dir)
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Folder inside the bucket where uploads land
    #[serde(default = "default_folder")]
    pub folder: String,
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_folder() -> String {
    DEFAULT_FOLDER.to_string()
}

impl StorageConfig {
    /// Full path to the bucket root
    pub fn bucket_path(&self) -> PathBuf {
        self.data_dir.join(&self.bucket)
    }

    /// Full path to the RocksDB directory
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("rocksdb")
    }
}

/// Upload validation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Accepted MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

fn default_max_file_size() -> u64 {
    MAX_FILE_SIZE
}

fn default_allowed_types() -> Vec<String> {
    ALLOWED_MIME_TYPES.iter().map(|t| t.to_string()).collect()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

impl UploadConfig {
    /// Check if a MIME type is accepted
    pub fn is_allowed_type(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }
}

/// Catalog behaviour: listing page size and cache scoping
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Maximum number of storage entries read per listing
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
    /// Lifetime of cached records and metadata
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    /// Upper bound on entries per cache
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
}

fn default_list_page_size() -> usize {
    100
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_max_entries() -> usize {
    1000
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            list_page_size: default_list_page_size(),
            cache_ttl_seconds: default_cache_ttl(),
            cache_max_entries: default_cache_max_entries(),
        }
    }
}

/// Extended metadata backend selection
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Base URL of a remote metadata endpoint; local database when unset
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_metadata_timeout")]
    pub timeout_seconds: u64,
}

fn default_metadata_timeout() -> u64 {
    10
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_seconds: default_metadata_timeout(),
        }
    }
}

/// External AI tagging model
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// URL the generation request is POSTed to; AI tagging disabled when unset
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_ai_timeout")]
    pub timeout_seconds: u64,
}

fn default_ai_timeout() -> u64 {
    30
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_seconds: default_ai_timeout(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Maximum requests per window
    pub requests_per_window: u32,
    /// Window duration in seconds
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_window: 120,
            window_seconds: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file path
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed or validated
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    ///
    /// Tries `config.local.toml` first, then `config.toml`.
    pub fn load_default() -> Result<Self, ConfigError> {
        if Path::new("config.local.toml").exists() {
            return Self::load("config.local.toml");
        }

        if Path::new("config.toml").exists() {
            return Self::load("config.toml");
        }

        Err(ConfigError::ValidationError(
            "No configuration file found. Expected config.toml or config.local.toml".to_string(),
        ))
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.base_url.ends_with('/') {
            return Err(ConfigError::ValidationError(
                "base_url should not have a trailing slash".to_string(),
            ));
        }

        if self.storage.bucket.is_empty() || self.storage.bucket.contains('/') {
            return Err(ConfigError::ValidationError(
                "bucket must be a single non-empty path segment".to_string(),
            ));
        }

        let folder = self.storage.folder.trim_matches('/');
        if folder.is_empty() || folder.contains("..") {
            return Err(ConfigError::ValidationError(
                "folder must be a non-empty relative path".to_string(),
            ));
        }

        if self.upload.max_file_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_file_size must be greater than 0".to_string(),
            ));
        }

        if self.upload.allowed_types.is_empty() {
            return Err(ConfigError::ValidationError(
                "allowed_types must list at least one MIME type".to_string(),
            ));
        }

        if self.catalog.list_page_size == 0 {
            return Err(ConfigError::ValidationError(
                "list_page_size must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.enabled
            && (self.rate_limit.requests_per_window == 0 || self.rate_limit.window_seconds == 0)
        {
            return Err(ConfigError::ValidationError(
                "rate_limit requires non-zero requests_per_window and window_seconds".to_string(),
            ));
        }

        if let Some(endpoint) = &self.metadata.endpoint {
            if endpoint.ends_with('/') {
                return Err(ConfigError::ValidationError(
                    "metadata.endpoint should not have a trailing slash".to_string(),
                ));
            }
        }

        Ok(())
    }
}
