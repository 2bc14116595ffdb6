//! Common test utilities and helpers.

#![allow(dead_code)]

use media_catalog_server::{
    config::{
        AiConfig, AuthConfig, CatalogConfig, Config, LoggingConfig, MetadataConfig,
        RateLimitConfig, ServerConfig, StorageConfig, UploadConfig,
    },
    create_admin_router, create_public_router, AppState,
};
use reqwest::multipart;
use serde_json::Value;
use std::net::TcpListener;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener as TokioTcpListener;

/// Knobs for a test server
#[derive(Debug, Default, Clone)]
pub struct TestOptions {
    /// Enable auth on `/api/media` with these keys
    pub api_keys: Option<Vec<String>>,
    /// Send extended metadata to another instance
    pub metadata_endpoint: Option<String>,
    /// AI tagging endpoint
    pub ai_endpoint: Option<String>,
}

/// Test server instance
pub struct TestServer {
    pub public_url: String,
    pub admin_url: String,
    pub data_dir: TempDir,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Start a test server with random ports
    pub async fn start() -> Self {
        Self::start_with(TestOptions::default()).await
    }

    /// Start a test server with authentication enabled
    pub async fn start_with_auth(api_keys: Vec<String>) -> Self {
        Self::start_with(TestOptions {
            api_keys: Some(api_keys),
            ..Default::default()
        })
        .await
    }

    pub async fn start_with(options: TestOptions) -> Self {
        let public_port = get_available_port();
        let admin_port = get_available_port();
        let data_dir = TempDir::new().expect("Failed to create temp dir");

        let public_url = format!("http://127.0.0.1:{}", public_port);
        let admin_url = format!("http://127.0.0.1:{}", admin_port);

        let config = create_test_config(&data_dir, public_port, admin_port, &public_url, options);

        let state = AppState::new(config)
            .await
            .expect("Failed to create app state");

        let public_app = create_public_router(state.clone());
        let admin_app = create_admin_router(state);

        let public_listener = TokioTcpListener::bind(("127.0.0.1", public_port))
            .await
            .expect("Failed to bind public listener");
        let admin_listener = TokioTcpListener::bind(("127.0.0.1", admin_port))
            .await
            .expect("Failed to bind admin listener");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            tokio::select! {
                _ = axum::serve(public_listener, public_app) => {}
                _ = axum::serve(admin_listener, admin_app) => {}
                _ = shutdown_rx => {}
            }
        });

        // Give servers time to start
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            public_url,
            admin_url,
            data_dir,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get HTTP client
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap()
    }

    /// Get public URL
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.public_url, path)
    }

    /// Get admin URL
    pub fn admin(&self, path: &str) -> String {
        format!("{}{}", self.admin_url, path)
    }

    /// Directory objects are written to
    pub fn upload_dir(&self) -> std::path::PathBuf {
        self.data_dir.path().join("media").join("uploads")
    }

    /// Place a file in the bucket without going through the API
    pub fn put_object(&self, name: &str, data: &[u8]) -> String {
        std::fs::write(self.upload_dir().join(name), data).expect("Failed to write object");
        format!("uploads/{}", name)
    }

    /// Upload one PNG through the API and return the created record
    pub async fn upload_png(&self, name: &str, width: u32, height: u32) -> Value {
        let response = self
            .client()
            .post(self.url("/api/media"))
            .multipart(png_form(name, width, height))
            .send()
            .await
            .expect("Failed to upload");

        assert_eq!(response.status(), 201, "upload of {} failed", name);
        response.json().await.expect("Failed to parse JSON")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn create_test_config(
    data_dir: &TempDir,
    public_port: u16,
    admin_port: u16,
    base_url: &str,
    options: TestOptions,
) -> Config {
    let auth_enabled = options.api_keys.is_some();

    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: public_port,
            admin_host: "127.0.0.1".to_string(),
            admin_port,
            base_url: base_url.to_string(),
            cache_max_age: 3600,
        },
        storage: StorageConfig {
            data_dir: data_dir.path().to_path_buf(),
            bucket: "media".to_string(),
            folder: "uploads".to_string(),
        },
        upload: UploadConfig::default(),
        catalog: CatalogConfig::default(),
        metadata: MetadataConfig {
            endpoint: options.metadata_endpoint,
            timeout_seconds: 5,
        },
        ai: AiConfig {
            endpoint: options.ai_endpoint,
            ..AiConfig::default()
        },
        rate_limit: RateLimitConfig {
            enabled: false,
            requests_per_window: 1000,
            window_seconds: 60,
        },
        logging: LoggingConfig {
            level: "warn".to_string(),
            format: "pretty".to_string(),
        },
        auth: AuthConfig {
            enabled: auth_enabled,
            api_keys: options.api_keys.unwrap_or_default(),
            protected_paths: vec!["/api/media".to_string()],
            public_paths: vec!["/health".to_string(), "/storage/".to_string()],
        },
    }
}

/// Find an available TCP port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to random port")
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

/// Multipart form with a single PNG `file` part
pub fn png_form(name: &str, width: u32, height: u32) -> multipart::Form {
    multipart::Form::new().part("file", png_part(name, width, height))
}

pub fn png_part(name: &str, width: u32, height: u32) -> multipart::Part {
    multipart::Part::bytes(create_test_png(width, height))
        .file_name(name.to_string())
        .mime_str("image/png")
        .unwrap()
}

/// Create a test PNG image
pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    use image::codecs::png::PngEncoder;
    use image::{ImageBuffer, ImageEncoder, Rgb};

    let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 255) / width) as u8,
            ((y * 255) / height) as u8,
            128,
        ])
    });

    let mut buffer = Vec::new();
    let encoder = PngEncoder::new(&mut buffer);
    encoder
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .expect("Failed to encode PNG");

    buffer
}

/// Create a test JPEG image
pub fn create_test_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
    use image::codecs::jpeg::JpegEncoder;
    use image::{ImageBuffer, ImageEncoder, Rgb};

    let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 255) / width) as u8,
            ((y * 255) / height) as u8,
            200,
        ])
    });

    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .expect("Failed to encode JPEG");

    buffer
}
