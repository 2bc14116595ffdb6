//! Client for the external AI tagging model.
//!
//! The model receives a media id and a public image URL and answers with
//! suggested alt text, tags and a confidence score.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AiConfig;
use crate::error::{AppError, Result};
use crate::models::AiSuggestion;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    media_id: &'a str,
    image_url: &'a str,
}

/// HTTP client for alt-text and tag generation
#[derive(Debug, Clone)]
pub struct AiTagger {
    endpoint: String,
    client: reqwest::Client,
}

impl AiTagger {
    /// Build a tagger when an endpoint is configured
    pub fn from_config(config: &AiConfig) -> Result<Option<Self>> {
        match &config.endpoint {
            Some(endpoint) => Ok(Some(Self::new(
                endpoint.clone(),
                Duration::from_secs(config.timeout_seconds),
            )?)),
            None => Ok(None),
        }
    }

    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { endpoint, client })
    }

    /// Ask the model for a suggestion
    pub async fn generate(&self, media_id: &str, image_url: &str) -> Result<AiSuggestion> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&GenerateRequest {
                media_id,
                image_url,
            })
            .send()
            .await
            .map_err(|e| AppError::metadata_api(format!("AI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                media_id = %media_id,
                status = %status,
                body = %body,
                "AI endpoint rejected request"
            );
            return Err(AppError::metadata_api(format!(
                "AI endpoint returned {}",
                status
            )));
        }

        let suggestion: AiSuggestion = response
            .json()
            .await
            .map_err(|e| AppError::metadata_api(format!("Invalid AI response: {}", e)))?;

        debug!(
            media_id = %media_id,
            tags = suggestion.tags.len(),
            confidence = ?suggestion.confidence,
            "Received AI suggestion"
        );

        Ok(suggestion)
    }
}
