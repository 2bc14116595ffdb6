//! API key authentication middleware.
//!
//! Guards the media API with static keys from the config file. Public file
//! URLs and health probes stay open through `public_paths`.
//!
//! # Authentication Methods
//!
//! The middleware accepts API keys via:
//! 1. `Authorization: Bearer <api_key>` header
//! 2. `X-API-Key: <api_key>` header
//! 3. `?api_key=<api_key>` query parameter
//!
//! # Example
//!
//! ```rust,ignore
//! let auth = ApiKeyAuth::new(&config.auth);
//! let app = Router::new()
//!     .nest("/api/media", media_routes())
//!     .layer(auth.layer());
//! ```

use axum::{
    body::Body,
    http::{header, HeaderValue, Request},
    response::{IntoResponse, Response},
};
use std::{
    collections::HashSet,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::AppError;

/// What the middleware decided for one request
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Open,
    Accepted,
    Missing,
    Invalid,
}

/// API key authenticator
#[derive(Clone)]
pub struct ApiKeyAuth {
    valid_keys: Arc<HashSet<String>>,
    enabled: bool,
    protected_paths: Arc<Vec<String>>,
    public_paths: Arc<Vec<String>>,
}

impl ApiKeyAuth {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            valid_keys: Arc::new(config.api_keys.iter().cloned().collect()),
            enabled: config.enabled,
            protected_paths: Arc::new(config.protected_paths.clone()),
            public_paths: Arc::new(config.public_paths.clone()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn key_count(&self) -> usize {
        self.valid_keys.len()
    }

    /// Create a Tower Layer for this authenticator
    pub fn layer(&self) -> ApiKeyAuthLayer {
        ApiKeyAuthLayer { auth: self.clone() }
    }

    /// Public prefixes win; an empty protected list protects everything else
    fn requires_auth(&self, path: &str) -> bool {
        if !self.enabled {
            return false;
        }

        if self.public_paths.iter().any(|p| path.starts_with(p.as_str())) {
            return false;
        }

        self.protected_paths.is_empty()
            || self.protected_paths.iter().any(|p| path.starts_with(p.as_str()))
    }

    fn verdict<B>(&self, req: &Request<B>) -> Verdict {
        if !self.requires_auth(req.uri().path()) {
            return Verdict::Open;
        }

        match extract_api_key(req) {
            Some(key) if self.valid_keys.contains(key) => Verdict::Accepted,
            Some(_) => Verdict::Invalid,
            None => Verdict::Missing,
        }
    }
}

/// Tower Layer for API key authentication
#[derive(Clone)]
pub struct ApiKeyAuthLayer {
    auth: ApiKeyAuth,
}

impl<S> Layer<S> for ApiKeyAuthLayer {
    type Service = ApiKeyAuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyAuthMiddleware {
            inner,
            auth: self.auth.clone(),
        }
    }
}

/// API key authentication middleware service
#[derive(Clone)]
pub struct ApiKeyAuthMiddleware<S> {
    inner: S,
    auth: ApiKeyAuth,
}

impl<S> Service<Request<Body>> for ApiKeyAuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let verdict = self.auth.verdict(&req);
        let mut inner = self.inner.clone();

        if verdict == Verdict::Accepted {
            debug!(path = %req.uri().path(), "API key accepted");
        }

        match verdict {
            Verdict::Open | Verdict::Accepted => Box::pin(async move { inner.call(req).await }),
            Verdict::Missing | Verdict::Invalid => {
                let message = if verdict == Verdict::Missing {
                    "API key required"
                } else {
                    "Invalid API key"
                };
                warn!(path = %req.uri().path(), reason = message, "Request rejected");
                Box::pin(async move { Ok(unauthorized_response(message)) })
            }
        }
    }
}

/// API key from the bearer token, `X-API-Key` or the `api_key` query parameter
fn extract_api_key<B>(req: &Request<B>) -> Option<&str> {
    let headers = req.headers();

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()))
        .or_else(|| {
            req.uri()
                .query()?
                .split('&')
                .find_map(|param| param.strip_prefix("api_key="))
        })
}

fn unauthorized_response(message: &str) -> Response {
    let mut response = AppError::Unauthorized(message.to_string()).into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}
