//! Tower middleware for the public router.
//!
//! - API key authentication
//! - Per-client rate limiting

pub mod auth;
pub mod rate_limit;

pub use auth::ApiKeyAuth;
pub use rate_limit::{RateLimiter, RateLimiterLayer};
