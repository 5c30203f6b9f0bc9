//! Ephemeral stores (Redis).
//!
//! This module contains traits and implementations for ephemeral data storage.
//! All data stored here has automatic TTL-based expiration.
//!
//! ## Stores
//!
//! - **rate_limit** - Sliding-window request counters per client identifier
//!
//! ## Redis Key Patterns
//!
//! ```text
//! ratelimit:{window}:{identifier}:{bucket}   → Request count for one fixed bucket
//! ```
//!
//! A bucket index is `unix_millis / window_millis`. Each bucket expires after
//! two window lengths, long enough to be read as the "previous" bucket.
//!
//! ## Usage in Handlers
//!
//! Stores are accessed via `state.stores`:
//!
//! ```ignore
//! async fn handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
//!     let result = state.stores.rate_limiter.check(&SUBSCRIBE_WINDOW, &ip).await?;
//! }
//! ```

mod rate_limit;

pub use rate_limit::{RateLimitResult, RateLimiter, RedisRateLimiter, SUBSCRIBE_WINDOW};

#[cfg(test)]
pub use rate_limit::MockRateLimiter;

use std::sync::Arc;

/// Collection of all ephemeral stores.
#[derive(Clone)]
pub struct Stores {
    pub rate_limiter: Arc<dyn RateLimiter>,
}
