//! Sliding-window rate limiting for Redis.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A named request budget over a trailing time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub name: &'static str,
    pub limit: i64,
    pub window: Duration,
}

/// Guards POST /api/subscribe: 5 requests per minute.
pub const SUBSCRIBE_WINDOW: RateLimitWindow = RateLimitWindow {
    name: "subscribe",
    limit: 5,
    window: Duration::from_secs(60),
};

/// General-purpose budget for other public endpoints: 10 requests per 5 minutes.
#[allow(dead_code)]
pub const GENERAL_WINDOW: RateLimitWindow = RateLimitWindow {
    name: "general",
    limit: 10,
    window: Duration::from_secs(5 * 60),
};

/// Rate limiter trait for checking and incrementing counters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Health check - verify Redis connectivity.
    async fn health_check(&self) -> Result<bool>;

    /// Consume one request from `identifier`'s budget and report whether it
    /// is still within `window`. Every call counts, allowed or not.
    /// An error means the limiter itself is unreachable.
    async fn check(&self, window: &RateLimitWindow, identifier: &str) -> Result<RateLimitResult>;
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Under the limit, includes current weighted count.
    Allowed(i64),
    /// Over the limit, includes current weighted count.
    Exceeded(i64),
}

/// Fixed bucket index containing `now`, and how far into that bucket we are (0.0..1.0).
fn bucket_position(window: Duration, now: DateTime<Utc>) -> (i64, f64) {
    let window_ms = window.as_millis().max(1) as i64;
    let now_ms = now.timestamp_millis();
    let elapsed = now_ms.rem_euclid(window_ms) as f64 / window_ms as f64;
    (now_ms.div_euclid(window_ms), elapsed)
}

/// Approximate count over the trailing window: the previous bucket weighted
/// by how much of it still overlaps, plus everything in the current bucket.
fn weighted_count(previous: i64, current: i64, elapsed: f64) -> i64 {
    (previous as f64 * (1.0 - elapsed)).floor() as i64 + current
}

/// Redis implementation of RateLimiter.
#[derive(Clone)]
pub struct RedisRateLimiter {
    client: redis::Client,
}

impl RedisRateLimiter {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    fn bucket_key(window: &RateLimitWindow, identifier: &str, bucket: i64) -> String {
        format!("ratelimit:{}:{}:{}", window.name, identifier, bucket)
    }

    async fn check_at(
        &self,
        window: &RateLimitWindow,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitResult> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (bucket, elapsed) = bucket_position(window.window, now);
        let current_key = Self::bucket_key(window, identifier, bucket);
        let previous_key = Self::bucket_key(window, identifier, bucket - 1);

        // Current bucket must outlive the next one, which still reads it as "previous".
        let ttl = (window.window.as_secs() * 2).max(1) as i64;

        let (previous, current): (Option<i64>, i64) = redis::pipe()
            .atomic()
            .get(&previous_key)
            .incr(&current_key, 1)
            .expire(&current_key, ttl)
            .ignore()
            .query_async(&mut conn)
            .await?;

        let count = weighted_count(previous.unwrap_or(0), current, elapsed);

        if count > window.limit {
            Ok(RateLimitResult::Exceeded(count))
        } else {
            Ok(RateLimitResult::Allowed(count))
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(result == "PONG")
    }

    async fn check(&self, window: &RateLimitWindow, identifier: &str) -> Result<RateLimitResult> {
        self.check_at(window, identifier, Utc::now()).await
    }
}
