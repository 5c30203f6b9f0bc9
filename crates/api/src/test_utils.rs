//! Shared test utilities for API handler tests.
//!
//! Provides common mock factories and a flexible `TestStateBuilder` for constructing
//! `AppState` instances with only the mocks needed for each test.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::test_utils::{TestStateBuilder, mock_subscriber};
//!
//! let mut subscriber_repo = MockSubscriberRepo::new();
//! subscriber_repo
//!     .expect_insert()
//!     .returning(|email| InsertOutcome::Inserted(mock_subscriber(email)));
//!
//! let state = TestStateBuilder::new()
//!     .with_subscriber_repo(subscriber_repo)
//!     .build();
//! ```

use std::sync::Arc;

use axum::response::Response;
use chrono::Utc;
use http_body_util::BodyExt;
use uuid::Uuid;

use crate::config::Config;
use crate::models::Subscriber;
use crate::repos::{MockStatusRepo, MockSubscriberRepo, Repos};
use crate::state::AppState;
use crate::stores::{MockRateLimiter, Stores};

/// Creates a test configuration with dummy values.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 3000,
        database_url: "postgres://test".to_string(),
        redis_url: "redis://test".to_string(),
        env: "test".to_string(),
        sentry_dsn: None,
        allowed_origin: None,
        rate_limit_fail_open: true,
        db_max_connections: 10,
        db_min_connections: 0,
        db_acquire_timeout_secs: 30,
        db_idle_timeout_secs: 10,
        db_statement_timeout_secs: 45,
        db_require_tls: false,
        db_health_interval_secs: 15,
    }
}

/// Creates a mock subscriber with the given email.
pub fn mock_subscriber(email: &str) -> Subscriber {
    Subscriber {
        id: Uuid::new_v4(),
        email: email.to_string(),
        created_at: Utc::now(),
    }
}

/// Reads a response body as JSON.
pub async fn response_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Builder for constructing test `AppState` with custom mocks.
///
/// Uses default (empty) mocks for any repo/store not explicitly set.
/// This allows tests to only configure the mocks they actually need.
pub struct TestStateBuilder {
    config: Option<Config>,
    subscriber_repo: Option<MockSubscriberRepo>,
    status_repo: Option<MockStatusRepo>,
    rate_limiter: Option<MockRateLimiter>,
}

impl TestStateBuilder {
    /// Creates a new builder with no mocks configured.
    pub fn new() -> Self {
        Self {
            config: None,
            subscriber_repo: None,
            status_repo: None,
            rate_limiter: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_subscriber_repo(mut self, repo: MockSubscriberRepo) -> Self {
        self.subscriber_repo = Some(repo);
        self
    }

    pub fn with_status_repo(mut self, repo: MockStatusRepo) -> Self {
        self.status_repo = Some(repo);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: MockRateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Builds the `AppState` using configured mocks or defaults.
    pub fn build(self) -> AppState {
        let repos = Repos {
            subscribers: Arc::new(
                self.subscriber_repo
                    .unwrap_or_else(MockSubscriberRepo::new),
            ),
            status: Arc::new(self.status_repo.unwrap_or_else(MockStatusRepo::new)),
        };

        let stores = Stores {
            rate_limiter: Arc::new(self.rate_limiter.unwrap_or_else(MockRateLimiter::new)),
        };

        AppState {
            config: self.config.unwrap_or_else(test_config),
            repos,
            stores,
        }
    }
}

impl Default for TestStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
