//! Database repositories (PostgreSQL).
//!
//! This module contains traits and implementations for database access.
//! Each repository is abstracted behind a trait to enable mocking in tests.
//! All of them acquire their pool through the shared
//! [`ConnectionManager`](crate::database::ConnectionManager).
//!
//! ## Repositories
//!
//! - **subscribers** - Launch list inserts (duplicate-tolerant)
//! - **status** - Database health checks
//!
//! ## Usage in Handlers
//!
//! Repositories are accessed via `state.repos`:
//!
//! ```ignore
//! async fn handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
//!     match state.repos.subscribers.insert(&email).await {
//!         InsertOutcome::Inserted(_) | InsertOutcome::AlreadyExists => {}
//!         InsertOutcome::Failed(err) => return Err(AppError::Internal(err)),
//!     }
//! }
//! ```

mod status;
mod subscribers;

pub use status::{PgStatusRepo, StatusRepo};
pub use subscribers::{InsertOutcome, PgSubscriberRepo, SubscriberRepo};

#[cfg(test)]
pub use status::MockStatusRepo;
#[cfg(test)]
pub use subscribers::MockSubscriberRepo;

use std::sync::Arc;

/// Collection of all database repositories.
#[derive(Clone)]
pub struct Repos {
    pub subscribers: Arc<dyn SubscriberRepo>,
    pub status: Arc<dyn StatusRepo>,
}
