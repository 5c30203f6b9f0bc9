//! Database connection lifecycle.
//!
//! A single [`ConnectionManager`] is built in `main` and shared through
//! `AppState`. It hands out a cached connection handle, establishes it lazily
//! with bounded retries, and drops the cache when the underlying client
//! reports an error or a disconnect.
//!
//! ## States
//!
//! ```text
//! Absent ──get()──► Connecting ──ok──► Connected ──error/disconnect──► Absent
//!                        │
//!                        └──retries exhausted──► Absent
//! ```
//!
//! Concurrent callers that arrive while an attempt is in flight await that
//! same attempt and observe the same outcome.
//!
//! ## Usage in Repos
//!
//! ```ignore
//! let conn = self.connections.get().await?;
//! let row = sqlx::query("SELECT 1").execute(&*conn).await;
//! if let Err(err) = &row
//!     && let Some(event) = connection_event(err)
//! {
//!     conn.report(event);
//! }
//! ```

mod manager;
mod postgres;

pub use manager::{ConnectionEvent, ConnectionManager, RetryPolicy};
pub use postgres::{DatabaseSettings, PgConnector, connection_event};

/// Connection manager for the production PostgreSQL pool.
pub type PgConnections = ConnectionManager<PgConnector>;
