//! Status repository for health checks.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::database::{PgConnections, connection_event};

/// Repository for database health checks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusRepo: Send + Sync {
    /// Health check - verify database connectivity.
    async fn health_check(&self) -> Result<bool>;
}

/// PostgreSQL implementation of StatusRepo.
#[derive(Clone)]
pub struct PgStatusRepo {
    connections: Arc<PgConnections>,
}

impl PgStatusRepo {
    pub fn new(connections: Arc<PgConnections>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl StatusRepo for PgStatusRepo {
    async fn health_check(&self) -> Result<bool> {
        let conn = self.connections.get().await?;
        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&*conn)
            .await;

        match result {
            Ok(value) => Ok(value == 1),
            Err(err) => {
                if let Some(event) = connection_event(&err) {
                    conn.report(event);
                }
                Err(err.into())
            }
        }
    }
}
