//! PostgreSQL connector and connectivity watchdog.

use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
};
use tokio::time::MissedTickBehavior;

use super::manager::{ConnectionEvent, Connector, EventSink};

/// Probes made against a dropped pool before giving up on it.
const RECOVERY_PROBES: u32 = 4;

/// Pool and transport settings for the subscriber database.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long to wait for a usable server connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// Upper bound on a single statement, enforced server-side.
    pub statement_timeout: Duration,
    pub require_tls: bool,
    /// Interval between watchdog pings.
    pub health_interval: Duration,
}

impl DatabaseSettings {
    fn connect_options(&self) -> Result<PgConnectOptions> {
        let mut options = PgConnectOptions::from_str(&self.url)
            .context("invalid database url")?
            .options([(
                "statement_timeout",
                self.statement_timeout.as_millis().to_string(),
            )]);

        if self.require_tls {
            options = options.ssl_mode(PgSslMode::Require);
        }

        Ok(options)
    }

    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(Some(self.idle_timeout))
    }
}

/// Opens `PgPool`s and watches them for connectivity loss.
pub struct PgConnector {
    settings: DatabaseSettings,
}

impl PgConnector {
    pub fn new(settings: DatabaseSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Handle = PgPool;

    async fn connect(&self) -> Result<PgPool> {
        let options = self.settings.connect_options()?;

        // connect_with opens one connection up front, so a bad host or
        // credentials fail here rather than on the first query.
        let pool = self
            .settings
            .pool_options()
            .connect_with(options)
            .await
            .context("failed to connect to postgres")?;

        Ok(pool)
    }

    fn watch(&self, pool: &PgPool, events: EventSink<PgPool>) {
        tokio::spawn(watchdog(
            pool.clone(),
            events,
            self.settings.health_interval,
        ));
    }
}

/// Map a query error to the connectivity event it implies, if any.
pub fn connection_event(err: &sqlx::Error) -> Option<ConnectionEvent> {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => Some(ConnectionEvent::Disconnected),
        sqlx::Error::PoolTimedOut | sqlx::Error::Protocol(_) => {
            Some(ConnectionEvent::Error(err.to_string()))
        }
        _ => None,
    }
}

async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .map(|_| ())
}

async fn watchdog(pool: PgPool, events: EventSink<PgPool>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if !events.is_current() || pool.is_closed() {
            return;
        }

        if let Err(err) = ping(&pool).await {
            let event =
                connection_event(&err).unwrap_or_else(|| ConnectionEvent::Error(err.to_string()));
            events.emit(event);
            break;
        }
    }

    // The manager has dropped this pool. Note it if the client recovers.
    // Requests may still hold it, so it closes once the last clone drops.
    for _ in 0..RECOVERY_PROBES {
        ticker.tick().await;
        if ping(&pool).await.is_ok() {
            events.emit(ConnectionEvent::Reconnected);
            break;
        }
    }

    tracing::debug!("database watchdog stopped");
}
