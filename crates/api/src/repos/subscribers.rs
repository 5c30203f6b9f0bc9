//! Subscriber repository for PostgreSQL.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    database::{PgConnections, connection_event},
    models::Subscriber,
};

/// What happened to an insert.
#[derive(Debug)]
pub enum InsertOutcome {
    /// A new subscriber row was created.
    Inserted(Subscriber),
    /// The email was already on the list. Nothing was written.
    AlreadyExists,
    /// The database could not be reached or rejected the write.
    Failed(anyhow::Error),
}

/// Repository for subscriber operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriberRepo: Send + Sync {
    /// Add an email to the list. Duplicates come back as `AlreadyExists`.
    async fn insert(&self, email: &str) -> InsertOutcome;
}

/// PostgreSQL implementation of SubscriberRepo.
#[derive(Clone)]
pub struct PgSubscriberRepo {
    connections: Arc<PgConnections>,
}

impl PgSubscriberRepo {
    pub fn new(connections: Arc<PgConnections>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl SubscriberRepo for PgSubscriberRepo {
    async fn insert(&self, email: &str) -> InsertOutcome {
        let conn = match self.connections.get().await {
            Ok(conn) => conn,
            Err(err) => return InsertOutcome::Failed(err.into()),
        };

        let result = sqlx::query_as::<_, Subscriber>(
            "INSERT INTO subscribers (email) VALUES ($1) RETURNING id, email, created_at",
        )
        .bind(email)
        .fetch_one(&*conn)
        .await;

        classify(result, |event| conn.report(event))
    }
}

fn classify(
    result: Result<Subscriber, sqlx::Error>,
    report: impl FnOnce(crate::database::ConnectionEvent),
) -> InsertOutcome {
    match result {
        Ok(subscriber) => InsertOutcome::Inserted(subscriber),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => InsertOutcome::AlreadyExists,
        Err(err) => {
            if let Some(event) = connection_event(&err) {
                report(event);
            }
            InsertOutcome::Failed(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{
        ConnectionEvent, ConnectionManager, DatabaseSettings, PgConnector, RetryPolicy,
    };
    use chrono::Utc;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::{borrow::Cow, error::Error as StdError, fmt, time::Duration};
    use uuid::Uuid;

    /// Postgres `unique_violation` as raised by the email constraint.
    #[derive(Debug)]
    struct UniqueViolation;

    impl fmt::Display for UniqueViolation {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.message())
        }
    }

    impl StdError for UniqueViolation {}

    impl DatabaseError for UniqueViolation {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint \"subscribers_email_key\""
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed("23505"))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn successful_insert_is_inserted() {
        let subscriber = Subscriber {
            id: Uuid::new_v4(),
            email: "a@b.com".to_string(),
            created_at: Utc::now(),
        };

        let outcome = classify(Ok(subscriber), |_| panic!("no event expected"));

        assert!(matches!(outcome, InsertOutcome::Inserted(s) if s.email == "a@b.com"));
    }

    #[test]
    fn unique_violation_is_already_exists() {
        let err = sqlx::Error::Database(Box::new(UniqueViolation));

        let outcome = classify(Err(err), |_| panic!("no event expected"));

        assert!(matches!(outcome, InsertOutcome::AlreadyExists));
    }

    #[tokio::test]
    async fn unreachable_database_is_failed() {
        let settings = DatabaseSettings {
            url: "not a url".to_string(),
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_millis(200),
            idle_timeout: Duration::from_secs(10),
            statement_timeout: Duration::from_secs(45),
            require_tls: false,
            health_interval: Duration::from_secs(15),
        };
        let connections = ConnectionManager::new(
            Arc::new(PgConnector::new(settings)),
            RetryPolicy {
                max_attempts: 1,
                delay: Duration::ZERO,
            },
        );
        let repo = PgSubscriberRepo::new(Arc::new(connections));

        let outcome = repo.insert("a@b.com").await;

        match outcome {
            InsertOutcome::Failed(err) => {
                assert!(err.to_string().contains("unable to connect to database"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn connectivity_failure_is_reported_and_failed() {
        let mut reported = None;
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "broken pipe",
        ));

        let outcome = classify(Err(err), |event| reported = Some(event));

        assert!(matches!(outcome, InsertOutcome::Failed(_)));
        assert_eq!(reported, Some(ConnectionEvent::Disconnected));
    }

    #[test]
    fn other_failure_is_failed_without_event() {
        let outcome = classify(Err(sqlx::Error::RowNotFound), |_| {
            panic!("no event expected")
        });

        assert!(matches!(outcome, InsertOutcome::Failed(_)));
    }
}
