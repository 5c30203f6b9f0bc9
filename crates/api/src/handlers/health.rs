//! Health check endpoint for load balancers and monitoring.
//!
//! Returns 200 OK if the service is healthy (database and Redis reachable),
//! 503 Service Unavailable otherwise. A database check goes through the
//! connection manager, so it also warms or re-establishes the shared pool.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: bool,
    redis: bool,
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (database, redis) = tokio::join!(
        state.repos.status.health_check(),
        state.stores.rate_limiter.health_check(),
    );

    let db_ok = database.unwrap_or_else(|err| {
        tracing::warn!(error = ?err, "database health check failed");
        false
    });
    let redis_ok = redis.unwrap_or_else(|err| {
        tracing::warn!(error = ?err, "redis health check failed");
        false
    });

    let healthy = db_ok && redis_ok;

    let response = HealthResponse {
        status: if healthy { "ok" } else { "unhealthy" },
        database: db_ok,
        redis: redis_ok,
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}
