//! Launch list subscription endpoint.
//!
//! Flow:
//! 1. The caller is rate limited by forwarded client IP (5 requests per minute)
//! 2. The body is parsed and the email checked for an `@`
//! 3. The email is inserted through the shared database connection
//! 4. New and already-known emails get the same 200 response
//!
//! Every failure maps to one of four fixed JSON bodies; internal detail is
//! only logged.
//!
//! ## Endpoints
//!
//! - POST /api/subscribe - Add an email to the launch list

use axum::{
    Json, Router,
    body::Bytes,
    debug_handler,
    extract::{DefaultBodyLimit, State, rejection::BytesRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use garde::Validate;
use shared::api::{
    INVALID_EMAIL_MESSAGE, RATE_LIMITED_MESSAGE, SubscribePayload, SubscribeResponse,
};

use crate::{
    error::AppError,
    repos::InsertOutcome,
    state::AppState,
    stores::{RateLimitResult, SUBSCRIBE_WINDOW},
};

const FORWARDED_FOR: &str = "x-forwarded-for";
const LOOPBACK: &str = "127.0.0.1";

/// Largest subscribe body we are willing to buffer.
const MAX_BODY_BYTES: usize = 16 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/subscribe", post(subscribe))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

/// Rate limit key for the caller: the forwarded-for header as sent, or loopback.
fn client_identifier(headers: &HeaderMap) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(LOOPBACK)
        .to_string()
}

fn invalid_email() -> AppError {
    AppError::Validation(INVALID_EMAIL_MESSAGE.to_string())
}

/// Parse and validate the body. Anything that is not `{"email": "<x>@<y>"}`
/// is a validation error.
// Unparseable JSON and non-string emails deliberately get the 400 body, not
// the generic 500.
fn parse_email(body: &[u8]) -> Result<String, AppError> {
    let payload: SubscribePayload = serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "unparseable subscribe payload");
        invalid_email()
    })?;

    payload.validate().map_err(|_| invalid_email())?;

    payload.email.ok_or_else(invalid_email)
}

#[debug_handler]
async fn subscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, AppError> {
    let identifier = client_identifier(&headers);

    match state
        .stores
        .rate_limiter
        .check(&SUBSCRIBE_WINDOW, &identifier)
        .await
    {
        Ok(RateLimitResult::Allowed(_)) => {}
        Ok(RateLimitResult::Exceeded(count)) => {
            tracing::warn!(%identifier, count, "subscribe rate limit exceeded");
            return Err(AppError::External(
                StatusCode::TOO_MANY_REQUESTS,
                RATE_LIMITED_MESSAGE,
            ));
        }
        Err(err) if state.config.rate_limit_fail_open => {
            tracing::warn!(%identifier, error = ?err, "rate limiter unavailable, allowing request");
        }
        Err(err) => {
            return Err(AppError::Internal(err.context("rate limiter unavailable")));
        }
    }

    // Oversized or unreadable bodies share the validation response.
    let body = body.map_err(|rejection| {
        tracing::debug!(status = %rejection.status(), "unreadable subscribe body");
        invalid_email()
    })?;
    let email = parse_email(&body)?;

    match state.repos.subscribers.insert(&email).await {
        InsertOutcome::Inserted(subscriber) => {
            tracing::info!(subscriber_id = %subscriber.id, email = %email, "email subscribed");
        }
        InsertOutcome::AlreadyExists => {
            tracing::info!(email = %email, "email already subscribed");
        }
        InsertOutcome::Failed(err) => {
            return Err(AppError::Internal(err.context("failed to save subscriber")));
        }
    }

    Ok(Json(SubscribeResponse::subscribed()))
}
