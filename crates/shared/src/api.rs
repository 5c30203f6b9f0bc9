//! Shared API request/response types for the subscription endpoint.

use garde::Validate;
use serde::{Deserialize, Serialize};

/// Returned for both new and repeated subscriptions.
pub const SUBSCRIBED_MESSAGE: &str = "Successfully subscribed!";
/// Missing or malformed email.
pub const INVALID_EMAIL_MESSAGE: &str = "Please enter a valid email address.";
/// Caller exceeded the subscription rate limit.
pub const RATE_LIMITED_MESSAGE: &str = "Please wait a moment before trying again.";
/// Any server-side failure. Never carries internal detail.
pub const SAVE_FAILED_MESSAGE: &str = "Failed to save email. Please try again.";

/// Request to add an email address to the launch list.
///
/// Validation is intentionally loose: any string containing `@` is accepted.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SubscribePayload {
    #[garde(required, contains("@"))]
    #[serde(default)]
    pub email: Option<String>,
}

/// Returned after a successful (or already existing) subscription.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscribeResponse {
    pub success: bool,
    pub message: String,
}

impl SubscribeResponse {
    pub fn subscribed() -> Self {
        Self {
            success: true,
            message: SUBSCRIBED_MESSAGE.to_string(),
        }
    }
}

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}
