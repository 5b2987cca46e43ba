//! Unified error handling for Ringline
//!
//! A single error type covers store failures, authentication, validation and
//! the call signaling taxonomy (stale transitions, session creation failures).
//! It maps onto HTTP responses without leaking store details to end users.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::CallRequestStatus;

/// Every failure the workspace reports
#[derive(Error, Debug)]
pub enum AppError {
    // Entity store
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Entity store unavailable: {0}")]
    StoreUnavailable(String),

    // Caller identity
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("User {0} is not eligible to receive calls")]
    NotCallEligible(Uuid),

    // Signaling
    #[error("Call request not found: {0}")]
    CallRequestNotFound(Uuid),

    #[error("Call request {id} already resolved (status: {status})")]
    StaleTransition { id: Uuid, status: CallRequestStatus },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session creation failed for call request {call_request_id}: {reason}")]
    SessionCreationFailed { call_request_id: Uuid, reason: String },

    #[error("Billing error: {0}")]
    Billing(String),

    // Input
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // Process
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Audio device error: {0}")]
    Audio(String),
}

impl AppError {
    /// Shorthand for a stale transition on the given record
    pub fn stale(id: Uuid, status: CallRequestStatus) -> Self {
        AppError::StaleTransition { id, status }
    }

    /// HTTP status for this error. A lost race is 409.
    pub fn status_code(&self) -> StatusCode {
        use AppError::*;

        match self {
            Validation(_) | InvalidInput(_) => StatusCode::BAD_REQUEST,
            InvalidToken(_) | TokenExpired | Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Forbidden(_) | NotCallEligible(_) => StatusCode::FORBIDDEN,
            CallRequestNotFound(_) | SessionNotFound(_) | NotFound(_) => StatusCode::NOT_FOUND,
            StaleTransition { .. } | Conflict(_) => StatusCode::CONFLICT,
            StoreUnavailable(_) | Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
            Database(_) | SessionCreationFailed { .. } | Billing(_) | Internal(_) | Config(_)
            | Serialization(_) | Audio(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code, the `error` field of response bodies
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::TokenExpired => "token_expired",
            AppError::InvalidToken(_) => "invalid_token",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotCallEligible(_) => "not_call_eligible",
            AppError::CallRequestNotFound(_) => "call_request_not_found",
            AppError::StaleTransition { .. } => "call_already_resolved",
            AppError::SessionNotFound(_) => "session_not_found",
            AppError::SessionCreationFailed { .. } => "session_creation_failed",
            AppError::Billing(_) => "billing_error",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
            AppError::Audio(_) => "audio_error",
        }
    }

    /// Whether the failure is expected to clear on its own (next poll tick retries)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::StoreUnavailable(_) | AppError::Database(_) | AppError::Pool(_)
        )
    }

    /// Whether this is the "call already resolved" outcome of a lost race
    pub fn is_stale(&self) -> bool {
        matches!(self, AppError::StaleTransition { .. })
    }

    /// Message safe to show to an end user.
    ///
    /// Signaling and store failures collapse into generic wording; the raw
    /// detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::StaleTransition { .. } | AppError::CallRequestNotFound(_) => {
                "This call is no longer available".to_string()
            }
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::StoreUnavailable(_)
            | AppError::Internal(_)
            | AppError::Serialization(_)
            | AppError::Config(_)
            | AppError::Audio(_)
            | AppError::Billing(_) => "Service temporarily unavailable".to_string(),
            AppError::SessionCreationFailed { .. } => {
                "The call was accepted but the session could not be started yet".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.public_message(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let id = Uuid::new_v4();
        assert_eq!(
            AppError::stale(id, CallRequestStatus::Accepted).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::CallRequestNotFound(id).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::StoreUnavailable("timeout".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::NotCallEligible(id).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::stale(Uuid::nil(), CallRequestStatus::Banned).error_code(),
            "call_already_resolved"
        );
        assert_eq!(AppError::TokenExpired.error_code(), "token_expired");
    }

    #[test]
    fn test_public_message_hides_store_detail() {
        let err = AppError::Database("relation \"call_requests\" does not exist".into());
        assert!(!err.public_message().contains("call_requests"));
        assert!(err.is_transient());

        let stale = AppError::stale(Uuid::nil(), CallRequestStatus::Cancelled);
        assert_eq!(stale.public_message(), "This call is no longer available");
        assert!(stale.is_stale());
        assert!(!stale.is_transient());
    }

    #[test]
    fn test_public_message_per_failure() {
        let id = Uuid::new_v4();
        let unavailable = "Service temporarily unavailable";
        let cases = [
            (AppError::stale(id, CallRequestStatus::Rejected), "This call is no longer available"),
            (AppError::CallRequestNotFound(id), "This call is no longer available"),
            (
                AppError::SessionCreationFailed {
                    call_request_id: id,
                    reason: "sessions offline".into(),
                },
                "The call was accepted but the session could not be started yet",
            ),
            // Raised before the transition, so the call is still ringing
            (AppError::Billing("negative commission".into()), unavailable),
            (AppError::Database("deadlock".into()), unavailable),
            (AppError::Pool("timed out".into()), unavailable),
            (AppError::StoreUnavailable("timeout".into()), unavailable),
            (AppError::Internal("oops".into()), unavailable),
            (AppError::Serialization("eof".into()), unavailable),
            (AppError::Config("missing".into()), unavailable),
            (AppError::Audio("no device".into()), unavailable),
        ];

        for (err, expected) in cases {
            assert_eq!(err.public_message(), expected, "{:?}", err);
        }

        let forbidden = AppError::NotCallEligible(id);
        assert_eq!(forbidden.public_message(), forbidden.to_string());
    }
}
