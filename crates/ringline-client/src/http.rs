//! HTTP signaling backend
//!
//! Talks to the `/api/v1/call-requests` endpoints with a bearer token.
//! Error bodies are mapped by their `error` code first, so a server-side
//! `session_creation_failed` or `billing_error` surfaces as the same variant
//! the in-process backend returns. Connection failures and any other 5xx map
//! to `StoreUnavailable` so the polling loops treat them as transient.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use ringline_core::{
    models::{CallRequest, NewCallRequest},
    AppError, AppResult,
};
use ringline_services::{AcceptOutcome, BanOutcome};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::backend::SignalingBackend;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

pub struct HttpBackend {
    http_client: Client,
    base_url: String,
    token: String,
}

impl HttpBackend {
    /// # Arguments
    ///
    /// * `base_url` - Server root, e.g. "http://127.0.0.1:8080"
    /// * `token` - JWT issued for the signed-in user
    /// * `timeout_ms` - Per-request timeout
    pub fn new(base_url: &str, token: &str, timeout_ms: u64) -> AppResult<Self> {
        let http_client = ClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/call-requests{}", self.base_url, path)
    }

    /// `subject` is the call request the path addresses, if any
    async fn call<B, T>(
        &self,
        method: Method,
        path: &str,
        subject: Option<Uuid>,
        body: Option<&B>,
    ) -> AppResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned + Send,
    {
        let mut request = self
            .http_client
            .request(method.clone(), self.url(path))
            .bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!("{} {} failed: {}", method, path, e);
            AppError::StoreUnavailable(format!("request failed: {}", e))
        })?;

        let status = response.status();
        debug!("{} {} -> {}", method, path, status);

        if status.is_success() {
            let envelope: Envelope<T> = response
                .json()
                .await
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            return Ok(envelope.data);
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        Err(error_from_status(status, body, subject))
    }

    async fn post<T: DeserializeOwned + Send>(&self, id: Uuid, action: &str) -> AppResult<T> {
        let path = format!("/{}/{}", id, action);
        match self.call::<(), T>(Method::POST, &path, Some(id), None).await {
            Err(AppError::Conflict(message)) => Err(self.stale_or(id, message).await),
            other => other,
        }
    }

    /// Turn a 409 into `StaleTransition` carrying the status that won
    async fn stale_or(&self, id: Uuid, message: String) -> AppError {
        match self.fetch(id).await {
            Ok(call) if !call.is_ringing() => AppError::stale(id, call.status),
            _ => AppError::Conflict(message),
        }
    }
}

/// Map an error response back onto `AppError`, by `error` code when the
/// server sent a known one and by status otherwise.
///
/// `call_already_resolved` stays a `Conflict`: the body does not say which
/// status won, so `post` refetches the record to build the stale error.
fn error_from_status(status: StatusCode, body: ErrorBody, subject: Option<Uuid>) -> AppError {
    let message = if body.message.is_empty() {
        status.to_string()
    } else {
        body.message
    };

    match (body.error.as_str(), subject) {
        ("session_creation_failed", Some(id)) => {
            return AppError::SessionCreationFailed {
                call_request_id: id,
                reason: message,
            }
        }
        ("call_request_not_found", Some(id)) => return AppError::CallRequestNotFound(id),
        ("billing_error", _) => return AppError::Billing(message),
        ("token_expired", _) => return AppError::TokenExpired,
        _ => {}
    }

    match status {
        StatusCode::BAD_REQUEST => AppError::Validation(message),
        StatusCode::UNAUTHORIZED => AppError::Unauthorized(message),
        StatusCode::FORBIDDEN => AppError::Forbidden(message),
        StatusCode::NOT_FOUND => match subject {
            Some(id) => AppError::CallRequestNotFound(id),
            None => AppError::NotFound(message),
        },
        StatusCode::CONFLICT => AppError::Conflict(message),
        s if s.is_server_error() => AppError::StoreUnavailable(message),
        _ => AppError::Internal(message),
    }
}

#[async_trait]
impl SignalingBackend for HttpBackend {
    #[instrument(skip(self, booking))]
    async fn book(&self, booking: NewCallRequest) -> AppResult<CallRequest> {
        self.call(Method::POST, "", None, Some(&booking)).await
    }

    async fn incoming(&self) -> AppResult<Vec<CallRequest>> {
        self.call::<(), _>(Method::GET, "/incoming", None, None).await
    }

    async fn fetch(&self, id: Uuid) -> AppResult<CallRequest> {
        self.call::<(), _>(Method::GET, &format!("/{}", id), Some(id), None)
            .await
    }

    #[instrument(skip(self))]
    async fn accept(&self, id: Uuid) -> AppResult<AcceptOutcome> {
        self.post(id, "accept").await
    }

    #[instrument(skip(self))]
    async fn reject(&self, id: Uuid) -> AppResult<CallRequest> {
        self.post(id, "reject").await
    }

    #[instrument(skip(self))]
    async fn ban(&self, id: Uuid) -> AppResult<BanOutcome> {
        self.post(id, "ban").await
    }

    #[instrument(skip(self))]
    async fn cancel(&self, id: Uuid) -> AppResult<CallRequest> {
        self.post(id, "cancel").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(error: &str) -> ErrorBody {
        ErrorBody {
            error: error.to_string(),
            message: "This call is no longer available".to_string(),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            error_from_status(StatusCode::CONFLICT, body("call_already_resolved"), None),
            AppError::Conflict(_)
        ));
        assert!(error_from_status(StatusCode::SERVICE_UNAVAILABLE, body("store_unavailable"), None)
            .is_transient());
        assert!(error_from_status(StatusCode::INTERNAL_SERVER_ERROR, body("database_error"), None)
            .is_transient());
        assert!(matches!(
            error_from_status(StatusCode::UNAUTHORIZED, body("token_expired"), None),
            AppError::TokenExpired
        ));
        assert!(matches!(
            error_from_status(StatusCode::FORBIDDEN, ErrorBody::default(), None),
            AppError::Forbidden(m) if m.contains("403")
        ));
    }

    #[test]
    fn test_accept_failures_keep_their_kind() {
        let id = Uuid::new_v4();

        let failed = error_from_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            body("session_creation_failed"),
            Some(id),
        );
        assert!(matches!(
            &failed,
            AppError::SessionCreationFailed { call_request_id, .. } if *call_request_id == id
        ));
        assert!(!failed.is_transient());

        let billing = error_from_status(StatusCode::INTERNAL_SERVER_ERROR, body("billing_error"), Some(id));
        assert!(matches!(billing, AppError::Billing(_)));
        assert!(!billing.is_transient());

        assert!(matches!(
            error_from_status(StatusCode::NOT_FOUND, body("call_request_not_found"), Some(id)),
            AppError::CallRequestNotFound(found) if found == id
        ));
    }

    #[test]
    fn test_urls() {
        let backend = HttpBackend::new("http://localhost:8080/", "t", 1000).unwrap();
        assert_eq!(
            backend.url("/incoming"),
            "http://localhost:8080/api/v1/call-requests/incoming"
        );
    }
}
