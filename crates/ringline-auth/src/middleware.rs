//! Actix-web request extractors
//!
//! `AuthenticatedUser` resolves the bearer token into a `Principal`;
//! `CallEligibleBroadcaster` additionally requires an approved broadcaster.
//! Both read the `web::Data<Arc<JwtService>>` registered on the app.

use crate::jwt::JwtService;
use crate::Claims;
use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use ringline_core::error::AppError;
use ringline_core::models::Principal;
use ringline_core::AppResult;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Cookie carrying the token for browser clients that cannot set headers
pub const TOKEN_COOKIE: &str = "token";

/// Bearer header first, then the token cookie
fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| req.cookie(TOKEN_COOKIE).map(|c| c.value().to_string()))
}

/// Any signed-in user: caller, broadcaster or admin
///
/// ```no_run
/// use actix_web::HttpResponse;
/// use ringline_auth::middleware::AuthenticatedUser;
///
/// async fn whoami(user: AuthenticatedUser) -> HttpResponse {
///     HttpResponse::Ok().json(serde_json::json!({ "user_id": user.user_id() }))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub principal: Principal,
    pub claims: Claims,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> Uuid {
        self.principal.user_id
    }

    fn from_http(req: &HttpRequest) -> AppResult<Self> {
        let tokens = req.app_data::<web::Data<Arc<JwtService>>>().ok_or_else(|| {
            warn!("No JwtService registered on the app");
            AppError::Unauthorized("Authentication is not configured".to_string())
        })?;

        let token = bearer_token(req)
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

        let claims = tokens.verify(&token)?;
        Ok(Self {
            principal: claims.principal(),
            claims,
        })
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_http(req).map_err(Into::into))
    }
}

/// Broadcaster approved to receive calls
///
/// Rejects with `403 not_call_eligible` otherwise.
#[derive(Debug, Clone)]
pub struct CallEligibleBroadcaster(pub AuthenticatedUser);

impl std::ops::Deref for CallEligibleBroadcaster {
    type Target = AuthenticatedUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for CallEligibleBroadcaster {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = AuthenticatedUser::from_http(req).and_then(|user| {
            if !user.principal.can_receive_calls() {
                debug!(user_id = %user.user_id(), role = %user.principal.role, "Not call-eligible");
                return Err(AppError::NotCallEligible(user.user_id()));
            }
            Ok(CallEligibleBroadcaster(user))
        });

        ready(result.map_err(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{cookie::Cookie, test, App};

    fn tokens() -> Arc<JwtService> {
        Arc::new(JwtService::new("middleware-test-secret", 3600))
    }

    async fn status_of(tokens: Arc<JwtService>, req: test::TestRequest) -> StatusCode {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(tokens))
                .route(
                    "/outgoing",
                    web::get().to(|user: AuthenticatedUser| async move { user.user_id().to_string() }),
                )
                .route(
                    "/incoming",
                    web::get().to(|b: CallEligibleBroadcaster| async move { b.user_id().to_string() }),
                ),
        )
        .await;

        test::call_service(&app, req.to_request()).await.status()
    }

    #[actix_web::test]
    async fn test_caller_authenticates_with_header_or_cookie() {
        let tokens = tokens();
        let token = tokens.issue(&Principal::viewer(Uuid::new_v4())).unwrap();

        let by_header = test::TestRequest::get()
            .uri("/outgoing")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)));
        assert_eq!(status_of(tokens.clone(), by_header).await, StatusCode::OK);

        let by_cookie = test::TestRequest::get()
            .uri("/outgoing")
            .cookie(Cookie::new(TOKEN_COOKIE, token));
        assert_eq!(status_of(tokens, by_cookie).await, StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_missing_or_bad_token_is_unauthorized() {
        let missing = test::TestRequest::get().uri("/outgoing");
        assert_eq!(status_of(tokens(), missing).await, StatusCode::UNAUTHORIZED);

        let garbled = test::TestRequest::get()
            .uri("/outgoing")
            .insert_header((header::AUTHORIZATION, "Bearer garbled"));
        assert_eq!(status_of(tokens(), garbled).await, StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_incoming_requires_approved_broadcaster() {
        let tokens = tokens();

        for (principal, expected) in [
            (Principal::broadcaster(Uuid::new_v4(), true), StatusCode::OK),
            (Principal::broadcaster(Uuid::new_v4(), false), StatusCode::FORBIDDEN),
            (Principal::viewer(Uuid::new_v4()), StatusCode::FORBIDDEN),
        ] {
            let token = tokens.issue(&principal).unwrap();
            let req = test::TestRequest::get()
                .uri("/incoming")
                .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)));
            assert_eq!(status_of(tokens.clone(), req).await, expected);
        }
    }
}
