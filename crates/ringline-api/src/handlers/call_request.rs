//! Call request handlers
//!
//! HTTP handlers for booking, resolving and following call requests.

use crate::dto::call_request::{CallRequestCreateRequest, CallRequestResponse};
use crate::dto::ApiResponse;
use actix_web::{web, HttpResponse};
use ringline_auth::{AuthenticatedUser, CallEligibleBroadcaster};
use ringline_core::AppError;
use ringline_services::CallRequestService;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

type Service = web::Data<Arc<CallRequestService>>;

/// Book a call with a broadcaster
///
/// POST /api/v1/call-requests
#[instrument(skip(service, user, req))]
pub async fn book_call(
    service: Service,
    user: AuthenticatedUser,
    req: web::Json<CallRequestCreateRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Call request validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let call = service.book(&user.principal, req.into_inner().into()).await?;
    info!(call_request_id = %call.id, caller_id = %call.caller_id, "Call booked");

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        CallRequestResponse::from(call),
        "Call request placed",
    )))
}

/// Ringing requests for the authenticated broadcaster, newest first
///
/// GET /api/v1/call-requests/incoming
#[instrument(skip(service, broadcaster))]
pub async fn list_incoming(
    service: Service,
    broadcaster: CallEligibleBroadcaster,
) -> Result<HttpResponse, AppError> {
    let calls = service.incoming(&broadcaster.principal).await?;
    debug!(count = calls.len(), "Listed incoming call requests");

    let data: Vec<CallRequestResponse> = calls.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
}

/// Recent requests placed by the authenticated caller
///
/// GET /api/v1/call-requests/outgoing
#[instrument(skip(service, user))]
pub async fn list_outgoing(service: Service, user: AuthenticatedUser) -> Result<HttpResponse, AppError> {
    let calls = service.outgoing(&user.principal).await?;

    let data: Vec<CallRequestResponse> = calls.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
}

/// GET /api/v1/call-requests/{id}
#[instrument(skip(service, user))]
pub async fn get_call_request(
    service: Service,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let call = service.get(&user.principal, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(CallRequestResponse::from(call))))
}

/// Session opened by an accepted request
///
/// GET /api/v1/call-requests/{id}/session
#[instrument(skip(service, user))]
pub async fn get_session(
    service: Service,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let session = service.session_for(&user.principal, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(session)))
}

/// Accept a ringing request and open its session
///
/// POST /api/v1/call-requests/{id}/accept
#[instrument(skip(service, broadcaster))]
pub async fn accept_call(
    service: Service,
    broadcaster: CallEligibleBroadcaster,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let outcome = service.accept(&broadcaster.principal, path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(outcome, "Call accepted")))
}

/// POST /api/v1/call-requests/{id}/reject
#[instrument(skip(service, broadcaster))]
pub async fn reject_call(
    service: Service,
    broadcaster: CallEligibleBroadcaster,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let call = service.reject(&broadcaster.principal, path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        CallRequestResponse::from(call),
        "Call rejected",
    )))
}

/// Reject a ringing request and report the caller
///
/// POST /api/v1/call-requests/{id}/ban
#[instrument(skip(service, broadcaster))]
pub async fn ban_caller(
    service: Service,
    broadcaster: CallEligibleBroadcaster,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let outcome = service.ban(&broadcaster.principal, path.into_inner()).await?;

    let message = match &outcome.warning {
        Some(_) => "Caller banned; report not filed",
        None => "Caller banned and reported",
    };
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(outcome, message)))
}

/// Withdraw a ringing request
///
/// POST /api/v1/call-requests/{id}/cancel
#[instrument(skip(service, user))]
pub async fn cancel_call(
    service: Service,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let call = service.cancel(&user.principal, path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        CallRequestResponse::from(call),
        "Call cancelled",
    )))
}

/// Configure call request routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/call-requests")
            .route("", web::post().to(book_call))
            .route("/incoming", web::get().to(list_incoming))
            .route("/outgoing", web::get().to(list_outgoing))
            .route("/{id}", web::get().to(get_call_request))
            .route("/{id}/session", web::get().to(get_session))
            .route("/{id}/accept", web::post().to(accept_call))
            .route("/{id}/reject", web::post().to(reject_call))
            .route("/{id}/ban", web::post().to(ban_caller))
            .route("/{id}/cancel", web::post().to(cancel_call)),
    );
}
