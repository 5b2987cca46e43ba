//! API layer for Ringline
//!
//! HTTP handlers for booking and resolving call requests. Mount them with
//! [`configure_api`] under an app that carries `web::Data<Arc<JwtService>>`
//! and `web::Data<Arc<CallRequestService>>`.

#![forbid(unsafe_code)]

use actix_web::web;

pub mod dto;
pub mod handlers;

pub use dto::{ApiResponse, CallRequestCreateRequest, CallRequestResponse, HealthResponse};
pub use handlers::{configure_call_requests, configure_health};

/// Mount every endpoint under `/api/v1`
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(configure_health)
            .configure(configure_call_requests),
    );
}
