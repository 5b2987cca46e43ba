//! Health handler

use crate::dto::HealthResponse;
use actix_web::{web, HttpResponse};
use ringline_services::CallRequestService;
use std::sync::Arc;

/// GET /api/v1/health
pub async fn health_check(service: web::Data<Arc<CallRequestService>>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: "ringline".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        stale_policy: service.policy_name().to_string(),
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check));
}
