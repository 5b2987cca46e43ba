//! Ringline server
//!
//! Serves the call request API and runs the stale request sweeper and the
//! session reconciler next to it.

use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpResponse, HttpServer};
use ringline_api::configure_api;
use ringline_auth::JwtService;
use ringline_core::AppConfig;
use ringline_db::{create_pool, ensure_schema, MemoryStore};
use ringline_services::{
    policy_from_config, CallRequestService, CommissionEarningsCalculator, EntityStores,
    SessionReconciler, StaleRequestSweeper,
};
use std::env;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "ringline={lvl},ringline_api={lvl},ringline_services={lvl},ringline_db={lvl},\
             billing_integrity=error,actix_web=info,sqlx=warn",
            lvl = log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

/// Pick the entity stores: Postgres when a URL is configured, memory otherwise
async fn build_stores(config: &AppConfig) -> anyhow::Result<EntityStores> {
    if config.database.url.is_some() {
        info!("Connecting to database...");
        let pool = create_pool(&config.database).await?;
        ensure_schema(&pool).await?;
        info!(
            "Database connection established with {} max connections",
            config.database.max_connections
        );

        Ok(EntityStores::postgres(pool))
    } else {
        warn!("No database URL configured; call requests live in memory only");
        Ok(EntityStores::memory(Arc::new(MemoryStore::new())))
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting Ringline v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;

    let jwt_service = Arc::new(JwtService::new(
        &config.auth.jwt_secret,
        config.auth.jwt_expiration_minutes * 60,
    ));

    let stores = build_stores(&config).await?;
    let earnings = Arc::new(CommissionEarningsCalculator::new(
        stores.commissions.clone(),
        config.billing.default_commission_rate,
    ));
    let policy = policy_from_config(&config.signaling);
    info!("Stale request policy: {}", policy.name());

    let service = Arc::new(CallRequestService::new(
        stores,
        earnings,
        policy,
        &config.signaling,
    ));

    let shutdown = CancellationToken::new();
    let sweeper = StaleRequestSweeper::new(service.clone(), config.signaling.sweep_interval())
        .spawn(shutdown.child_token());
    let reconciler =
        SessionReconciler::new(service.clone(), config.signaling.reconcile_interval())
            .spawn(shutdown.child_token());

    let cors_origins = env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string());

    let bind_addr = config.server_addr();
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, config.server.workers
    );

    let server_service = service.clone();
    let server = HttpServer::new(move || {
        let cors_origins_inner = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                origin
                    .to_str()
                    .map(|o| cors_origins_inner.split(',').any(|allowed| allowed.trim() == o))
                    .unwrap_or(false)
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
                header::COOKIE,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(jwt_service.clone()))
            .app_data(web::Data::new(server_service.clone()))
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_body",
                        "message": error_message,
                        "status": 400
                    })),
                )
                .into()
            }))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .configure(configure_api)
    })
    .workers(config.server.workers)
    .bind(&bind_addr)?
    .run();

    let result = server.await;

    info!("HTTP server stopped; stopping background tasks");
    shutdown.cancel();
    let _ = tokio::join!(sweeper, reconciler);

    result.map_err(Into::into)
}
