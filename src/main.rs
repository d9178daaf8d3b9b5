//! FieldOps Backend Server
//!
//! Backend for field-service jobs performed by traveling technicians:
//! service lifecycle with distance and material ledgers, billing totals,
//! catalogs, and an offline sync queue.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use fieldops_api::{
    configure_auth, configure_cities, configure_dashboard, configure_materials,
    configure_services, configure_sync, AppCatalog, AppLifecycle, AppSyncManager,
};
use fieldops_auth::{JwtService, PasswordService};
use fieldops_cache::RedisCache;
use fieldops_core::config::AppConfig;
use fieldops_db::{
    create_pool, PgCityRepository, PgMaterialRepository, PgServiceMaterialRepository,
    PgServiceRepository, PgSyncQueueRepository,
};
use fieldops_services::{CatalogService, LifecycleNotifier, ServiceLifecycle, SyncManager};
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Health check endpoint
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "fieldops-backend",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Configure API routes
fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            .configure(configure_auth)
            .configure(configure_services)
            .configure(configure_sync)
            .configure(configure_cities)
            .configure(configure_materials)
            .configure(configure_dashboard),
    );
}

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "fieldops_backend={},fieldops_api={},fieldops_services={},fieldops_db={},actix_web=info,sqlx=warn",
            log_level, log_level, log_level, log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting FieldOps Backend v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().expect("Failed to load configuration");

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections))
        .await
        .expect("Failed to create database pool");

    // The catalog cache is an accelerator; the server runs without it
    let cache = match RedisCache::new(&config.redis.url).await {
        Ok(cache) => {
            info!("Redis catalog cache connected");
            Some(Arc::new(cache))
        }
        Err(e) => {
            warn!("Redis unavailable, catalog cache disabled: {}", e);
            None
        }
    };

    let jwt_service = Arc::new(JwtService::new(
        &config.auth.jwt_secret,
        config.auth.jwt_expiration_minutes * 60,
    ));
    let password_service = Arc::new(PasswordService::new());

    let service_repo = Arc::new(PgServiceRepository::new(pool.clone()));
    let city_repo = Arc::new(PgCityRepository::new(pool.clone()));
    let material_repo = Arc::new(PgMaterialRepository::new(pool.clone()));
    let line_repo = Arc::new(PgServiceMaterialRepository::new(pool.clone()));
    let sync_repo = Arc::new(PgSyncQueueRepository::new(pool.clone()));

    let notifier = LifecycleNotifier::spawn();

    let lifecycle: Arc<AppLifecycle> = Arc::new(ServiceLifecycle::new(
        service_repo,
        city_repo.clone(),
        material_repo.clone(),
        line_repo,
        notifier,
    ));
    let catalog: Arc<AppCatalog> = Arc::new(CatalogService::new(city_repo, material_repo, cache));
    let sync_manager: Arc<AppSyncManager> = Arc::new(SyncManager::new(
        sync_repo,
        config.billing.sync_retention_days,
        config.billing.sync_pending_limit,
    ));

    let cors_origins = env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string());

    let bind_addr = config.server_addr();
    let workers = config.server.workers;
    info!("Starting HTTP server on {} with {} workers", bind_addr, workers);

    HttpServer::new(move || {
        let cors_origins_inner = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                let origins: Vec<&str> = cors_origins_inner.split(',').collect();
                if let Ok(origin_str) = origin.to_str() {
                    origins.iter().any(|o| o.trim() == origin_str)
                } else {
                    false
                }
            })
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
                header::COOKIE,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(jwt_service.clone()))
            .app_data(web::Data::new(password_service.clone()))
            .app_data(web::Data::new(lifecycle.clone()))
            .app_data(web::Data::new(catalog.clone()))
            .app_data(web::Data::new(sync_manager.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::Logger::new("%a \"%r\" %s %b %Dms"))
            .wrap(middleware::NormalizePath::trim())
            .configure(configure_routes)
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await
}
