//! API layer for FieldOps
//!
//! HTTP handlers and DTOs for the service lifecycle, offline sync queue,
//! catalogs, and authentication.

pub mod dto;
pub mod handlers;

pub use dto::{ApiResponse, PaginationParams};

pub use handlers::{
    configure_auth, configure_cities, configure_dashboard, configure_materials, configure_services,
    configure_sync,
};

use fieldops_cache::RedisCache;
use fieldops_db::{
    PgCityRepository, PgMaterialRepository, PgServiceMaterialRepository, PgServiceRepository,
    PgSyncQueueRepository,
};
use fieldops_services::{CatalogService, ServiceLifecycle, SyncManager};

/// Lifecycle engine wired to the PostgreSQL repositories
pub type AppLifecycle = ServiceLifecycle<
    PgServiceRepository,
    PgCityRepository,
    PgMaterialRepository,
    PgServiceMaterialRepository,
>;

/// Catalog service wired to PostgreSQL + Redis
pub type AppCatalog = CatalogService<PgCityRepository, PgMaterialRepository, RedisCache>;

/// Sync manager wired to the PostgreSQL queue
pub type AppSyncManager = SyncManager<PgSyncQueueRepository>;
