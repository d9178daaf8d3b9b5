//! Repository implementations for PostgreSQL

pub mod city_repo;
pub mod material_repo;
pub mod service_material_repo;
pub mod service_repo;
pub mod sync_repo;
pub mod user_repo;

pub use city_repo::PgCityRepository;
pub use material_repo::PgMaterialRepository;
pub use service_material_repo::PgServiceMaterialRepository;
pub use service_repo::PgServiceRepository;
pub use sync_repo::PgSyncQueueRepository;
pub use user_repo::PgUserRepository;
