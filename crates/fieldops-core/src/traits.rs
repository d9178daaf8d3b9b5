//! Common traits for repositories
//!
//! Defines abstractions for database access so business logic can be
//! tested against in-memory mocks.

use crate::error::AppError;
use crate::models::{City, Material, Service, ServiceMaterial, ServiceStatus, SyncEntry, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};

/// Generic repository trait for CRUD operations
#[async_trait]
pub trait Repository<T, ID>: Send + Sync {
    /// Find entity by ID
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, AppError>;

    /// Find all entities with pagination
    async fn find_all(&self, limit: i64, offset: i64) -> Result<Vec<T>, AppError>;

    /// Count total entities
    async fn count(&self) -> Result<i64, AppError>;

    /// Create a new entity
    async fn create(&self, entity: &T) -> Result<T, AppError>;

    /// Update an existing entity
    async fn update(&self, entity: &T) -> Result<T, AppError>;

    /// Delete entity by ID
    async fn delete(&self, id: ID) -> Result<bool, AppError>;
}

/// Explicit allow-listed patch applied to a service
///
/// Request bodies are decoded into this struct and validated field by
/// field; an arbitrary key/value map is never applied to a record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServicePatch {
    pub address: Option<String>,
    pub city_id: Option<i32>,
    pub location_lat: Option<Decimal>,
    pub location_lng: Option<Decimal>,
    pub base_km: Option<Decimal>,
}

impl ServicePatch {
    /// Check whether the patch carries any change at all
    pub fn is_empty(&self) -> bool {
        self.address.is_none()
            && self.city_id.is_none()
            && self.location_lat.is_none()
            && self.location_lng.is_none()
            && self.base_km.is_none()
    }
}

/// Filters for the cross-job service listing
#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
    pub status: Option<ServiceStatus>,
    pub user_id: Option<i32>,
    pub city_name: Option<String>,
    pub technician_name: Option<String>,
    pub address: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

/// Service repository trait with specialized methods
#[async_trait]
pub trait ServiceRepository: Repository<Service, i32> {
    /// List services matching a filter, newest first
    async fn list_filtered(
        &self,
        filter: &ServiceFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Service>, i64), AppError>;

    /// List a user's services by status, newest first
    async fn find_by_user(
        &self,
        user_id: i32,
        status: Option<ServiceStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Service>, i64), AppError>;

    /// Run a mutation against the job row under a row-level lock
    ///
    /// The row is re-read `FOR UPDATE` inside a transaction, the closure
    /// applied, and the modified row written back before commit, so two
    /// writers on the same job serialize instead of clobbering each other.
    /// Returns `Ok(None)` when the job does not exist; a closure error
    /// rolls the transaction back.
    async fn update_locked(
        &self,
        id: i32,
        apply: &(dyn for<'a> Fn(&'a mut Service) -> Result<(), AppError> + Send + Sync),
    ) -> Result<Option<Service>, AppError>;

    /// Persist recomputed billing totals
    async fn update_totals(
        &self,
        id: i32,
        materials_value: Decimal,
        total_value: Decimal,
    ) -> Result<(), AppError>;

    /// Delete a service and all of its material lines atomically
    async fn delete_with_materials(&self, id: i32) -> Result<bool, AppError>;

    /// Sum of accumulated km over a user's services
    async fn total_km_for_user(&self, user_id: i32) -> Result<Decimal, AppError>;

    /// A user's services touched at or after the given instant
    ///
    /// Backs the sync pull snapshot; ordering is oldest change first.
    async fn find_updated_since(
        &self,
        user_id: i32,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Service>, AppError>;
}

/// City catalog repository
#[async_trait]
pub trait CityRepository: Repository<City, i32> {
    /// Find a city by name
    async fn find_by_name(&self, name: &str) -> Result<Option<City>, AppError>;
}

/// Material catalog repository
#[async_trait]
pub trait MaterialRepository: Repository<Material, i32> {
    /// List only active catalog entries
    async fn find_active(&self, limit: i64, offset: i64) -> Result<Vec<Material>, AppError>;
}

/// Service material line repository
#[async_trait]
pub trait ServiceMaterialRepository: Repository<ServiceMaterial, i32> {
    /// Find the unique line for a (service, material) pair
    async fn find_by_service_and_material(
        &self,
        service_id: i32,
        material_id: i32,
    ) -> Result<Option<ServiceMaterial>, AppError>;

    /// All lines attached to a service
    async fn find_by_service(&self, service_id: i32) -> Result<Vec<ServiceMaterial>, AppError>;
}

/// User repository trait with specialized methods
#[async_trait]
pub trait UserRepository: Repository<User, i32> {
    /// Find user by email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
}

/// Sync queue repository
///
/// Append-only from the producer side; the consumer only flips the synced
/// flag. Unsynced rows are never deleted.
#[async_trait]
pub trait SyncQueueRepository: Send + Sync {
    /// Append a new pending entry
    async fn enqueue(&self, entry: &SyncEntry) -> Result<SyncEntry, AppError>;

    /// Pending entries for a user in creation (FIFO) order
    async fn find_pending(&self, user_id: i32, limit: i64) -> Result<Vec<SyncEntry>, AppError>;

    /// Mark entries synced; already-synced ids are a no-op
    async fn mark_synced(&self, ids: &[i64]) -> Result<u64, AppError>;

    /// Delete synced entries created before the cutoff
    async fn delete_synced_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Cache service abstraction
///
/// Used for read-mostly catalog data (cities, materials). Cache failures
/// degrade to database reads, never to request failures.
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Get a value from cache and deserialize it
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError>;

    /// Delete a key from cache
    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    /// Check if a key exists in cache
    async fn exists(&self, key: &str) -> Result<bool, AppError>;
}

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 1000),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}
