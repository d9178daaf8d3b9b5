//! Catalog lookup service
//!
//! Read-mostly access to the city and material catalogs with Redis
//! caching in front of the database. The cache is optional and purely an
//! accelerator: any cache failure is logged and the lookup falls through
//! to the repository.

use fieldops_cache::keys;
use fieldops_core::{
    models::{City, Material},
    traits::{CacheService, CityRepository, MaterialRepository, Pagination},
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Catalog service with optional caching
pub struct CatalogService<C, M, K>
where
    C: CityRepository,
    M: MaterialRepository,
    K: CacheService,
{
    city_repo: Arc<C>,
    material_repo: Arc<M>,
    cache: Option<Arc<K>>,
}

impl<C, M, K> CatalogService<C, M, K>
where
    C: CityRepository,
    M: MaterialRepository,
    K: CacheService,
{
    /// Create a new catalog service
    ///
    /// Pass `None` for the cache to run straight off the database.
    pub fn new(city_repo: Arc<C>, material_repo: Arc<M>, cache: Option<Arc<K>>) -> Self {
        Self {
            city_repo,
            material_repo,
            cache,
        }
    }

    /// Try to read a cached value, degrading to a miss on any cache error
    async fn get_from_cache<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let cache = self.cache.as_ref()?;

        match cache.get::<T>(key).await {
            Ok(value) => {
                if value.is_some() {
                    debug!(key, "catalog cache hit");
                }
                value
            }
            Err(e) => {
                warn!(key, error = %e, "catalog cache read failed");
                None
            }
        }
    }

    /// Store a value in cache; failures are logged and swallowed
    async fn store_in_cache<T: serde::Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) {
        if let Some(cache) = self.cache.as_ref() {
            if let Err(e) = cache.set(key, value, ttl_secs).await {
                warn!(key, error = %e, "catalog cache write failed");
            }
        }
    }

    /// Fetch a city by id
    #[instrument(skip(self))]
    pub async fn city(&self, id: i32) -> AppResult<City> {
        let key = keys::city_key(id);

        if let Some(city) = self.get_from_cache::<City>(&key).await {
            return Ok(city);
        }

        let city = self
            .city_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::CityNotFound(id.to_string()))?;

        self.store_in_cache(&key, &city, keys::CITY_TTL_SECS).await;
        Ok(city)
    }

    /// Fetch a city by name, case-insensitively
    #[instrument(skip(self))]
    pub async fn city_by_name(&self, name: &str) -> AppResult<City> {
        let key = keys::city_name_key(name);

        if let Some(city) = self.get_from_cache::<City>(&key).await {
            return Ok(city);
        }

        let city = self
            .city_repo
            .find_by_name(name)
            .await?
            .ok_or_else(|| AppError::CityNotFound(name.to_string()))?;

        self.store_in_cache(&key, &city, keys::CITY_TTL_SECS).await;
        Ok(city)
    }

    /// List cities, uncached
    ///
    /// The listing is an admin/setup surface; only point lookups are hot
    /// enough to cache.
    #[instrument(skip(self))]
    pub async fn list_cities(&self, pagination: &Pagination) -> AppResult<Vec<City>> {
        self.city_repo
            .find_all(pagination.limit(), pagination.offset())
            .await
    }

    /// Fetch a material by id
    #[instrument(skip(self))]
    pub async fn material(&self, id: i32) -> AppResult<Material> {
        let key = keys::material_key(id);

        if let Some(material) = self.get_from_cache::<Material>(&key).await {
            return Ok(material);
        }

        let material = self
            .material_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::MaterialNotFound(id.to_string()))?;

        self.store_in_cache(&key, &material, keys::MATERIAL_TTL_SECS)
            .await;
        Ok(material)
    }

    /// List active catalog materials
    ///
    /// The full active list is what technicians pull on app start, so it
    /// is cached as one value.
    #[instrument(skip(self))]
    pub async fn active_materials(&self, pagination: &Pagination) -> AppResult<Vec<Material>> {
        // Only the unpaginated first page is cached; deep pages go to the DB
        let cacheable = pagination.offset() == 0;

        if cacheable {
            if let Some(materials) = self
                .get_from_cache::<Vec<Material>>(keys::ACTIVE_MATERIALS_KEY)
                .await
            {
                return Ok(materials
                    .into_iter()
                    .take(pagination.limit() as usize)
                    .collect());
            }
        }

        let materials = self
            .material_repo
            .find_active(pagination.limit(), pagination.offset())
            .await?;

        if cacheable {
            self.store_in_cache(
                keys::ACTIVE_MATERIALS_KEY,
                &materials,
                keys::ACTIVE_MATERIALS_TTL_SECS,
            )
            .await;
        }

        Ok(materials)
    }
}
