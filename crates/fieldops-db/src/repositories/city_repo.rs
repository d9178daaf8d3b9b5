//! City catalog repository implementation

use fieldops_core::{
    models::City,
    traits::{CityRepository, Repository},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of CityRepository
pub struct PgCityRepository {
    pool: PgPool,
}

impl PgCityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<City, i32> for PgCityRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i32) -> AppResult<Option<City>> {
        debug!("Finding city by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, CityRow>(
            "SELECT id, name, state, km_rate, is_active, created_at, updated_at
             FROM cities WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding city {}: {}", id, e);
            AppError::Database(format!("Failed to find city: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<City>> {
        let rows = sqlx::query_as::<sqlx::Postgres, CityRow>(
            "SELECT id, name, state, km_rate, is_active, created_at, updated_at
             FROM cities ORDER BY name LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding cities: {}", e);
            AppError::Database(format!("Failed to fetch cities: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cities")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting cities: {}", e);
                AppError::Database(format!("Failed to count cities: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, entity: &City) -> AppResult<City> {
        debug!("Creating city: {}", entity.name);

        let row = sqlx::query_as::<sqlx::Postgres, CityRow>(
            r#"
            INSERT INTO cities (name, state, km_rate, is_active)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, state, km_rate, is_active, created_at, updated_at
            "#,
        )
        .bind(&entity.name)
        .bind(&entity.state)
        .bind(entity.km_rate)
        .bind(entity.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating city: {}", e);
            AppError::Database(format!("Failed to create city: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &City) -> AppResult<City> {
        debug!("Updating city: {}", entity.id);

        let row = sqlx::query_as::<sqlx::Postgres, CityRow>(
            r#"
            UPDATE cities
            SET name = $2, state = $3, km_rate = $4, is_active = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, state, km_rate, is_active, created_at, updated_at
            "#,
        )
        .bind(entity.id)
        .bind(&entity.name)
        .bind(&entity.state)
        .bind(entity.km_rate)
        .bind(entity.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating city {}: {}", entity.id, e);
            AppError::Database(format!("Failed to update city: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i32) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM cities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting city {}: {}", id, e);
                AppError::Database(format!("Failed to delete city: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CityRepository for PgCityRepository {
    #[instrument(skip(self))]
    async fn find_by_name(&self, name: &str) -> AppResult<Option<City>> {
        debug!("Finding city by name: {}", name);

        let result = sqlx::query_as::<sqlx::Postgres, CityRow>(
            "SELECT id, name, state, km_rate, is_active, created_at, updated_at
             FROM cities WHERE LOWER(name) = LOWER($1)",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding city by name: {}", e);
            AppError::Database(format!("Failed to find city: {}", e))
        })?;

        Ok(result.map(Into::into))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CityRow {
    id: i32,
    name: String,
    state: String,
    km_rate: Decimal,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CityRow> for City {
    fn from(row: CityRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            state: row.state,
            km_rate: row.km_rate,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
