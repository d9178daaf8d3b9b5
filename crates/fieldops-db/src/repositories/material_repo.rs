//! Material catalog repository implementation

use fieldops_core::{
    models::Material,
    traits::{MaterialRepository, Repository},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};

const MATERIAL_COLUMNS: &str =
    "id, name, description, price, unit, is_active, created_at, updated_at";

/// PostgreSQL implementation of MaterialRepository
pub struct PgMaterialRepository {
    pool: PgPool,
}

impl PgMaterialRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Material, i32> for PgMaterialRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i32) -> AppResult<Option<Material>> {
        debug!("Finding material by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, MaterialRow>(&format!(
            "SELECT {} FROM materials WHERE id = $1",
            MATERIAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding material {}: {}", id, e);
            AppError::Database(format!("Failed to find material: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<Material>> {
        let rows = sqlx::query_as::<sqlx::Postgres, MaterialRow>(&format!(
            "SELECT {} FROM materials ORDER BY name LIMIT $1 OFFSET $2",
            MATERIAL_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding materials: {}", e);
            AppError::Database(format!("Failed to fetch materials: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM materials")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting materials: {}", e);
                AppError::Database(format!("Failed to count materials: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, entity: &Material) -> AppResult<Material> {
        debug!("Creating material: {}", entity.name);

        let row = sqlx::query_as::<sqlx::Postgres, MaterialRow>(&format!(
            r#"
            INSERT INTO materials (name, description, price, unit, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            MATERIAL_COLUMNS
        ))
        .bind(&entity.name)
        .bind(&entity.description)
        .bind(entity.price)
        .bind(&entity.unit)
        .bind(entity.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating material: {}", e);
            AppError::Database(format!("Failed to create material: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &Material) -> AppResult<Material> {
        debug!("Updating material: {}", entity.id);

        let row = sqlx::query_as::<sqlx::Postgres, MaterialRow>(&format!(
            r#"
            UPDATE materials
            SET name = $2, description = $3, price = $4, unit = $5,
                is_active = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            MATERIAL_COLUMNS
        ))
        .bind(entity.id)
        .bind(&entity.name)
        .bind(&entity.description)
        .bind(entity.price)
        .bind(&entity.unit)
        .bind(entity.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating material {}: {}", entity.id, e);
            AppError::Database(format!("Failed to update material: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i32) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM materials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting material {}: {}", id, e);
                AppError::Database(format!("Failed to delete material: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl MaterialRepository for PgMaterialRepository {
    #[instrument(skip(self))]
    async fn find_active(&self, limit: i64, offset: i64) -> AppResult<Vec<Material>> {
        debug!("Finding active materials");

        let rows = sqlx::query_as::<sqlx::Postgres, MaterialRow>(&format!(
            "SELECT {} FROM materials WHERE is_active = true ORDER BY name LIMIT $1 OFFSET $2",
            MATERIAL_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding active materials: {}", e);
            AppError::Database(format!("Failed to fetch materials: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct MaterialRow {
    id: i32,
    name: String,
    description: Option<String>,
    price: Decimal,
    unit: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MaterialRow> for Material {
    fn from(row: MaterialRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price,
            unit: row.unit,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
