//! Service material line repository implementation
//!
//! A unique constraint on (service_id, material_id) backs the one-line-per-
//! material rule; the accumulate-on-duplicate decision itself lives in the
//! lifecycle service.

use fieldops_core::{
    models::ServiceMaterial,
    traits::{Repository, ServiceMaterialRepository},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};

const LINE_COLUMNS: &str =
    "id, service_id, material_id, quantity, unit_price, total_price, created_at, updated_at";

/// PostgreSQL implementation of ServiceMaterialRepository
pub struct PgServiceMaterialRepository {
    pool: PgPool,
}

impl PgServiceMaterialRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<ServiceMaterial, i32> for PgServiceMaterialRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i32) -> AppResult<Option<ServiceMaterial>> {
        debug!("Finding material line by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, ServiceMaterialRow>(&format!(
            "SELECT {} FROM service_materials WHERE id = $1",
            LINE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding material line {}: {}", id, e);
            AppError::Database(format!("Failed to find material line: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<ServiceMaterial>> {
        let rows = sqlx::query_as::<sqlx::Postgres, ServiceMaterialRow>(&format!(
            "SELECT {} FROM service_materials ORDER BY id LIMIT $1 OFFSET $2",
            LINE_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding material lines: {}", e);
            AppError::Database(format!("Failed to fetch material lines: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM service_materials")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting material lines: {}", e);
                AppError::Database(format!("Failed to count material lines: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, entity: &ServiceMaterial) -> AppResult<ServiceMaterial> {
        debug!(
            "Creating material line: service={} material={}",
            entity.service_id, entity.material_id
        );

        let row = sqlx::query_as::<sqlx::Postgres, ServiceMaterialRow>(&format!(
            r#"
            INSERT INTO service_materials (service_id, material_id, quantity, unit_price, total_price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            LINE_COLUMNS
        ))
        .bind(entity.service_id)
        .bind(entity.material_id)
        .bind(entity.quantity)
        .bind(entity.unit_price)
        .bind(entity.total_price)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return AppError::AlreadyExists(format!(
                        "Material {} already attached to service {}",
                        entity.material_id, entity.service_id
                    ));
                }
            }
            error!("Database error creating material line: {}", e);
            AppError::Database(format!("Failed to create material line: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &ServiceMaterial) -> AppResult<ServiceMaterial> {
        debug!("Updating material line: {}", entity.id);

        let row = sqlx::query_as::<sqlx::Postgres, ServiceMaterialRow>(&format!(
            r#"
            UPDATE service_materials
            SET quantity = $2, total_price = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            LINE_COLUMNS
        ))
        .bind(entity.id)
        .bind(entity.quantity)
        .bind(entity.total_price)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating material line {}: {}", entity.id, e);
            AppError::Database(format!("Failed to update material line: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i32) -> AppResult<bool> {
        debug!("Deleting material line: {}", id);

        let result = sqlx::query("DELETE FROM service_materials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting material line {}: {}", id, e);
                AppError::Database(format!("Failed to delete material line: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ServiceMaterialRepository for PgServiceMaterialRepository {
    #[instrument(skip(self))]
    async fn find_by_service_and_material(
        &self,
        service_id: i32,
        material_id: i32,
    ) -> AppResult<Option<ServiceMaterial>> {
        let result = sqlx::query_as::<sqlx::Postgres, ServiceMaterialRow>(&format!(
            "SELECT {} FROM service_materials WHERE service_id = $1 AND material_id = $2",
            LINE_COLUMNS
        ))
        .bind(service_id)
        .bind(material_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding material line: {}", e);
            AppError::Database(format!("Failed to find material line: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_service(&self, service_id: i32) -> AppResult<Vec<ServiceMaterial>> {
        debug!("Finding material lines for service: {}", service_id);

        let rows = sqlx::query_as::<sqlx::Postgres, ServiceMaterialRow>(&format!(
            "SELECT {} FROM service_materials WHERE service_id = $1 ORDER BY id",
            LINE_COLUMNS
        ))
        .bind(service_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error fetching material lines for service {}: {}",
                service_id, e
            );
            AppError::Database(format!("Failed to fetch material lines: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ServiceMaterialRow {
    id: i32,
    service_id: i32,
    material_id: i32,
    quantity: Decimal,
    unit_price: Decimal,
    total_price: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ServiceMaterialRow> for ServiceMaterial {
    fn from(row: ServiceMaterialRow) -> Self {
        Self {
            id: row.id,
            service_id: row.service_id,
            material_id: row.material_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_price: row.total_price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
