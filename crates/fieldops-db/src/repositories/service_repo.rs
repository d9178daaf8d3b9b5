//! Service repository implementation
//!
//! Provides PostgreSQL-backed storage for field services. The pause history
//! and note ledgers live in JSONB columns and are validated through serde at
//! the read/write boundary; malformed ledger data is a hard error, never a
//! silently empty list.

use fieldops_core::{
    models::{PauseEvent, Service, ServiceNote, ServiceStatus},
    traits::{Repository, ServiceFilter, ServiceRepository},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, error, instrument};

const SERVICE_COLUMNS: &str = r#"
    id, user_id, city_id, start_time, end_time, status,
    base_km, accumulated_km, resume_count, pause_history,
    materials_value, total_value,
    location_lat, location_lng, address, notes,
    created_at, updated_at
"#;

/// PostgreSQL implementation of ServiceRepository
pub struct PgServiceRepository {
    pool: PgPool,
}

impl PgServiceRepository {
    /// Create a new service repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert database status string to enum
    fn parse_status(s: &str) -> ServiceStatus {
        ServiceStatus::from_str(s).unwrap_or(ServiceStatus::Pending)
    }

    /// Escape a free-text filter value for embedding in a LIKE pattern
    fn escape_like(value: &str) -> String {
        value.replace('\'', "''").replace('%', "\\%")
    }
}

#[async_trait]
impl Repository<Service, i32> for PgServiceRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i32) -> AppResult<Option<Service>> {
        debug!("Finding service by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, ServiceRow>(&format!(
            "SELECT {} FROM services WHERE id = $1",
            SERVICE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding service {}: {}", id, e);
            AppError::Database(format!("Failed to find service: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<Service>> {
        debug!("Finding all services with limit {} offset {}", limit, offset);

        let rows = sqlx::query_as::<sqlx::Postgres, ServiceRow>(&format!(
            "SELECT {} FROM services ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            SERVICE_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding services: {}", e);
            AppError::Database(format!("Failed to fetch services: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM services")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting services: {}", e);
                AppError::Database(format!("Failed to count services: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, entity: &Service) -> AppResult<Service> {
        debug!("Creating service for user {}", entity.user_id);

        let row = sqlx::query_as::<sqlx::Postgres, ServiceRow>(&format!(
            r#"
            INSERT INTO services (
                user_id, city_id, start_time, end_time, status,
                base_km, accumulated_km, resume_count, pause_history,
                materials_value, total_value,
                location_lat, location_lng, address, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {}
            "#,
            SERVICE_COLUMNS
        ))
        .bind(entity.user_id)
        .bind(entity.city_id)
        .bind(entity.start_time)
        .bind(entity.end_time)
        .bind(entity.status.to_string())
        .bind(entity.base_km)
        .bind(entity.accumulated_km)
        .bind(entity.resume_count)
        .bind(Json(&entity.pause_history))
        .bind(entity.materials_value)
        .bind(entity.total_value)
        .bind(entity.location_lat)
        .bind(entity.location_lng)
        .bind(&entity.address)
        .bind(Json(&entity.notes))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating service: {}", e);
            AppError::Database(format!("Failed to create service: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, entity: &Service) -> AppResult<Service> {
        debug!("Updating service: {}", entity.id);

        let row = sqlx::query_as::<sqlx::Postgres, ServiceRow>(&format!(
            r#"
            UPDATE services
            SET user_id = $2,
                city_id = $3,
                start_time = $4,
                end_time = $5,
                status = $6,
                base_km = $7,
                accumulated_km = $8,
                resume_count = $9,
                pause_history = $10,
                materials_value = $11,
                total_value = $12,
                location_lat = $13,
                location_lng = $14,
                address = $15,
                notes = $16,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SERVICE_COLUMNS
        ))
        .bind(entity.id)
        .bind(entity.user_id)
        .bind(entity.city_id)
        .bind(entity.start_time)
        .bind(entity.end_time)
        .bind(entity.status.to_string())
        .bind(entity.base_km)
        .bind(entity.accumulated_km)
        .bind(entity.resume_count)
        .bind(Json(&entity.pause_history))
        .bind(entity.materials_value)
        .bind(entity.total_value)
        .bind(entity.location_lat)
        .bind(entity.location_lng)
        .bind(&entity.address)
        .bind(Json(&entity.notes))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating service {}: {}", entity.id, e);
            AppError::Database(format!("Failed to update service: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i32) -> AppResult<bool> {
        debug!("Deleting service: {}", id);

        let result = sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting service {}: {}", id, e);
                AppError::Database(format!("Failed to delete service: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ServiceRepository for PgServiceRepository {
    #[instrument(skip(self))]
    async fn list_filtered(
        &self,
        filter: &ServiceFilter,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Service>, i64)> {
        debug!("Listing services with filter: {:?}", filter);

        // Build dynamic query based on filters; free text goes through
        // escape_like before embedding
        let mut conditions = String::new();

        if let Some(status) = filter.status {
            conditions.push_str(&format!(" AND s.status = '{}'", status));
        }
        if let Some(user_id) = filter.user_id {
            conditions.push_str(&format!(" AND s.user_id = {}", user_id));
        }
        if let Some(city) = &filter.city_name {
            conditions.push_str(&format!(
                " AND c.name ILIKE '%{}%'",
                Self::escape_like(city)
            ));
        }
        if let Some(tech) = &filter.technician_name {
            conditions.push_str(&format!(
                " AND u.name ILIKE '%{}%'",
                Self::escape_like(tech)
            ));
        }
        if let Some(address) = &filter.address {
            conditions.push_str(&format!(
                " AND s.address ILIKE '%{}%'",
                Self::escape_like(address)
            ));
        }
        if let Some(from) = filter.date_from {
            conditions.push_str(&format!(" AND s.start_time >= '{}'", from.to_rfc3339()));
        }
        if let Some(to) = filter.date_to {
            conditions.push_str(&format!(" AND s.start_time <= '{}'", to.to_rfc3339()));
        }

        let base = r#"
            FROM services s
            JOIN cities c ON c.id = s.city_id
            JOIN users u ON u.id = s.user_id
            WHERE 1=1
        "#;

        let columns = SERVICE_COLUMNS.replace("id,", "s.id,").replace(
            "created_at, updated_at",
            "s.created_at, s.updated_at",
        );
        let query_str = format!(
            "SELECT {} {} {} ORDER BY s.created_at DESC LIMIT {} OFFSET {}",
            columns, base, conditions, limit, offset
        );
        let count_query = format!("SELECT COUNT(*) {} {}", base, conditions);

        let total: (i64,) = sqlx::query_as(&count_query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting filtered services: {}", e);
                AppError::Database(format!("Failed to count services: {}", e))
            })?;

        let rows = sqlx::query_as::<sqlx::Postgres, ServiceRow>(&query_str)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error fetching filtered services: {}", e);
                AppError::Database(format!("Failed to fetch services: {}", e))
            })?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }

    #[instrument(skip(self))]
    async fn find_by_user(
        &self,
        user_id: i32,
        status: Option<ServiceStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Service>, i64)> {
        debug!("Finding services for user {} status {:?}", user_id, status);

        let status_cond = status
            .map(|s| format!(" AND status = '{}'", s))
            .unwrap_or_default();

        let total: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM services WHERE user_id = $1{}",
            status_cond
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error counting user services: {}", e);
            AppError::Database(format!("Failed to count services: {}", e))
        })?;

        let rows = sqlx::query_as::<sqlx::Postgres, ServiceRow>(&format!(
            "SELECT {} FROM services WHERE user_id = $1{} ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            SERVICE_COLUMNS, status_cond
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error fetching user services: {}", e);
            AppError::Database(format!("Failed to fetch services: {}", e))
        })?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }

    #[instrument(skip(self, apply))]
    async fn update_locked(
        &self,
        id: i32,
        apply: &(dyn for<'a> Fn(&'a mut Service) -> Result<(), AppError> + Send + Sync),
    ) -> AppResult<Option<Service>> {
        debug!("Locked update of service {}", id);

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let row: Option<ServiceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM services WHERE id = $1 FOR UPDATE",
            SERVICE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to lock service {}: {}", id, e);
            AppError::Database(format!("Failed to lock service: {}", e))
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut service: Service = row.into();
        // A closure error drops the transaction, rolling the lock back
        apply(&mut service)?;

        let row = sqlx::query_as::<sqlx::Postgres, ServiceRow>(&format!(
            r#"
            UPDATE services
            SET user_id = $2,
                city_id = $3,
                start_time = $4,
                end_time = $5,
                status = $6,
                base_km = $7,
                accumulated_km = $8,
                resume_count = $9,
                pause_history = $10,
                materials_value = $11,
                total_value = $12,
                location_lat = $13,
                location_lng = $14,
                address = $15,
                notes = $16,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SERVICE_COLUMNS
        ))
        .bind(service.id)
        .bind(service.user_id)
        .bind(service.city_id)
        .bind(service.start_time)
        .bind(service.end_time)
        .bind(service.status.to_string())
        .bind(service.base_km)
        .bind(service.accumulated_km)
        .bind(service.resume_count)
        .bind(Json(&service.pause_history))
        .bind(service.materials_value)
        .bind(service.total_value)
        .bind(service.location_lat)
        .bind(service.location_lng)
        .bind(&service.address)
        .bind(Json(&service.notes))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error updating locked service {}: {}", id, e);
            AppError::Database(format!("Failed to update service: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(Some(row.into()))
    }

    #[instrument(skip(self))]
    async fn update_totals(
        &self,
        id: i32,
        materials_value: Decimal,
        total_value: Decimal,
    ) -> AppResult<()> {
        debug!(
            "Updating totals for service {}: materials={}, total={}",
            id, materials_value, total_value
        );

        let result = sqlx::query(
            r#"
            UPDATE services
            SET materials_value = $2,
                total_value = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(materials_value)
        .bind(total_value)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating service totals: {}", e);
            AppError::Database(format!("Failed to update totals: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::ServiceNotFound(id.to_string()));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_with_materials(&self, id: i32) -> AppResult<bool> {
        debug!("Deleting service {} with its material lines", id);

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // Lock the service row so a concurrent mutation cannot interleave
        let locked: Option<(i32,)> =
            sqlx::query_as("SELECT id FROM services WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    error!("Failed to lock service {}: {}", id, e);
                    AppError::Database(format!("Failed to lock service: {}", e))
                })?;

        if locked.is_none() {
            return Ok(false);
        }

        sqlx::query("DELETE FROM service_materials WHERE service_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to delete material lines for service {}: {}", id, e);
                AppError::Database(format!("Failed to delete material lines: {}", e))
            })?;

        sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to delete service {}: {}", id, e);
                AppError::Database(format!("Failed to delete service: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(true)
    }

    #[instrument(skip(self))]
    async fn total_km_for_user(&self, user_id: i32) -> AppResult<Decimal> {
        let result: (Option<Decimal>,) =
            sqlx::query_as("SELECT SUM(accumulated_km) FROM services WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error summing km for user {}: {}", user_id, e);
                    AppError::Database(format!("Failed to sum km: {}", e))
                })?;

        Ok(result.0.unwrap_or(Decimal::ZERO))
    }

    #[instrument(skip(self))]
    async fn find_updated_since(
        &self,
        user_id: i32,
        since: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Service>> {
        debug!("Fetching services for user {} updated since {}", user_id, since);

        let rows = sqlx::query_as::<sqlx::Postgres, ServiceRow>(&format!(
            "SELECT {} FROM services WHERE user_id = $1 AND updated_at >= $2 ORDER BY updated_at ASC LIMIT $3",
            SERVICE_COLUMNS
        ))
        .bind(user_id)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error fetching updated services: {}", e);
            AppError::Database(format!("Failed to fetch services: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ServiceRow {
    id: i32,
    user_id: i32,
    city_id: i32,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    status: String,
    base_km: Decimal,
    accumulated_km: Decimal,
    resume_count: i32,
    pause_history: Json<Vec<PauseEvent>>,
    materials_value: Decimal,
    total_value: Decimal,
    location_lat: Option<Decimal>,
    location_lng: Option<Decimal>,
    address: Option<String>,
    notes: Json<Vec<ServiceNote>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            city_id: row.city_id,
            start_time: row.start_time,
            end_time: row.end_time,
            status: PgServiceRepository::parse_status(&row.status),
            base_km: row.base_km,
            accumulated_km: row.accumulated_km,
            resume_count: row.resume_count,
            pause_history: row.pause_history.0,
            materials_value: row.materials_value,
            total_value: row.total_value,
            location_lat: row.location_lat,
            location_lng: row.location_lng,
            address: row.address,
            notes: row.notes.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(
            PgServiceRepository::parse_status("in_progress"),
            ServiceStatus::InProgress
        );
        assert_eq!(
            PgServiceRepository::parse_status("on_hold"),
            ServiceStatus::OnHold
        );
        // Unknown strings fall back to the reserved default
        assert_eq!(
            PgServiceRepository::parse_status("garbage"),
            ServiceStatus::Pending
        );
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(PgServiceRepository::escape_like("O'Neil"), "O''Neil");
        assert_eq!(PgServiceRepository::escape_like("100%"), "100\\%");
    }
}
