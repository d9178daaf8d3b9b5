//! Offline sync queue repository implementation
//!
//! Rows are append-only from the client side. Mark-synced is idempotent:
//! ids that are already synced (or unknown) are skipped rather than
//! rejected, so a retried acknowledgment cannot fail.

use fieldops_core::{models::SyncEntry, traits::SyncQueueRepository, AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};

const SYNC_COLUMNS: &str =
    "id, operation, table_name, payload, user_id, synced, synced_at, created_at";

/// PostgreSQL implementation of SyncQueueRepository
pub struct PgSyncQueueRepository {
    pool: PgPool,
}

impl PgSyncQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncQueueRepository for PgSyncQueueRepository {
    #[instrument(skip(self, entry))]
    async fn enqueue(&self, entry: &SyncEntry) -> AppResult<SyncEntry> {
        debug!(
            "Enqueueing sync entry: op={} table={} user={}",
            entry.operation, entry.table_name, entry.user_id
        );

        let row = sqlx::query_as::<sqlx::Postgres, SyncRow>(&format!(
            r#"
            INSERT INTO sync_queue (operation, table_name, payload, user_id, synced)
            VALUES ($1, $2, $3, $4, false)
            RETURNING {}
            "#,
            SYNC_COLUMNS
        ))
        .bind(&entry.operation)
        .bind(&entry.table_name)
        .bind(&entry.payload)
        .bind(entry.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error enqueueing sync entry: {}", e);
            AppError::Database(format!("Failed to enqueue sync entry: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_pending(&self, user_id: i32, limit: i64) -> AppResult<Vec<SyncEntry>> {
        debug!("Finding pending sync entries for user {}", user_id);

        // created_at then id: FIFO even when timestamps collide
        let rows = sqlx::query_as::<sqlx::Postgres, SyncRow>(&format!(
            r#"
            SELECT {}
            FROM sync_queue
            WHERE user_id = $1 AND synced = false
            ORDER BY created_at, id
            LIMIT $2
            "#,
            SYNC_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error fetching pending sync entries: {}", e);
            AppError::Database(format!("Failed to fetch sync entries: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn mark_synced(&self, ids: &[i64]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        debug!("Marking {} sync entries as synced", ids.len());

        let result = sqlx::query(
            r#"
            UPDATE sync_queue
            SET synced = true, synced_at = NOW()
            WHERE id = ANY($1) AND synced = false
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error marking sync entries: {}", e);
            AppError::Database(format!("Failed to mark sync entries: {}", e))
        })?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn delete_synced_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        // Pending rows are never touched here regardless of age
        let result =
            sqlx::query("DELETE FROM sync_queue WHERE synced = true AND created_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error cleaning sync queue: {}", e);
                    AppError::Database(format!("Failed to clean sync queue: {}", e))
                })?;

        info!(
            "Cleaned {} synced queue entries older than {}",
            result.rows_affected(),
            cutoff
        );

        Ok(result.rows_affected())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct SyncRow {
    id: i64,
    operation: String,
    table_name: String,
    payload: serde_json::Value,
    user_id: i32,
    synced: bool,
    synced_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<SyncRow> for SyncEntry {
    fn from(row: SyncRow) -> Self {
        Self {
            id: row.id,
            operation: row.operation,
            table_name: row.table_name,
            payload: row.payload,
            user_id: row.user_id,
            synced: row.synced,
            synced_at: row.synced_at,
            created_at: row.created_at,
        }
    }
}
