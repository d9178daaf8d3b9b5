//! Offline sync DTOs

use chrono::{DateTime, Utc};
use fieldops_services::SyncItem;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Batch push of buffered offline mutations
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SyncPushRequest {
    #[validate(length(min = 1, max = 100, message = "Between 1 and 100 items per push"))]
    pub items: Vec<SyncItemRequest>,
}

/// One buffered mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncItemRequest {
    pub operation: String,
    pub table: String,
    pub data: serde_json::Value,
    /// Client-local correlation id
    pub local_id: Option<String>,
}

impl SyncItemRequest {
    pub fn into_item(self) -> SyncItem {
        SyncItem {
            operation: self.operation,
            table_name: self.table,
            payload: self.data,
            local_id: self.local_id,
        }
    }
}

/// Acknowledge replayed entries
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MarkSyncedRequest {
    #[validate(length(min = 1, message = "At least one id is required"))]
    pub ids: Vec<i64>,
}

/// Window for the pull snapshot
#[derive(Debug, Clone, Deserialize)]
pub struct PullParams {
    /// Return services changed at or after this instant; defaults to epoch
    pub since: Option<DateTime<Utc>>,
}
