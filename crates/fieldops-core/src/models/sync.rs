//! Offline sync queue entry model
//!
//! Entries buffer client-originated mutations for later replay. They are
//! immutable once created except for the synced flag and timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A buffered offline mutation awaiting replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEntry {
    /// Unique identifier
    pub id: i64,

    /// Operation name (e.g. "start_service", "add_material")
    pub operation: String,

    /// Target entity/table name
    pub table_name: String,

    /// Opaque serialized payload; interpreted only at replay time
    pub payload: serde_json::Value,

    /// Originating user
    pub user_id: i32,

    /// Whether the entry has been replayed against the canonical store
    pub synced: bool,

    /// When the entry was marked synced
    pub synced_at: Option<DateTime<Utc>>,

    /// Creation timestamp (defines FIFO replay order)
    pub created_at: DateTime<Utc>,
}

impl SyncEntry {
    /// Create a new pending entry
    pub fn new(
        operation: impl Into<String>,
        table_name: impl Into<String>,
        payload: serde_json::Value,
        user_id: i32,
    ) -> Self {
        Self {
            id: 0,
            operation: operation.into(),
            table_name: table_name.into(),
            payload,
            user_id,
            synced: false,
            synced_at: None,
            created_at: Utc::now(),
        }
    }

    /// Check if the entry is still awaiting replay
    pub fn is_pending(&self) -> bool {
        !self.synced
    }
}
