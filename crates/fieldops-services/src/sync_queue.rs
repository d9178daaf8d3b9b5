//! Offline sync queue manager
//!
//! Buffers mutations recorded while a technician was offline and replays
//! them against the lifecycle engine in creation order. The queue is
//! at-least-once: an entry is only marked synced after its operation
//! succeeded, so a crash between apply and mark produces a re-delivery,
//! never a loss.

use crate::lifecycle::{ServiceLifecycle, StartService};
use fieldops_core::{
    models::{Actor, SyncEntry},
    traits::{
        CityRepository, MaterialRepository, ServiceMaterialRepository, ServiceRepository,
        SyncQueueRepository,
    },
    AppError, AppResult,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// One client-side mutation submitted for buffering
#[derive(Debug, Clone, Deserialize)]
pub struct SyncItem {
    pub operation: String,
    pub table_name: String,
    pub payload: serde_json::Value,
    /// Client-local correlation id, echoed back in the outcome
    pub local_id: Option<String>,
}

/// Per-item result of a batch push
#[derive(Debug, Clone, Serialize)]
pub struct SyncPushOutcome {
    pub local_id: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-entry result of a replay pass
#[derive(Debug, Clone, Serialize)]
pub struct ReplayOutcome {
    pub entry_id: i64,
    pub operation: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StartPayload {
    city_id: i32,
    initial_km: Option<Decimal>,
    address: Option<String>,
    location_lat: Option<Decimal>,
    location_lng: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct PausePayload {
    service_id: i32,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResumePayload {
    service_id: i32,
    additional_km: Decimal,
}

#[derive(Debug, Deserialize)]
struct CompletePayload {
    service_id: i32,
}

#[derive(Debug, Deserialize)]
struct AddMaterialPayload {
    service_id: i32,
    material_id: i32,
    quantity: Decimal,
}

#[derive(Debug, Deserialize)]
struct AddNotePayload {
    service_id: i32,
    text: String,
}

#[derive(Debug, Deserialize)]
struct LocationPayload {
    service_id: i32,
    location_lat: Decimal,
    location_lng: Decimal,
}

/// A decoded, typed sync operation ready to apply
#[derive(Debug)]
pub enum ReplayOp {
    Start(StartService),
    Pause { service_id: i32, reason: Option<String> },
    Resume { service_id: i32, additional_km: Decimal },
    Complete { service_id: i32 },
    AddMaterial {
        service_id: i32,
        material_id: i32,
        quantity: Decimal,
    },
    AddNote { service_id: i32, text: String },
    UpdateLocation {
        service_id: i32,
        location_lat: Decimal,
        location_lng: Decimal,
    },
}

impl ReplayOp {
    /// Decode a queue entry's opaque payload into a typed operation
    ///
    /// Payloads stay opaque until this point; a malformed one fails the
    /// single entry, not the batch.
    pub fn decode(entry: &SyncEntry) -> AppResult<Self> {
        fn payload<T: serde::de::DeserializeOwned>(entry: &SyncEntry) -> AppResult<T> {
            serde_json::from_value(entry.payload.clone()).map_err(|e| {
                AppError::Validation(format!(
                    "Invalid payload for operation '{}': {}",
                    entry.operation, e
                ))
            })
        }

        match entry.operation.as_str() {
            "start_service" => {
                let p: StartPayload = payload(entry)?;
                Ok(ReplayOp::Start(StartService {
                    city_id: p.city_id,
                    initial_km: p.initial_km,
                    address: p.address,
                    location_lat: p.location_lat,
                    location_lng: p.location_lng,
                }))
            }
            "pause_service" => {
                let p: PausePayload = payload(entry)?;
                Ok(ReplayOp::Pause {
                    service_id: p.service_id,
                    reason: p.reason,
                })
            }
            "resume_service" => {
                let p: ResumePayload = payload(entry)?;
                Ok(ReplayOp::Resume {
                    service_id: p.service_id,
                    additional_km: p.additional_km,
                })
            }
            "complete_service" => {
                let p: CompletePayload = payload(entry)?;
                Ok(ReplayOp::Complete {
                    service_id: p.service_id,
                })
            }
            "add_material" => {
                let p: AddMaterialPayload = payload(entry)?;
                Ok(ReplayOp::AddMaterial {
                    service_id: p.service_id,
                    material_id: p.material_id,
                    quantity: p.quantity,
                })
            }
            "add_note" => {
                let p: AddNotePayload = payload(entry)?;
                Ok(ReplayOp::AddNote {
                    service_id: p.service_id,
                    text: p.text,
                })
            }
            "update_location" => {
                let p: LocationPayload = payload(entry)?;
                Ok(ReplayOp::UpdateLocation {
                    service_id: p.service_id,
                    location_lat: p.location_lat,
                    location_lng: p.location_lng,
                })
            }
            other => Err(AppError::Validation(format!(
                "Unknown sync operation '{}'",
                other
            ))),
        }
    }
}

/// Manager for the offline sync queue
pub struct SyncManager<Q: SyncQueueRepository> {
    repo: Arc<Q>,
    retention_days: i64,
    pending_limit: i64,
}

impl<Q: SyncQueueRepository> SyncManager<Q> {
    pub fn new(repo: Arc<Q>, retention_days: i64, pending_limit: i64) -> Self {
        Self {
            repo,
            retention_days,
            pending_limit,
        }
    }

    /// Buffer a single mutation for the acting user
    #[instrument(skip(self, actor, payload), fields(user_id = actor.id))]
    pub async fn enqueue(
        &self,
        actor: &Actor,
        operation: &str,
        table_name: &str,
        payload: serde_json::Value,
    ) -> AppResult<SyncEntry> {
        let entry = SyncEntry::new(operation, table_name, payload, actor.id);
        self.repo.enqueue(&entry).await
    }

    /// Buffer a batch of mutations, reporting per-item outcomes in order
    ///
    /// One bad item does not abort the batch; its outcome carries the
    /// error and the rest proceed.
    #[instrument(skip(self, actor, items), fields(user_id = actor.id, count = items.len()))]
    pub async fn push(&self, actor: &Actor, items: Vec<SyncItem>) -> AppResult<Vec<SyncPushOutcome>> {
        let mut outcomes = Vec::with_capacity(items.len());

        for item in items {
            let entry = SyncEntry::new(
                item.operation.clone(),
                item.table_name.clone(),
                item.payload,
                actor.id,
            );

            match self.repo.enqueue(&entry).await {
                Ok(created) => outcomes.push(SyncPushOutcome {
                    local_id: item.local_id,
                    success: true,
                    server_id: Some(created.id),
                    error: None,
                }),
                Err(e) => {
                    warn!(operation = %item.operation, error = %e, "sync item rejected");
                    outcomes.push(SyncPushOutcome {
                        local_id: item.local_id,
                        success: false,
                        server_id: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(outcomes)
    }

    /// Pending entries for the acting user, oldest first
    #[instrument(skip(self, actor), fields(user_id = actor.id))]
    pub async fn pending(&self, actor: &Actor) -> AppResult<Vec<SyncEntry>> {
        self.repo.find_pending(actor.id, self.pending_limit).await
    }

    /// Mark entries as replayed; repeating ids is harmless
    #[instrument(skip(self, actor), fields(user_id = actor.id))]
    pub async fn mark_synced(&self, actor: &Actor, ids: &[i64]) -> AppResult<u64> {
        let updated = self.repo.mark_synced(ids).await?;
        info!(user_id = actor.id, requested = ids.len(), updated, "entries marked synced");
        Ok(updated)
    }

    /// Purge synced entries older than the retention window
    ///
    /// Pending entries are kept whatever their age.
    #[instrument(skip(self))]
    pub async fn cleanup(&self) -> AppResult<u64> {
        let cutoff = Utc::now() - Duration::days(self.retention_days);
        self.repo.delete_synced_before(cutoff).await
    }

    /// Replay the acting user's pending queue against the lifecycle engine
    ///
    /// Entries are applied oldest first. A failed entry is reported and
    /// left pending for the next pass; successful ones are marked synced.
    #[instrument(skip(self, actor, lifecycle), fields(user_id = actor.id))]
    pub async fn replay<S, C, M, L>(
        &self,
        actor: &Actor,
        lifecycle: &ServiceLifecycle<S, C, M, L>,
    ) -> AppResult<Vec<ReplayOutcome>>
    where
        S: ServiceRepository,
        C: CityRepository,
        M: MaterialRepository,
        L: ServiceMaterialRepository,
    {
        let pending = self.repo.find_pending(actor.id, self.pending_limit).await?;
        let mut outcomes = Vec::with_capacity(pending.len());
        let mut synced_ids = Vec::new();

        for entry in pending {
            let result = match ReplayOp::decode(&entry) {
                Ok(op) => Self::apply(actor, lifecycle, op).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    synced_ids.push(entry.id);
                    outcomes.push(ReplayOutcome {
                        entry_id: entry.id,
                        operation: entry.operation,
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(entry_id = entry.id, operation = %entry.operation, error = %e, "replay failed");
                    outcomes.push(ReplayOutcome {
                        entry_id: entry.id,
                        operation: entry.operation,
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if !synced_ids.is_empty() {
            self.repo.mark_synced(&synced_ids).await?;
        }

        info!(
            user_id = actor.id,
            applied = synced_ids.len(),
            failed = outcomes.len() - synced_ids.len(),
            "replay pass finished"
        );

        Ok(outcomes)
    }

    async fn apply<S, C, M, L>(
        actor: &Actor,
        lifecycle: &ServiceLifecycle<S, C, M, L>,
        op: ReplayOp,
    ) -> AppResult<()>
    where
        S: ServiceRepository,
        C: CityRepository,
        M: MaterialRepository,
        L: ServiceMaterialRepository,
    {
        match op {
            ReplayOp::Start(req) => {
                lifecycle.start(actor, req).await?;
            }
            ReplayOp::Pause { service_id, reason } => {
                lifecycle.pause(actor, service_id, reason).await?;
            }
            ReplayOp::Resume {
                service_id,
                additional_km,
            } => {
                lifecycle.resume(actor, service_id, additional_km).await?;
            }
            ReplayOp::Complete { service_id } => {
                lifecycle.complete(actor, service_id).await?;
            }
            ReplayOp::AddMaterial {
                service_id,
                material_id,
                quantity,
            } => {
                lifecycle
                    .add_material(actor, service_id, material_id, quantity)
                    .await?;
            }
            ReplayOp::AddNote { service_id, text } => {
                lifecycle.add_note(actor, service_id, &text).await?;
            }
            ReplayOp::UpdateLocation {
                service_id,
                location_lat,
                location_lng,
            } => {
                lifecycle
                    .update_location(actor, service_id, location_lat, location_lng)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::mock::*;
    use crate::notifier::LifecycleNotifier;
    use async_trait::async_trait;
    use fieldops_core::models::{City, UserRole};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockSyncRepo {
        entries: Mutex<HashMap<i64, SyncEntry>>,
        next_id: Mutex<i64>,
    }

    #[async_trait]
    impl SyncQueueRepository for MockSyncRepo {
        async fn enqueue(&self, entry: &SyncEntry) -> AppResult<SyncEntry> {
            let mut next = self.next_id.lock();
            *next += 1;
            let mut created = entry.clone();
            created.id = *next;
            self.entries.lock().insert(created.id, created.clone());
            Ok(created)
        }

        async fn find_pending(&self, user_id: i32, limit: i64) -> AppResult<Vec<SyncEntry>> {
            let mut pending: Vec<_> = self
                .entries
                .lock()
                .values()
                .filter(|e| e.user_id == user_id && !e.synced)
                .cloned()
                .collect();
            pending.sort_by_key(|e| (e.created_at, e.id));
            pending.truncate(limit as usize);
            Ok(pending)
        }

        async fn mark_synced(&self, ids: &[i64]) -> AppResult<u64> {
            let mut entries = self.entries.lock();
            let mut updated = 0;
            for id in ids {
                if let Some(entry) = entries.get_mut(id) {
                    if !entry.synced {
                        entry.synced = true;
                        entry.synced_at = Some(Utc::now());
                        updated += 1;
                    }
                }
            }
            Ok(updated)
        }

        async fn delete_synced_before(&self, cutoff: chrono::DateTime<Utc>) -> AppResult<u64> {
            let mut entries = self.entries.lock();
            let before = entries.len();
            entries.retain(|_, e| !(e.synced && e.created_at < cutoff));
            Ok((before - entries.len()) as u64)
        }
    }

    fn actor(id: i32) -> Actor {
        Actor {
            id,
            name: format!("tech-{}", id),
            role: UserRole::User,
            is_active: true,
        }
    }

    fn manager() -> SyncManager<MockSyncRepo> {
        SyncManager::new(
            Arc::new(MockSyncRepo::default()),
            crate::constants::SYNC_RETENTION_DAYS,
            crate::constants::SYNC_PENDING_LIMIT,
        )
    }

    fn lifecycle() -> ServiceLifecycle<MockServiceRepo, MockCityRepo, MockMaterialRepo, MockLineRepo>
    {
        let lines = Arc::new(Mutex::new(HashMap::new()));
        let (notifier, _rx) = LifecycleNotifier::channel();
        let city = City {
            id: 10,
            name: "Curitiba".into(),
            state: "PR".into(),
            km_rate: dec!(2.50),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        ServiceLifecycle::new(
            Arc::new(MockServiceRepo::with_lines(lines.clone())),
            Arc::new(MockCityRepo::with(vec![city])),
            Arc::new(MockMaterialRepo::default()),
            Arc::new(MockLineRepo::with_lines(lines)),
            notifier,
        )
    }

    #[tokio::test]
    async fn test_push_reports_outcomes_in_order() {
        let mgr = manager();
        let tech = actor(1);

        let outcomes = mgr
            .push(
                &tech,
                vec![
                    SyncItem {
                        operation: "start_service".into(),
                        table_name: "services".into(),
                        payload: json!({"city_id": 10}),
                        local_id: Some("a".into()),
                    },
                    SyncItem {
                        operation: "pause_service".into(),
                        table_name: "services".into(),
                        payload: json!({"service_id": 1}),
                        local_id: Some("b".into()),
                    },
                ],
            )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].local_id.as_deref(), Some("a"));
        assert!(outcomes[0].success);
        assert_eq!(outcomes[0].server_id, Some(1));
        assert_eq!(outcomes[1].server_id, Some(2));
    }

    #[tokio::test]
    async fn test_pending_is_fifo() {
        let mgr = manager();
        let tech = actor(1);

        for op in ["first", "second", "third"] {
            mgr.enqueue(&tech, op, "services", json!({})).await.unwrap();
        }

        let pending = mgr.pending(&tech).await.unwrap();
        let ops: Vec<_> = pending.iter().map(|e| e.operation.as_str()).collect();
        assert_eq!(ops, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_pending_is_scoped_to_user() {
        let mgr = manager();
        mgr.enqueue(&actor(1), "one", "services", json!({})).await.unwrap();
        mgr.enqueue(&actor(2), "two", "services", json!({})).await.unwrap();

        let pending = mgr.pending(&actor(1)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation, "one");
    }

    #[tokio::test]
    async fn test_mark_synced_is_idempotent() {
        let mgr = manager();
        let tech = actor(1);

        let entry = mgr.enqueue(&tech, "op", "services", json!({})).await.unwrap();

        assert_eq!(mgr.mark_synced(&tech, &[entry.id]).await.unwrap(), 1);
        assert_eq!(mgr.mark_synced(&tech, &[entry.id]).await.unwrap(), 0);
        assert!(mgr.pending(&tech).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_spares_pending_entries() {
        let mgr = manager();
        let tech = actor(1);

        let old_synced = mgr.enqueue(&tech, "old-synced", "services", json!({})).await.unwrap();
        let old_pending = mgr.enqueue(&tech, "old-pending", "services", json!({})).await.unwrap();

        // Age both past the retention window
        {
            let mut entries = mgr.repo.entries.lock();
            for id in [old_synced.id, old_pending.id] {
                entries.get_mut(&id).unwrap().created_at = Utc::now() - Duration::days(30);
            }
        }
        mgr.mark_synced(&tech, &[old_synced.id]).await.unwrap();

        assert_eq!(mgr.cleanup().await.unwrap(), 1);

        let pending = mgr.pending(&tech).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation, "old-pending");
    }

    #[tokio::test]
    async fn test_decode_rejects_unknown_operation() {
        let entry = SyncEntry::new("teleport_service", "services", json!({}), 1);
        assert!(matches!(
            ReplayOp::decode(&entry),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_replay_applies_and_marks_entries() {
        let mgr = manager();
        let lc = lifecycle();
        let tech = actor(1);

        mgr.enqueue(
            &tech,
            "start_service",
            "services",
            json!({"city_id": 10, "initial_km": "5"}),
        )
        .await
        .unwrap();
        mgr.enqueue(&tech, "pause_service", "services", json!({"service_id": 1}))
            .await
            .unwrap();
        mgr.enqueue(
            &tech,
            "resume_service",
            "services",
            json!({"service_id": 1, "additional_km": "10"}),
        )
        .await
        .unwrap();

        let outcomes = mgr.replay(&tech, &lc).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.success));

        let svc = lc.get(&tech, 1).await.unwrap();
        assert_eq!(svc.accumulated_km, dec!(15));
        assert_eq!(svc.resume_count, 1);

        // Everything consumed; a second pass has nothing to do
        assert!(mgr.replay(&tech, &lc).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replay_keeps_failed_entries_pending() {
        let mgr = manager();
        let lc = lifecycle();
        let tech = actor(1);

        // References a service that does not exist
        mgr.enqueue(&tech, "pause_service", "services", json!({"service_id": 999}))
            .await
            .unwrap();
        mgr.enqueue(
            &tech,
            "start_service",
            "services",
            json!({"city_id": 10}),
        )
        .await
        .unwrap();

        let outcomes = mgr.replay(&tech, &lc).await.unwrap();
        assert!(!outcomes[0].success);
        assert!(outcomes[0].error.is_some());
        assert!(outcomes[1].success);

        // The failed entry stays for the next pass
        let pending = mgr.pending(&tech).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation, "pause_service");
    }
}
