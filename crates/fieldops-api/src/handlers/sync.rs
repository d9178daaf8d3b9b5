//! Offline sync handlers
//!
//! HTTP handlers for pushing buffered mutations, inspecting the pending
//! queue, replaying it, and the pull snapshot for clients catching up.

use crate::dto::sync::{MarkSyncedRequest, PullParams, SyncPushRequest};
use crate::dto::ApiResponse;
use crate::{AppLifecycle, AppSyncManager};
use actix_web::{web, HttpResponse};
use fieldops_auth::{AdminUser, AuthenticatedUser};
use fieldops_core::AppError;
use fieldops_services::constants::SYNC_PENDING_LIMIT;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

/// Push a batch of buffered offline mutations
///
/// POST /api/v1/sync/push — outcomes are returned in request order
#[instrument(skip(sync, user, req))]
pub async fn push(
    sync: web::Data<Arc<AppSyncManager>>,
    user: AuthenticatedUser,
    req: web::Json<SyncPushRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Sync push validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let items = req
        .into_inner()
        .items
        .into_iter()
        .map(|i| i.into_item())
        .collect();

    let outcomes = sync.push(&user.actor, items).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(outcomes)))
}

/// Pending queue entries for the acting user, oldest first
///
/// GET /api/v1/sync/pending
#[instrument(skip(sync, user))]
pub async fn pending(
    sync: web::Data<Arc<AppSyncManager>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let entries = sync.pending(&user.actor).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(entries)))
}

/// Acknowledge replayed entries
///
/// POST /api/v1/sync/mark-synced
#[instrument(skip(sync, user, req))]
pub async fn mark_synced(
    sync: web::Data<Arc<AppSyncManager>>,
    user: AuthenticatedUser,
    req: web::Json<MarkSyncedRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Mark-synced validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let updated = sync.mark_synced(&user.actor, &req.ids).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "updated": updated }))))
}

/// Replay the acting user's pending queue through the lifecycle engine
///
/// POST /api/v1/sync/replay
#[instrument(skip(sync, lifecycle, user))]
pub async fn replay(
    sync: web::Data<Arc<AppSyncManager>>,
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let outcomes = sync.replay(&user.actor, lifecycle.get_ref()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(outcomes)))
}

/// Purge synced entries older than the retention window (admin only)
///
/// POST /api/v1/sync/cleanup
#[instrument(skip(sync, admin))]
pub async fn cleanup(
    sync: web::Data<Arc<AppSyncManager>>,
    admin: AdminUser,
) -> Result<HttpResponse, AppError> {
    let deleted = sync.cleanup().await?;
    info!(admin_id = admin.actor.id, deleted, "sync queue cleaned up");

    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "deleted": deleted }))))
}

/// Snapshot of the acting user's services changed since an instant
///
/// GET /api/v1/sync/pull?since=...
#[instrument(skip(lifecycle, user))]
pub async fn pull(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    query: web::Query<PullParams>,
) -> Result<HttpResponse, AppError> {
    let since = query
        .since
        .unwrap_or_else(|| chrono::DateTime::<chrono::Utc>::UNIX_EPOCH);

    let services = lifecycle
        .updated_since(&user.actor, since, SYNC_PENDING_LIMIT)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({
        "since": since,
        "services": services,
    }))))
}

/// Configure sync routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/sync")
            .route("/push", web::post().to(push))
            .route("/pending", web::get().to(pending))
            .route("/mark-synced", web::post().to(mark_synced))
            .route("/replay", web::post().to(replay))
            .route("/cleanup", web::post().to(cleanup))
            .route("/pull", web::get().to(pull)),
    );
}
