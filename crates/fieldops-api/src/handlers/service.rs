//! Service lifecycle handlers
//!
//! HTTP handlers for starting, pausing, resuming, completing, and editing
//! field service jobs, plus their material lines and notes.

use crate::dto::service::{
    AddMaterialRequest, LocationRequest, NoteRequest, PauseRequest, ResumeRequest,
    ServiceFilterParams, StartServiceRequest, UpdateQuantityRequest, UpdateServiceRequest,
};
use crate::dto::{ApiResponse, PaginationParams};
use crate::{AppCatalog, AppLifecycle};
use actix_web::{web, HttpResponse};
use fieldops_auth::AuthenticatedUser;
use fieldops_core::models::{Actor, City, Service, ServiceStatus};
use fieldops_core::AppError;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use validator::Validate;

/// Embed the city and owner into a job's JSON representation
fn job_with_relations(
    service: &Service,
    city: &City,
    owner: &Actor,
) -> Result<serde_json::Value, AppError> {
    let mut job = serde_json::to_value(service)
        .map_err(|e| AppError::Serialization(e.to_string()))?;
    job["city"] =
        serde_json::to_value(city).map_err(|e| AppError::Serialization(e.to_string()))?;
    job["owner"] = json!({ "id": owner.id, "name": owner.name });
    Ok(job)
}

/// Resume response: the job plus the leg just logged and the running total
fn resume_body(service: &Service, additional_km: Decimal) -> serde_json::Value {
    json!({
        "job": service,
        "additional_km": additional_km,
        "total_km_accumulated": service.accumulated_km,
    })
}

/// Start a new service
///
/// POST /api/v1/services/start
#[instrument(skip(lifecycle, catalog, user, req))]
pub async fn start_service(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    catalog: web::Data<Arc<AppCatalog>>,
    user: AuthenticatedUser,
    req: web::Json<StartServiceRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Start service validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let service = lifecycle
        .start(&user.actor, req.into_inner().into_start())
        .await?;

    let city = catalog.city(service.city_id).await?;
    let job = job_with_relations(&service, &city, &user.actor)?;

    Ok(HttpResponse::Created().json(ApiResponse::with_message(job, "Service started")))
}

/// Get a single service
///
/// GET /api/v1/services/{id}
#[instrument(skip(lifecycle, user))]
pub async fn get_service(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let service = lifecycle.get(&user.actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(service)))
}

/// Pause a running service
///
/// POST /api/v1/services/{id}/pause
#[instrument(skip(lifecycle, user, req))]
pub async fn pause_service(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    path: web::Path<i32>,
    req: Option<web::Json<PauseRequest>>,
) -> Result<HttpResponse, AppError> {
    let reason = match req {
        Some(req) => {
            req.validate().map_err(|e| {
                warn!("Pause validation failed: {}", e);
                AppError::Validation(e.to_string())
            })?;
            req.into_inner().reason
        }
        None => None,
    };

    let service = lifecycle
        .pause(&user.actor, path.into_inner(), reason)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(service, "Service on hold")))
}

/// Resume an on-hold service
///
/// POST /api/v1/services/{id}/resume
#[instrument(skip(lifecycle, user, req))]
pub async fn resume_service(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    path: web::Path<i32>,
    req: web::Json<ResumeRequest>,
) -> Result<HttpResponse, AppError> {
    let additional_km = req.additional_km;
    let service = lifecycle
        .resume(&user.actor, path.into_inner(), additional_km)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        resume_body(&service, additional_km),
        "Service resumed",
    )))
}

/// Complete a service
///
/// POST /api/v1/services/{id}/complete
#[instrument(skip(lifecycle, user))]
pub async fn complete_service(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let service = lifecycle.complete(&user.actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(service, "Service completed")))
}

/// Update a service through the allow-listed patch
///
/// PUT /api/v1/services/{id}
#[instrument(skip(lifecycle, user, req))]
pub async fn update_service(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    path: web::Path<i32>,
    req: web::Json<UpdateServiceRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Service update validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let service = lifecycle
        .update(&user.actor, path.into_inner(), req.into_inner().into_patch())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(service)))
}

/// Delete a service and its material lines
///
/// DELETE /api/v1/services/{id}
#[instrument(skip(lifecycle, user))]
pub async fn delete_service(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    lifecycle.delete(&user.actor, id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        json!({ "id": id }),
        "Service deleted",
    )))
}

/// Attach a material to a service
///
/// POST /api/v1/services/materials
#[instrument(skip(lifecycle, user, req))]
pub async fn add_material(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    req: web::Json<AddMaterialRequest>,
) -> Result<HttpResponse, AppError> {
    let (line, action) = lifecycle
        .add_material(&user.actor, req.service_id, req.material_id, req.quantity)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(json!({
        "line": line,
        "action": action,
    }))))
}

/// Remove a material line
///
/// DELETE /api/v1/services/materials/{line_id}
#[instrument(skip(lifecycle, user))]
pub async fn remove_material(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let line_id = path.into_inner();
    lifecycle.remove_material(&user.actor, line_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        json!({ "line_id": line_id }),
        "Material removed",
    )))
}

/// Replace a material line's quantity
///
/// PUT /api/v1/services/materials/{line_id}
#[instrument(skip(lifecycle, user, req))]
pub async fn update_material_quantity(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    path: web::Path<i32>,
    req: web::Json<UpdateQuantityRequest>,
) -> Result<HttpResponse, AppError> {
    let line = lifecycle
        .update_material_quantity(&user.actor, path.into_inner(), req.quantity)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(line)))
}

/// List a service's material lines
///
/// GET /api/v1/services/{id}/materials
#[instrument(skip(lifecycle, user))]
pub async fn list_service_materials(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let lines = lifecycle.materials(&user.actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(lines)))
}

/// Append a note to a service
///
/// POST /api/v1/services/{id}/notes
#[instrument(skip(lifecycle, user, req))]
pub async fn add_note(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    path: web::Path<i32>,
    req: web::Json<NoteRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Note validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let service = lifecycle
        .add_note(&user.actor, path.into_inner(), &req.text)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(service)))
}

/// Update a service's recorded location
///
/// PUT /api/v1/services/{id}/location
#[instrument(skip(lifecycle, user, req))]
pub async fn update_location(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    path: web::Path<i32>,
    req: web::Json<LocationRequest>,
) -> Result<HttpResponse, AppError> {
    let service = lifecycle
        .update_location(
            &user.actor,
            path.into_inner(),
            req.location_lat,
            req.location_lng,
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(service)))
}

/// Cross-job listing with filters
///
/// GET /api/v1/services — non-admins only ever see their own jobs
#[instrument(skip(lifecycle, user))]
pub async fn list_services(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
    filters: web::Query<ServiceFilterParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    debug!(page = query.page, per_page = query.per_page, "Listing services");

    let filter = filters.to_filter()?;
    let (services, total) = lifecycle
        .list(&user.actor, filter, &query.to_pagination())
        .await?;

    Ok(HttpResponse::Ok().json(query.paginate(services, total)))
}

/// The acting technician's services
///
/// GET /api/v1/services/mine
#[instrument(skip(lifecycle, user))]
pub async fn my_services(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    list_mine(&lifecycle, &user, &query, None).await
}

/// The acting technician's running services
///
/// GET /api/v1/services/mine/active
#[instrument(skip(lifecycle, user))]
pub async fn my_active_services(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    list_mine(&lifecycle, &user, &query, Some(ServiceStatus::InProgress)).await
}

/// The acting technician's on-hold services
///
/// GET /api/v1/services/mine/on-hold
#[instrument(skip(lifecycle, user))]
pub async fn my_on_hold_services(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    list_mine(&lifecycle, &user, &query, Some(ServiceStatus::OnHold)).await
}

/// The acting technician's completed services
///
/// GET /api/v1/services/mine/history
#[instrument(skip(lifecycle, user))]
pub async fn my_service_history(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    list_mine(&lifecycle, &user, &query, Some(ServiceStatus::Completed)).await
}

async fn list_mine(
    lifecycle: &AppLifecycle,
    user: &AuthenticatedUser,
    query: &PaginationParams,
    status: Option<ServiceStatus>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let (services, total) = lifecycle
        .my_services(&user.actor, status, &query.to_pagination())
        .await?;

    Ok(HttpResponse::Ok().json(query.paginate(services, total)))
}

/// Aggregate statistics for the acting technician
///
/// GET /api/v1/services/stats/me
#[instrument(skip(lifecycle, user))]
pub async fn my_stats(
    lifecycle: web::Data<Arc<AppLifecycle>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let stats = lifecycle.my_stats(&user.actor).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

/// Configure service routes
///
/// Literal segments are registered before the `{id}` capture.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/services")
            .route("/start", web::post().to(start_service))
            .route("/mine", web::get().to(my_services))
            .route("/mine/active", web::get().to(my_active_services))
            .route("/mine/on-hold", web::get().to(my_on_hold_services))
            .route("/mine/history", web::get().to(my_service_history))
            .route("/stats/me", web::get().to(my_stats))
            .route("/materials", web::post().to(add_material))
            .route("/materials/{line_id}", web::put().to(update_material_quantity))
            .route("/materials/{line_id}", web::delete().to(remove_material))
            .route("", web::get().to(list_services))
            .route("/{id}", web::get().to(get_service))
            .route("/{id}", web::put().to(update_service))
            .route("/{id}", web::delete().to(delete_service))
            .route("/{id}/pause", web::post().to(pause_service))
            .route("/{id}/resume", web::post().to(resume_service))
            .route("/{id}/complete", web::post().to(complete_service))
            .route("/{id}/materials", web::get().to(list_service_materials))
            .route("/{id}/notes", web::post().to(add_note))
            .route("/{id}/location", web::put().to(update_location)),
    );
}
