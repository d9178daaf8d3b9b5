//! Catalog handlers
//!
//! Read-only HTTP handlers for the city and material catalogs.

use crate::dto::{ApiResponse, PaginationParams};
use crate::AppCatalog;
use actix_web::{web, HttpResponse};
use fieldops_auth::AuthenticatedUser;
use fieldops_core::AppError;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{instrument, warn};
use validator::Validate;

/// Optional name filter for the city listing
#[derive(Debug, Deserialize)]
pub struct CityQuery {
    pub name: Option<String>,
}

/// List cities, or look one up by name
///
/// GET /api/v1/cities
#[instrument(skip(catalog, _user))]
pub async fn list_cities(
    catalog: web::Data<Arc<AppCatalog>>,
    _user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
    filter: web::Query<CityQuery>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    if let Some(name) = filter.name.as_deref() {
        let city = catalog.city_by_name(name).await?;
        return Ok(HttpResponse::Ok().json(ApiResponse::success(vec![city])));
    }

    let cities = catalog.list_cities(&query.to_pagination()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(cities)))
}

/// Get a single city
///
/// GET /api/v1/cities/{id}
#[instrument(skip(catalog, _user))]
pub async fn get_city(
    catalog: web::Data<Arc<AppCatalog>>,
    _user: AuthenticatedUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let city = catalog.city(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(city)))
}

/// List active catalog materials
///
/// GET /api/v1/materials
#[instrument(skip(catalog, _user))]
pub async fn list_materials(
    catalog: web::Data<Arc<AppCatalog>>,
    _user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let materials = catalog.active_materials(&query.to_pagination()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(materials)))
}

/// Get a single material
///
/// GET /api/v1/materials/{id}
#[instrument(skip(catalog, _user))]
pub async fn get_material(
    catalog: web::Data<Arc<AppCatalog>>,
    _user: AuthenticatedUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let material = catalog.material(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(material)))
}

/// Configure city routes
pub fn configure_cities(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/cities")
            .route("", web::get().to(list_cities))
            .route("/{id}", web::get().to(get_city)),
    );
}

/// Configure material routes
pub fn configure_materials(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/materials")
            .route("", web::get().to(list_materials))
            .route("/{id}", web::get().to(get_material)),
    );
}
