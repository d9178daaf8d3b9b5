//! Authentication handlers
//!
//! HTTP handlers for login, registration, and the current-user endpoint.

use crate::dto::auth::{LoginRequest, LoginResponse, MeResponse, RegisterRequest};
use crate::dto::ApiResponse;
use actix_web::{cookie::Cookie, web, HttpResponse};
use fieldops_auth::{AdminUser, AuthenticatedUser, JwtService, PasswordService};
use fieldops_core::models::{User, UserInfo, UserRole};
use fieldops_core::traits::{Repository, UserRepository};
use fieldops_core::AppError;
use fieldops_db::PgUserRepository;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use validator::Validate;

/// Login endpoint
///
/// POST /api/v1/auth/login
#[instrument(skip(pool, jwt_service, password_service, req))]
pub async fn login(
    pool: web::Data<PgPool>,
    jwt_service: web::Data<Arc<JwtService>>,
    password_service: web::Data<Arc<PasswordService>>,
    req: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Login validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let email = req.email.trim();
    debug!(email = %email, "Processing login request");

    let user_repo = PgUserRepository::new(pool.get_ref().clone());
    let user = user_repo.find_by_email(email).await?.ok_or_else(|| {
        info!(email = %email, "Login failed: user not found");
        AppError::InvalidCredentials
    })?;

    if !user.is_active {
        warn!(email = %email, "Login failed: user is inactive");
        return Err(AppError::InvalidCredentials);
    }

    let password_valid = password_service
        .verify_password(&req.password, &user.password_hash)
        .map_err(|e| {
            error!("Password verification error: {}", e);
            AppError::Internal("Password verification failed".to_string())
        })?;

    if !password_valid {
        info!(email = %email, "Login failed: invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = jwt_service.create_token_for_user(&user)?;
    let expires_in = jwt_service.expiration_secs();

    info!(user_id = user.id, role = ?user.role, "Login successful");

    let response = LoginResponse::new(token.clone(), expires_in, UserInfo::from(&user));

    let cookie = Cookie::build("token", token)
        .path("/")
        .http_only(true)
        .max_age(actix_web::cookie::time::Duration::seconds(expires_in))
        .finish();

    Ok(HttpResponse::Ok()
        .cookie(cookie)
        .json(ApiResponse::success(response)))
}

/// Register new user (admin only)
///
/// POST /api/v1/auth/register — the Argon2 hash is assigned explicitly
/// here; a password never reaches the repository in clear text.
#[instrument(skip(pool, password_service, admin, req))]
pub async fn register(
    pool: web::Data<PgPool>,
    password_service: web::Data<Arc<PasswordService>>,
    admin: AdminUser,
    req: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Register validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    debug!(email = %req.email, admin_id = admin.actor.id, "Processing registration");

    let role = req
        .role
        .as_deref()
        .and_then(UserRole::from_str)
        .unwrap_or(UserRole::User);

    let password_hash = password_service.hash_password(&req.password)?;

    let new_user = User {
        id: 0,
        name: req.name.trim().to_string(),
        email: req.email.trim().to_lowercase(),
        password_hash,
        role,
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let user_repo = PgUserRepository::new(pool.get_ref().clone());
    let created = user_repo.create(&new_user).await?;

    info!(
        user_id = created.id,
        role = ?created.role,
        admin_id = admin.actor.id,
        "User registered"
    );

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        UserInfo::from(&created),
        "User created successfully",
    )))
}

/// Get current user info
///
/// GET /api/v1/auth/me
#[instrument(skip(pool, user))]
pub async fn me(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let user_repo = PgUserRepository::new(pool.get_ref().clone());
    let db_user = user_repo
        .find_by_id(user.actor.id)
        .await?
        .ok_or_else(|| AppError::UserNotFound(user.actor.id.to_string()))?;

    let token_expires_at = Utc::now() + Duration::seconds(user.claims.exp - Utc::now().timestamp());

    let response = MeResponse {
        user: UserInfo::from(&db_user),
        token_expires_at,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

/// Configure auth routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/login", web::post().to(login))
            .route("/register", web::post().to(register))
            .route("/me", web::get().to(me)),
    );
}
