//! Actix-web authentication middleware and request extractors
//!
//! Provides extractors for authenticated users with role-based access control.

use crate::jwt::JwtService;
use crate::Claims;
use actix_web::{dev::Payload, error::ErrorUnauthorized, web, FromRequest, HttpRequest};
use fieldops_core::error::AppError;
use fieldops_core::models::{Actor, UserRole};
use futures::future::{ready, Ready};
use std::sync::Arc;
use tracing::{debug, warn};

/// Extract JWT token from request
///
/// Checks for token in the following order:
/// 1. Authorization header (Bearer token)
/// 2. Cookie named "token"
fn extract_token_from_request(req: &HttpRequest) -> Option<String> {
    if let Some(auth_header) = req.headers().get("Authorization") {
        if let Ok(auth_str) = auth_header.to_str() {
            if auth_str.starts_with("Bearer ") {
                return Some(auth_str[7..].to_string());
            }
        }
    }

    if let Some(cookie) = req.cookie("token") {
        return Some(cookie.value().to_string());
    }

    None
}

/// Authenticated user extractor
///
/// Extracts and validates the JWT token, yielding the actor handed to
/// business logic. Inactive accounts are rejected here, before any handler
/// runs.
///
/// # Examples
///
/// ```no_run
/// use actix_web::HttpResponse;
/// use fieldops_auth::middleware::AuthenticatedUser;
///
/// async fn protected_handler(user: AuthenticatedUser) -> HttpResponse {
///     HttpResponse::Ok().json(serde_json::json!({
///         "user_id": user.actor.id,
///         "role": user.actor.role
///     }))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Actor identity passed to business logic
    pub actor: Actor,

    /// Full claims from the JWT token
    pub claims: Claims,
}

impl AuthenticatedUser {
    /// Get the user's role
    pub fn role(&self) -> UserRole {
        self.actor.role
    }

    /// Check if user has admin privileges
    pub fn is_admin(&self) -> bool {
        self.actor.role.is_admin()
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let jwt_service = match req.app_data::<web::Data<Arc<JwtService>>>() {
            Some(service) => service.get_ref().clone(),
            None => {
                warn!("JwtService not found in app data");
                return ready(Err(ErrorUnauthorized(AppError::Unauthorized(
                    "Authentication service not configured".to_string(),
                ))));
            }
        };

        let token = match extract_token_from_request(req) {
            Some(t) => t,
            None => {
                debug!("No authentication token found in request");
                return ready(Err(ErrorUnauthorized(AppError::Unauthorized(
                    "No authentication token provided".to_string(),
                ))));
            }
        };

        match jwt_service.validate_token(&token) {
            Ok(claims) => {
                let actor = match claims.actor() {
                    Some(actor) => actor,
                    None => {
                        warn!(sub = %claims.sub, "Token subject is not a valid user id");
                        return ready(Err(ErrorUnauthorized(AppError::InvalidToken(
                            "Malformed token subject".to_string(),
                        ))));
                    }
                };

                if !actor.is_active {
                    warn!(user_id = actor.id, "Inactive account attempted access");
                    return ready(Err(ErrorUnauthorized(AppError::AccessDenied)));
                }

                debug!(
                    user_id = actor.id,
                    role = ?actor.role,
                    "User authenticated successfully"
                );

                ready(Ok(AuthenticatedUser { actor, claims }))
            }
            Err(e) => {
                warn!(error = %e, "Token validation failed");
                ready(Err(ErrorUnauthorized(e)))
            }
        }
    }
}

/// Admin user extractor
///
/// Requires the admin role; any other role is rejected before the handler.
///
/// # Examples
///
/// ```no_run
/// use actix_web::HttpResponse;
/// use fieldops_auth::middleware::AdminUser;
///
/// async fn admin_handler(admin: AdminUser) -> HttpResponse {
///     HttpResponse::Ok().json(serde_json::json!({
///         "message": "Admin access granted",
///         "user_id": admin.actor.id
///     }))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

impl std::ops::Deref for AdminUser {
    type Target = AuthenticatedUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for AdminUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let auth_user = match AuthenticatedUser::from_request(req, payload).into_inner() {
            Ok(user) => user,
            Err(e) => return ready(Err(e)),
        };

        if !auth_user.is_admin() {
            warn!(
                user_id = auth_user.actor.id,
                role = ?auth_user.actor.role,
                "User attempted admin access without privileges"
            );
            return ready(Err(ErrorUnauthorized(AppError::AccessDenied)));
        }

        debug!(user_id = auth_user.actor.id, "Admin access granted");

        ready(Ok(AdminUser(auth_user)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use fieldops_core::models::{User, UserRole};
    use chrono::Utc;

    fn create_test_jwt_service() -> Arc<JwtService> {
        Arc::new(JwtService::new("test-secret-key-12345", 3600))
    }

    fn test_user(id: i32, role: UserRole, is_active: bool) -> User {
        User {
            id,
            name: format!("user-{}", id),
            email: format!("user{}@example.com", id),
            password_hash: String::new(),
            role,
            is_active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[actix_web::test]
    async fn test_extract_token_from_authorization_header() {
        let jwt_service = create_test_jwt_service();
        let token = jwt_service
            .create_token_for_user(&test_user(7, UserRole::User, true))
            .unwrap();

        let app = test::init_service(App::new().app_data(web::Data::new(jwt_service)).route(
            "/test",
            web::get().to(|user: AuthenticatedUser| async move {
                assert_eq!(user.actor.id, 7);
                "OK"
            }),
        ))
        .await;

        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_missing_token() {
        let jwt_service = create_test_jwt_service();

        let app = test::init_service(App::new().app_data(web::Data::new(jwt_service)).route(
            "/test",
            web::get().to(|_user: AuthenticatedUser| async { "OK" }),
        ))
        .await;

        let req = test::TestRequest::get().uri("/test").to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    #[actix_web::test]
    async fn test_invalid_token() {
        let jwt_service = create_test_jwt_service();

        let app = test::init_service(App::new().app_data(web::Data::new(jwt_service)).route(
            "/test",
            web::get().to(|_user: AuthenticatedUser| async { "OK" }),
        ))
        .await;

        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header(("Authorization", "Bearer invalid.token.here"))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    #[actix_web::test]
    async fn test_inactive_account_rejected() {
        let jwt_service = create_test_jwt_service();
        let token = jwt_service
            .create_token_for_user(&test_user(3, UserRole::User, false))
            .unwrap();

        let app = test::init_service(App::new().app_data(web::Data::new(jwt_service)).route(
            "/test",
            web::get().to(|_user: AuthenticatedUser| async { "OK" }),
        ))
        .await;

        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    #[actix_web::test]
    async fn test_admin_user_with_admin_role() {
        let jwt_service = create_test_jwt_service();
        let token = jwt_service
            .create_token_for_user(&test_user(1, UserRole::Admin, true))
            .unwrap();

        let app = test::init_service(App::new().app_data(web::Data::new(jwt_service)).route(
            "/admin",
            web::get().to(|admin: AdminUser| async move {
                assert_eq!(admin.actor.id, 1);
                "OK"
            }),
        ))
        .await;

        let req = test::TestRequest::get()
            .uri("/admin")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_admin_user_with_user_role() {
        let jwt_service = create_test_jwt_service();
        let token = jwt_service
            .create_token_for_user(&test_user(2, UserRole::User, true))
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(jwt_service))
                .route("/admin", web::get().to(|_admin: AdminUser| async { "OK" })),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/admin")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_authenticated_user_methods() {
        let claims = Claims::new(5, "Ana", UserRole::Admin);
        let user = AuthenticatedUser {
            actor: claims.actor().unwrap(),
            claims,
        };

        assert_eq!(user.role(), UserRole::Admin);
        assert!(user.is_admin());
    }

    #[test]
    fn test_admin_user_deref() {
        let claims = Claims::new(1, "Admin", UserRole::Admin);
        let auth_user = AuthenticatedUser {
            actor: claims.actor().unwrap(),
            claims,
        };
        let admin = AdminUser(auth_user);

        assert_eq!(admin.actor.id, 1);
        assert!(admin.is_admin());
    }
}
