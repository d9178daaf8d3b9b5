//! Authentication and authorization for FieldOps
//!
//! This crate provides JWT-based authentication, password hashing with Argon2,
//! and Actix-web middleware for role-based access control.
//!
//! # Features
//!
//! - JWT token creation and validation
//! - Argon2 password hashing and verification
//! - Request extractors producing the actor identity used by business logic
//! - Admin-only route guard
//!
//! # Examples
//!
//! ## Creating a JWT token
//!
//! ```no_run
//! use fieldops_auth::{JwtService, Claims};
//! use fieldops_core::models::UserRole;
//!
//! let jwt_service = JwtService::new("your-secret-key", 3600);
//! let claims = Claims::new(1, "Admin", UserRole::Admin);
//! let token = jwt_service.create_token(&claims)?;
//! # Ok::<(), fieldops_core::error::AppError>(())
//! ```
//!
//! ## Password hashing
//!
//! ```no_run
//! use fieldops_auth::PasswordService;
//!
//! let password_service = PasswordService::new();
//! let hash = password_service.hash_password("secure_password")?;
//! let is_valid = password_service.verify_password("secure_password", &hash)?;
//! assert!(is_valid);
//! # Ok::<(), fieldops_core::error::AppError>(())
//! ```

pub mod claims;
pub mod jwt;
pub mod middleware;
pub mod password;

pub use claims::Claims;
pub use jwt::JwtService;
pub use middleware::{AdminUser, AuthenticatedUser};
pub use password::PasswordService;

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_core::models::UserRole;

    #[test]
    fn test_integration_jwt_and_password() {
        let password_service = PasswordService::new();
        let jwt_service = JwtService::new("test-secret-key-12345", 3600);

        let password = "my_secure_password";
        let hash = password_service.hash_password(password).unwrap();
        assert!(password_service.verify_password(password, &hash).unwrap());
        assert!(!password_service
            .verify_password("wrong_password", &hash)
            .unwrap());

        let claims = Claims::new(1, "Ana", UserRole::Admin);
        let token = jwt_service.create_token(&claims).unwrap();
        let decoded_claims = jwt_service.validate_token(&token).unwrap();

        assert_eq!(decoded_claims.sub, "1");
        assert_eq!(decoded_claims.role, UserRole::Admin);
    }
}
