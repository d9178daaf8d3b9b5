//! Authentication DTOs

use chrono::{DateTime, Utc};
use fieldops_core::models::UserInfo;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Login request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Login response with token and user info
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: UserInfo,
}

impl LoginResponse {
    pub fn new(token: String, expires_in: i64, user: UserInfo) -> Self {
        Self {
            token,
            expires_in,
            user,
        }
    }
}

/// Registration request (admin only)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 120, message = "Name is required"))]
    pub name: String,

    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    /// "admin" or "user"; defaults to "user"
    pub role: Option<String>,
}

/// Current-user response
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub user: UserInfo,
    pub token_expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_validation() {
        let valid = LoginRequest {
            email: "tech@example.com".to_string(),
            password: "secret".to_string(),
        };
        assert!(valid.validate().is_ok());

        let invalid = LoginRequest {
            email: "not-an-email".to_string(),
            password: "".to_string(),
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_register_request_validation() {
        let short_password = RegisterRequest {
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            password: "short".to_string(),
            role: None,
        };
        assert!(short_password.validate().is_err());
    }
}
