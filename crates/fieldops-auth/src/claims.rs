//! JWT Claims structure
//!
//! Defines the claims structure used in JWT tokens for authentication.

use fieldops_core::models::{Actor, User, UserRole};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

/// JWT Claims
///
/// Carries the authenticated user's identity. The subject is the numeric
/// user id as a string; name and role travel alongside so request handling
/// does not need a user lookup per call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject (user id as string)
    pub sub: String,

    /// Display name
    pub name: String,

    /// User role
    pub role: UserRole,

    /// Whether the account was active when the token was issued
    pub is_active: bool,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Create new claims for a user id, name and role
    ///
    /// # Examples
    ///
    /// ```
    /// use fieldops_auth::Claims;
    /// use fieldops_core::models::UserRole;
    ///
    /// let claims = Claims::new(7, "Ana", UserRole::Admin);
    /// assert_eq!(claims.sub, "7");
    /// assert_eq!(claims.role, UserRole::Admin);
    /// ```
    pub fn new(user_id: i32, name: &str, role: UserRole) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id.to_string(),
            name: name.to_string(),
            role,
            is_active: true,
            iat: now.timestamp(),
            exp: 0, // Will be set by JwtService
        }
    }

    /// Create claims from a stored user record
    pub fn from_user(user: &User) -> Self {
        let mut claims = Self::new(user.id, &user.name, user.role);
        claims.is_active = user.is_active;
        claims
    }

    /// Create new claims with custom expiration duration
    pub fn with_expiration(user_id: i32, name: &str, role: UserRole, expires_in_secs: i64) -> Self {
        let now = Utc::now();
        let exp = now + Duration::seconds(expires_in_secs);

        Self {
            sub: user_id.to_string(),
            name: name.to_string(),
            role,
            is_active: true,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        let now = Utc::now().timestamp();
        self.exp <= now
    }

    /// Numeric user id from the subject
    ///
    /// Returns `None` if the subject is not a valid integer.
    pub fn user_id(&self) -> Option<i32> {
        self.sub.parse().ok()
    }

    /// Get the user role
    pub fn role(&self) -> UserRole {
        self.role
    }

    /// Check if user has admin privileges
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Build the actor handed to business logic
    pub fn actor(&self) -> Option<Actor> {
        Some(Actor {
            id: self.user_id()?,
            name: self.name.clone(),
            role: self.role,
            is_active: self.is_active,
        })
    }
}
