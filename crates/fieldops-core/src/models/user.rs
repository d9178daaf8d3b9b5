//! User model and roles
//!
//! The core trusts the authenticated actor supplied by the auth boundary;
//! it never re-verifies identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::User => write!(f, "user"),
        }
    }
}

impl UserRole {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(UserRole::Admin),
            "user" => Some(UserRole::User),
            _ => None,
        }
    }

    /// Check if the role grants administrator privilege
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    /// Argon2 hash; assigned explicitly at registration or password change
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public user projection without credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Authenticated actor supplied to every lifecycle call
///
/// Produced by the auth boundary from validated token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: i32,
    pub name: String,
    pub role: UserRole,
    pub is_active: bool,
}

impl Actor {
    /// Check if this actor may mutate the given service owner's job
    pub fn can_access(&self, owner_id: i32) -> bool {
        self.id == owner_id || self.role.is_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(id: i32, role: UserRole) -> Actor {
        Actor {
            id,
            name: format!("user-{}", id),
            role,
            is_active: true,
        }
    }

    #[test]
    fn test_owner_can_access() {
        assert!(actor(1, UserRole::User).can_access(1));
        assert!(!actor(1, UserRole::User).can_access(2));
    }

    #[test]
    fn test_admin_can_access_any() {
        assert!(actor(9, UserRole::Admin).can_access(1));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(UserRole::from_str("ADMIN"), Some(UserRole::Admin));
        assert_eq!(UserRole::from_str("user"), Some(UserRole::User));
        assert_eq!(UserRole::from_str("superuser"), None);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            id: 1,
            name: "Ana".into(),
            email: "ana@example.com".into(),
            password_hash: "secret-hash".into(),
            role: UserRole::User,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
    }
}
