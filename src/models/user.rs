//! User model
//!
//! Application users included in backups under the user-data scope.
//! The username is the natural key for merge-restore matching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::UserId;

/// Role assigned to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Full access, including restores and settings
    Admin,
    /// Day-to-day inventory operations
    #[default]
    Operator,
    /// Read-only access
    Viewer,
}

impl UserRole {
    /// Parse a role from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "operator" => Some(Self::Operator),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Operator => write!(f, "operator"),
            Self::Viewer => write!(f, "viewer"),
        }
    }
}

/// An application user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: UserId,

    /// Login name, unique across users
    pub username: String,

    /// Display name
    #[serde(default)]
    pub display_name: String,

    /// Assigned role
    #[serde(default)]
    pub role: UserRole,

    /// When the user was created
    pub created_at: DateTime<Utc>,

    /// When the user was last modified
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with default values
    pub fn new(username: impl Into<String>, role: UserRole) -> Self {
        let now = Utc::now();
        let username = username.into();
        Self {
            id: UserId::new(),
            display_name: username.clone(),
            username,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    /// Compare business fields only, ignoring id and timestamps
    pub fn content_eq(&self, other: &User) -> bool {
        self.username == other.username
            && self.display_name == other.display_name
            && self.role == other.role
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.username, self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user() {
        let user = User::new("kaylee", UserRole::Admin);
        assert_eq!(user.username, "kaylee");
        assert_eq!(user.display_name, "kaylee");
        assert_eq!(user.role, UserRole::Admin);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(UserRole::parse("admin"), Some(UserRole::Admin));
        assert_eq!(UserRole::parse("VIEWER"), Some(UserRole::Viewer));
        assert_eq!(UserRole::parse("invalid"), None);
    }

    #[test]
    fn test_content_eq() {
        let a = User::new("kaylee", UserRole::Operator);
        let mut b = a.clone();
        b.id = UserId::new();
        assert!(a.content_eq(&b));

        b.role = UserRole::Admin;
        assert!(!a.content_eq(&b));
    }

    #[test]
    fn test_serialization() {
        let user = User::new("test", UserRole::Viewer);
        let json = serde_json::to_string(&user).unwrap();
        let deserialized: User = serde_json::from_str(&json).unwrap();
        assert_eq!(user, deserialized);
    }
}
