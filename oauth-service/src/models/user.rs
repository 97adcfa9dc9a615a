//! User model - resource owners who log in interactively.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// User entity.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(email: String, password_hash: String, password_salt: String) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email,
            password_hash,
            password_salt,
            created_at: Utc::now(),
            modified_at: None,
            deleted_at: None,
        }
    }

    /// Case-insensitive key used for email lookups.
    pub fn email_key(email: &str) -> String {
        email.trim().to_lowercase()
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// User response for API (without credential fields).
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            email: u.email,
            created_at: u.created_at,
        }
    }
}
