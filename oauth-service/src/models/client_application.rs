//! Client application model - a registered OAuth client.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Registered OAuth client. The secret is only ever held as an Argon2id
/// hash plus its salt.
#[derive(Debug, Clone)]
pub struct ClientApplication {
    pub id: Uuid,
    pub name: String,
    pub callback_uri: String,
    pub secret_hash: String,
    pub secret_salt: String,
    /// Scopes this client may be granted.
    pub allowed_scopes: Vec<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub modified_by: Option<String>,
}

impl ClientApplication {
    pub fn new(
        name: String,
        callback_uri: String,
        secret_hash: String,
        secret_salt: String,
        allowed_scopes: Vec<String>,
        created_by: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            callback_uri,
            secret_hash,
            secret_salt,
            allowed_scopes,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: Utc::now(),
            created_by,
            modified_at: None,
            modified_by: None,
        }
    }

    /// Case-insensitive key used for the name uniqueness index.
    pub fn name_key(name: &str) -> String {
        name.trim().to_lowercase()
    }

    pub fn touch(&mut self, actor: &str) {
        self.modified_at = Some(Utc::now());
        self.modified_by = Some(actor.to_string());
    }

    pub fn mark_deleted(&mut self, actor: &str) {
        let now = Utc::now();
        self.is_deleted = true;
        self.deleted_at = Some(now);
        self.deleted_by = Some(actor.to_string());
        self.modified_at = Some(now);
        self.modified_by = Some(actor.to_string());
    }
}

/// Client shape for API responses (no secret material).
#[derive(Debug, Clone, Serialize)]
pub struct ClientApplicationResponse {
    pub id: Uuid,
    pub name: String,
    pub callback_uri: String,
    pub allowed_scopes: Vec<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub modified_by: Option<String>,
}

impl From<ClientApplication> for ClientApplicationResponse {
    fn from(c: ClientApplication) -> Self {
        Self {
            id: c.id,
            name: c.name,
            callback_uri: c.callback_uri,
            allowed_scopes: c.allowed_scopes,
            is_deleted: c.is_deleted,
            created_at: c.created_at,
            created_by: c.created_by,
            modified_at: c.modified_at,
            modified_by: c.modified_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> ClientApplication {
        ClientApplication::new(
            "Billing".to_string(),
            "https://billing.example.com/callback".to_string(),
            "hash".to_string(),
            "salt".to_string(),
            vec!["read".to_string()],
            "admin@example.com".to_string(),
        )
    }

    #[test]
    fn test_name_key_is_case_insensitive() {
        assert_eq!(
            ClientApplication::name_key(" Billing "),
            ClientApplication::name_key("BILLING")
        );
    }

    #[test]
    fn test_mark_deleted_sets_markers() {
        let mut app = app();
        app.mark_deleted("root@example.com");
        assert!(app.is_deleted);
        assert!(app.deleted_at.is_some());
        assert_eq!(app.deleted_by.as_deref(), Some("root@example.com"));
        assert_eq!(app.modified_by.as_deref(), Some("root@example.com"));
    }
}
