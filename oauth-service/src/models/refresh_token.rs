use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::utils::hash_token;

/// Refresh token record. Single use: presenting it rotates it.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub id: Uuid,

    /// SHA-256 hash of the opaque token
    pub token_hash: String,

    /// Client the token was issued to; must match on redemption
    pub client_id: Uuid,

    pub user_id: Option<Uuid>,

    /// Session the token hangs off; terminating it kills the token
    pub session_id: Option<Uuid>,

    pub scopes: Vec<String>,

    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    pub fn new(
        token: &str,
        client_id: Uuid,
        user_id: Option<Uuid>,
        session_id: Option<Uuid>,
        scopes: Vec<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            token_hash: hash_token(token),
            client_id,
            user_id,
            session_id,
            scopes,
            expires_at: now + ttl,
            created_at: now,
            revoked_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Not expired and not revoked.
    pub fn is_valid(&self) -> bool {
        !self.is_expired() && !self.is_revoked()
    }
}
