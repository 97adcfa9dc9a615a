//! Device authorization model (RFC 8628).

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::utils::{generate_opaque_token, generate_user_code, hash_token};

/// Where a device code is in its lifecycle. Approval and denial are set by
/// an out-of-band actor; this crate only reads them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCodeStatus {
    Pending,
    Approved { user_id: Uuid, session_id: Uuid },
    Denied,
}

#[derive(Debug, Clone)]
pub struct DeviceAuthorization {
    pub device_code_hash: String,
    pub user_code: String,
    pub client_id: Uuid,
    pub scopes: Vec<String>,
    pub status: DeviceCodeStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub interval_seconds: u64,
}

impl DeviceAuthorization {
    /// Mint a fresh pending authorization. Returns the record and the
    /// plaintext device code, which is never stored.
    pub fn issue(
        client_id: Uuid,
        scopes: Vec<String>,
        ttl: Duration,
        interval_seconds: u64,
    ) -> (Self, String) {
        let device_code = generate_opaque_token(32);
        let now = Utc::now();
        let record = Self {
            device_code_hash: hash_token(&device_code),
            user_code: generate_user_code(),
            client_id,
            scopes,
            status: DeviceCodeStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
            interval_seconds,
        };
        (record, device_code)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn expires_in_seconds(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}
