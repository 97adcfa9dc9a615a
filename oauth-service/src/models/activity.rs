//! Activity model - audit trail of privileged actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::GrantType;

/// Activity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    UserRegistered,
    UserLogin,
    UserLogout,
    PasswordReset,
    AccountDeleted,
    SessionTerminated,
    AuthorizationCodeIssued,
    DeviceAuthorizationStarted,
    TokenIssued,
    ApplicationCreated,
    ApplicationUpdated,
    ApplicationSecretRotated,
    ApplicationDeleted,
    RoleChanged,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::UserRegistered => "user_registered",
            ActivityKind::UserLogin => "user_login",
            ActivityKind::UserLogout => "user_logout",
            ActivityKind::PasswordReset => "password_reset",
            ActivityKind::AccountDeleted => "account_deleted",
            ActivityKind::SessionTerminated => "session_terminated",
            ActivityKind::AuthorizationCodeIssued => "authorization_code_issued",
            ActivityKind::DeviceAuthorizationStarted => "device_authorization_started",
            ActivityKind::TokenIssued => "token_issued",
            ActivityKind::ApplicationCreated => "application_created",
            ActivityKind::ApplicationUpdated => "application_updated",
            ActivityKind::ApplicationSecretRotated => "application_secret_rotated",
            ActivityKind::ApplicationDeleted => "application_deleted",
            ActivityKind::RoleChanged => "role_changed",
        }
    }
}

/// Immutable audit record: who did what, with a snapshot of the payload.
#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub id: Uuid,
    pub actor_email: String,
    pub kind: ActivityKind,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl Activity {
    /// Snapshot any serializable payload into a new record.
    pub fn new<P: Serialize + ?Sized>(
        actor_email: impl Into<String>,
        kind: ActivityKind,
        payload: &P,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            actor_email: actor_email.into(),
            kind,
            payload: serde_json::to_value(payload)?,
            recorded_at: Utc::now(),
        })
    }

    /// Decode the payload back into its typed form.
    pub fn payload_as<P: serde::de::DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Payload of [`ActivityKind::TokenIssued`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenIssuedPayload {
    pub client_id: Uuid,
    pub grant_type: GrantType,
    pub scope: String,
    pub session_id: Option<Uuid>,
    pub refresh_token_issued: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub session_id: Uuid,
    pub sequence_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPayload {
    pub user_id: Uuid,
    pub email: String,
    #[serde(default)]
    pub sessions_terminated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationPayload {
    pub application_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChangePayload {
    pub user_id: Uuid,
    pub role: String,
    pub granted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_round_trips_typed_payload() {
        let payload = ApplicationPayload {
            application_id: Uuid::new_v4(),
            name: "Billing".to_string(),
            previous_name: None,
        };
        let activity =
            Activity::new("admin@example.com", ActivityKind::ApplicationCreated, &payload).unwrap();

        assert_eq!(activity.kind.as_str(), "application_created");
        assert!(activity.payload.get("previous_name").is_none());
        assert_eq!(activity.payload_as::<ApplicationPayload>().unwrap(), payload);
    }

    #[test]
    fn test_role_change_payload() {
        let payload = RoleChangePayload {
            user_id: Uuid::new_v4(),
            role: "auditor".to_string(),
            granted: false,
        };
        let activity =
            Activity::new("admin@example.com", ActivityKind::RoleChanged, &payload).unwrap();

        assert_eq!(activity.payload["granted"], false);
        assert_eq!(activity.payload_as::<RoleChangePayload>().unwrap(), payload);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ActivityKind::ApplicationSecretRotated).unwrap();
        assert_eq!(json, "\"application_secret_rotated\"");
    }
}
