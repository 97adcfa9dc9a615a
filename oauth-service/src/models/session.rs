//! Session model - one authenticated interactive login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Terminated,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Terminated => "terminated",
        }
    }
}

/// Session entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub status: SessionStatus,
    /// Strictly increasing per user, assigned at creation.
    pub sequence_id: u64,
    pub created_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a new active session.
    pub fn new(user_id: Uuid, sequence_id: u64) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            status: SessionStatus::Active,
            sequence_id,
            created_at: Utc::now(),
            terminated_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Move to `Terminated`. Returns false when the session already was,
    /// leaving it untouched.
    pub fn terminate(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = SessionStatus::Terminated;
        self.terminated_at = Some(Utc::now());
        true
    }
}

/// Session shape exposed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub sequence_id: u64,
    pub created_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
}

impl From<Session> for SessionResponse {
    fn from(s: Session) -> Self {
        Self {
            session_id: s.session_id,
            status: s.status,
            sequence_id: s.sequence_id,
            created_at: s.created_at,
            terminated_at: s.terminated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_active() {
        let session = Session::new(Uuid::new_v4(), 1);
        assert!(session.is_active());
        assert!(session.terminated_at.is_none());
    }

    #[test]
    fn test_terminate_happens_once() {
        let mut session = Session::new(Uuid::new_v4(), 1);
        assert!(session.terminate());
        let terminated_at = session.terminated_at;
        assert!(terminated_at.is_some());

        assert!(!session.terminate());
        assert_eq!(session.status, SessionStatus::Terminated);
        assert_eq!(session.terminated_at, terminated_at);
    }
}
