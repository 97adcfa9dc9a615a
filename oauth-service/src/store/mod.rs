//! Persistence seams.
//!
//! Each trait covers one entity and every mutation on it is atomic at that
//! single-entity granularity. The in-memory implementations in [`memory`]
//! back the binary and the test suites; a database-backed implementation
//! only has to honour the same contracts.

pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    Activity, AuthorizationCode, ClientApplication, DeviceAuthorization, RefreshToken, Session,
    User,
};
use crate::services::ServiceError;

pub use memory::{
    InMemoryActivityStore, InMemoryAuthorizationCodeStore, InMemoryClientStore,
    InMemoryDeviceCodeStore, InMemoryRefreshTokenStore, InMemorySessionStore, InMemoryUserStore,
};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the email (case-insensitive) is taken.
    async fn insert(&self, user: User) -> Result<User, ServiceError>;
    /// Active users only.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;
    async fn update_credentials(
        &self,
        user_id: Uuid,
        password_hash: String,
        password_salt: String,
    ) -> Result<User, ServiceError>;
    async fn soft_delete(&self, user_id: Uuid) -> Result<User, ServiceError>;
}

#[async_trait]
pub trait SessionReader: Send + Sync {
    /// All sessions of a user, newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, ServiceError>;
    /// Fails with `NotFound` if absent.
    async fn get(&self, session_id: Uuid) -> Result<Session, ServiceError>;
}

#[async_trait]
pub trait SessionWriter: Send + Sync {
    /// New `Active` session carrying the user's next sequence id.
    async fn create(&self, user_id: Uuid) -> Result<Session, ServiceError>;
    /// `Active` → `Terminated`. A second attempt fails with `InvalidState`.
    async fn terminate(&self, session: &Session) -> Result<Session, ServiceError>;
    /// Terminates every active session of the user, returning those it
    /// changed.
    async fn terminate_all_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, ServiceError>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Fails with `Conflict` when the name (case-insensitive) is taken.
    async fn insert(&self, app: ClientApplication) -> Result<ClientApplication, ServiceError>;
    /// Excludes soft-deleted applications.
    async fn find_active(&self, id: Uuid) -> Result<Option<ClientApplication>, ServiceError>;
    /// Includes soft-deleted applications, for audit reads.
    async fn find_for_audit(&self, id: Uuid) -> Result<Option<ClientApplication>, ServiceError>;
    async fn list_active(&self) -> Result<Vec<ClientApplication>, ServiceError>;
    async fn rename(
        &self,
        id: Uuid,
        new_name: &str,
        actor: &str,
    ) -> Result<ClientApplication, ServiceError>;
    async fn update_secret(
        &self,
        id: Uuid,
        secret_hash: String,
        secret_salt: String,
        actor: &str,
    ) -> Result<ClientApplication, ServiceError>;
    async fn soft_delete(&self, id: Uuid, actor: &str) -> Result<ClientApplication, ServiceError>;
}

#[async_trait]
pub trait AuthorizationCodeStore: Send + Sync {
    async fn insert(&self, code: AuthorizationCode) -> Result<(), ServiceError>;
    /// Removes the code and returns it marked consumed. Unknown,
    /// mismatched, expired or already consumed codes fail with
    /// `InvalidGrant`; a mismatch leaves the code redeemable.
    async fn consume(
        &self,
        code_hash: &str,
        client_id: Uuid,
        redirect_uri: &str,
    ) -> Result<AuthorizationCode, ServiceError>;
    /// Drops codes past their expiry, returning how many went.
    async fn purge_expired(&self) -> Result<usize, ServiceError>;
}

#[async_trait]
pub trait DeviceCodeStore: Send + Sync {
    async fn insert(&self, record: DeviceAuthorization) -> Result<(), ServiceError>;
    /// Out-of-band approval by a logged-in user.
    async fn approve(
        &self,
        user_code: &str,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<(), ServiceError>;
    async fn deny(&self, user_code: &str) -> Result<(), ServiceError>;
    /// Polling by the device. An approved record is removed and returned;
    /// otherwise `AuthorizationPending`, `Expired` or `InvalidGrant`.
    /// Denied and expired records are dropped once reported, freeing their
    /// user codes.
    async fn redeem(
        &self,
        device_code_hash: &str,
        client_id: Uuid,
    ) -> Result<DeviceAuthorization, ServiceError>;
    async fn purge_expired(&self) -> Result<usize, ServiceError>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, token: RefreshToken) -> Result<(), ServiceError>;
    async fn find(&self, token_hash: &str) -> Result<Option<RefreshToken>, ServiceError>;
    /// Drop `old_hash` and store `replacement` as one step. Fails with
    /// `InvalidGrant`, changing nothing, if the old token is no longer
    /// valid.
    async fn rotate(&self, old_hash: &str, replacement: RefreshToken) -> Result<(), ServiceError>;
    async fn revoke_for_session(&self, session_id: Uuid) -> Result<usize, ServiceError>;
    async fn revoke_for_user(&self, user_id: Uuid) -> Result<usize, ServiceError>;
    /// Drops expired and revoked tokens.
    async fn purge_expired(&self) -> Result<usize, ServiceError>;
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn append(&self, activity: Activity) -> Result<(), ServiceError>;
    /// Newest first.
    async fn list_for_actor(&self, actor_email: &str) -> Result<Vec<Activity>, ServiceError>;
}

/// Every store the services need, passed explicitly at construction.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub session_reader: Arc<dyn SessionReader>,
    pub session_writer: Arc<dyn SessionWriter>,
    pub clients: Arc<dyn ClientStore>,
    pub codes: Arc<dyn AuthorizationCodeStore>,
    pub devices: Arc<dyn DeviceCodeStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub activities: Arc<dyn ActivityStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let sessions = Arc::new(InMemorySessionStore::default());
        Self {
            users: Arc::new(InMemoryUserStore::default()),
            session_reader: sessions.clone(),
            session_writer: sessions,
            clients: Arc::new(InMemoryClientStore::default()),
            codes: Arc::new(InMemoryAuthorizationCodeStore::default()),
            devices: Arc::new(InMemoryDeviceCodeStore::default()),
            refresh_tokens: Arc::new(InMemoryRefreshTokenStore::default()),
            activities: Arc::new(InMemoryActivityStore::default()),
        }
    }

    /// Sweeps dead codes and refresh tokens out of the short-lived stores.
    pub async fn purge_expired(&self) -> Result<usize, ServiceError> {
        let codes = self.codes.purge_expired().await?;
        let devices = self.devices.purge_expired().await?;
        let refresh_tokens = self.refresh_tokens.purge_expired().await?;
        Ok(codes + devices + refresh_tokens)
    }
}
