use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

use super::{
    ActivityStore, AuthorizationCodeStore, ClientStore, DeviceCodeStore, RefreshTokenStore,
    SessionReader, SessionWriter, UserStore,
};
use crate::models::{
    Activity, AuthorizationCode, ClientApplication, DeviceAuthorization, DeviceCodeStatus,
    RefreshToken, Session, User,
};
use crate::services::ServiceError;
use crate::utils::normalize_user_code;

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryUserStore {
    users: DashMap<Uuid, User>,
    emails: DashMap<String, Uuid>,
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: User) -> Result<User, ServiceError> {
        match self.emails.entry(User::email_key(&user.email)) {
            Entry::Occupied(_) => Err(ServiceError::Conflict(
                "Email already registered".to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(user.user_id);
                self.users.insert(user.user_id, user.clone());
                Ok(user)
            }
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let Some(user_id) = self.emails.get(&User::email_key(email)).map(|r| *r.value()) else {
            return Ok(None);
        };
        Ok(self
            .users
            .get(&user_id)
            .map(|u| u.value().clone())
            .filter(User::is_active))
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self
            .users
            .get(&user_id)
            .map(|u| u.value().clone())
            .filter(User::is_active))
    }

    async fn update_credentials(
        &self,
        user_id: Uuid,
        password_hash: String,
        password_salt: String,
    ) -> Result<User, ServiceError> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .filter(|u| u.is_active())
            .ok_or(ServiceError::NotFound("User"))?;
        user.password_hash = password_hash;
        user.password_salt = password_salt;
        user.modified_at = Some(Utc::now());
        Ok(user.value().clone())
    }

    async fn soft_delete(&self, user_id: Uuid) -> Result<User, ServiceError> {
        let deleted = {
            let mut user = self
                .users
                .get_mut(&user_id)
                .filter(|u| u.is_active())
                .ok_or(ServiceError::NotFound("User"))?;
            let now = Utc::now();
            user.deleted_at = Some(now);
            user.modified_at = Some(now);
            user.value().clone()
        };
        self.emails.remove(&User::email_key(&deleted.email));
        Ok(deleted)
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<Uuid, Session>,
    sequences: DashMap<Uuid, u64>,
}

#[async_trait]
impl SessionReader for InMemorySessionStore {
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.value().clone())
            .collect();
        sessions.sort_by(|a, b| b.sequence_id.cmp(&a.sequence_id));
        Ok(sessions)
    }

    async fn get(&self, session_id: Uuid) -> Result<Session, ServiceError> {
        self.sessions
            .get(&session_id)
            .map(|s| s.value().clone())
            .ok_or(ServiceError::NotFound("Session"))
    }
}

#[async_trait]
impl SessionWriter for InMemorySessionStore {
    async fn create(&self, user_id: Uuid) -> Result<Session, ServiceError> {
        // The counter entry stays locked until the session is visible, so
        // readers never see sequence ids out of order for one user.
        let mut counter = self.sequences.entry(user_id).or_insert(0);
        *counter += 1;
        let session = Session::new(user_id, *counter);
        self.sessions.insert(session.session_id, session.clone());
        drop(counter);
        Ok(session)
    }

    async fn terminate(&self, session: &Session) -> Result<Session, ServiceError> {
        let mut stored = self
            .sessions
            .get_mut(&session.session_id)
            .ok_or(ServiceError::NotFound("Session"))?;
        if !stored.terminate() {
            return Err(ServiceError::InvalidState(
                "Session is already terminated".to_string(),
            ));
        }
        Ok(stored.value().clone())
    }

    async fn terminate_all_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        let mut terminated = Vec::new();
        for mut session in self.sessions.iter_mut() {
            if session.user_id == user_id && session.terminate() {
                terminated.push(session.value().clone());
            }
        }
        Ok(terminated)
    }
}

// ---------------------------------------------------------------------------
// Client applications
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ClientTable {
    by_id: HashMap<Uuid, ClientApplication>,
    /// Lowercased name -> id, active applications only
    by_name: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct InMemoryClientStore {
    table: RwLock<ClientTable>,
}

impl InMemoryClientStore {
    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, ClientTable>, ServiceError> {
        self.table
            .read()
            .map_err(|e| {
                ServiceError::Internal(anyhow::anyhow!("Client table lock poisoned: {}", e))
            })
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, ClientTable>, ServiceError> {
        self.table
            .write()
            .map_err(|e| {
                ServiceError::Internal(anyhow::anyhow!("Client table lock poisoned: {}", e))
            })
    }
}

fn active_mut(table: &mut ClientTable, id: Uuid) -> Result<&mut ClientApplication, ServiceError> {
    table
        .by_id
        .get_mut(&id)
        .filter(|app| !app.is_deleted)
        .ok_or(ServiceError::NotFound("Application"))
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn insert(&self, app: ClientApplication) -> Result<ClientApplication, ServiceError> {
        let mut table = self.write()?;
        let key = ClientApplication::name_key(&app.name);
        if table.by_name.contains_key(&key) {
            return Err(ServiceError::Conflict(format!(
                "An application named '{}' already exists",
                app.name
            )));
        }
        table.by_name.insert(key, app.id);
        table.by_id.insert(app.id, app.clone());
        Ok(app)
    }

    async fn find_active(&self, id: Uuid) -> Result<Option<ClientApplication>, ServiceError> {
        Ok(self
            .read()?
            .by_id
            .get(&id)
            .filter(|app| !app.is_deleted)
            .cloned())
    }

    async fn find_for_audit(&self, id: Uuid) -> Result<Option<ClientApplication>, ServiceError> {
        Ok(self.read()?.by_id.get(&id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<ClientApplication>, ServiceError> {
        let mut apps: Vec<ClientApplication> = self
            .read()?
            .by_id
            .values()
            .filter(|app| !app.is_deleted)
            .cloned()
            .collect();
        apps.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(apps)
    }

    async fn rename(
        &self,
        id: Uuid,
        new_name: &str,
        actor: &str,
    ) -> Result<ClientApplication, ServiceError> {
        let mut table = self.write()?;
        let new_key = ClientApplication::name_key(new_name);
        if let Some(owner) = table.by_name.get(&new_key) {
            if *owner != id {
                return Err(ServiceError::Conflict(format!(
                    "An application named '{}' already exists",
                    new_name
                )));
            }
        }

        let app = active_mut(&mut table, id)?;
        let old_key = ClientApplication::name_key(&app.name);
        app.name = new_name.to_string();
        app.touch(actor);
        let renamed = app.clone();

        table.by_name.remove(&old_key);
        table.by_name.insert(new_key, id);
        Ok(renamed)
    }

    async fn update_secret(
        &self,
        id: Uuid,
        secret_hash: String,
        secret_salt: String,
        actor: &str,
    ) -> Result<ClientApplication, ServiceError> {
        let mut table = self.write()?;
        let app = active_mut(&mut table, id)?;
        app.secret_hash = secret_hash;
        app.secret_salt = secret_salt;
        app.touch(actor);
        Ok(app.clone())
    }

    async fn soft_delete(&self, id: Uuid, actor: &str) -> Result<ClientApplication, ServiceError> {
        let mut table = self.write()?;
        let app = active_mut(&mut table, id)?;
        app.mark_deleted(actor);
        let deleted = app.clone();
        // The name becomes available again; the record stays for audit
        table.by_name.remove(&ClientApplication::name_key(&deleted.name));
        Ok(deleted)
    }
}

// ---------------------------------------------------------------------------
// Authorization codes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryAuthorizationCodeStore {
    codes: DashMap<String, AuthorizationCode>,
}

#[async_trait]
impl AuthorizationCodeStore for InMemoryAuthorizationCodeStore {
    async fn insert(&self, code: AuthorizationCode) -> Result<(), ServiceError> {
        self.codes.insert(code.code_hash.clone(), code);
        Ok(())
    }

    async fn consume(
        &self,
        code_hash: &str,
        client_id: Uuid,
        redirect_uri: &str,
    ) -> Result<AuthorizationCode, ServiceError> {
        let taken = self.codes.remove_if(code_hash, |_, code| {
            code.client_id == client_id && code.redirect_uri == redirect_uri && !code.is_expired()
        });
        match taken {
            Some((_, mut code)) => {
                code.consumed_at = Some(Utc::now());
                Ok(code)
            }
            None => {
                // A mismatched redeemer leaves a live code in place
                self.codes.remove_if(code_hash, |_, code| code.is_expired());
                Err(ServiceError::InvalidGrant)
            }
        }
    }

    async fn purge_expired(&self) -> Result<usize, ServiceError> {
        let before = self.codes.len();
        self.codes.retain(|_, code| !code.is_expired());
        Ok(before.saturating_sub(self.codes.len()))
    }
}

// ---------------------------------------------------------------------------
// Device codes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryDeviceCodeStore {
    records: DashMap<String, DeviceAuthorization>,
    /// user_code -> device_code_hash
    user_codes: DashMap<String, String>,
}

impl InMemoryDeviceCodeStore {
    fn device_hash_for(&self, user_code: &str) -> Result<String, ServiceError> {
        self.user_codes
            .get(&normalize_user_code(user_code))
            .map(|h| h.value().clone())
            .ok_or(ServiceError::NotFound("Device code"))
    }

    fn settle(&self, user_code: &str, status: DeviceCodeStatus) -> Result<(), ServiceError> {
        let device_hash = self.device_hash_for(user_code)?;
        {
            let mut record = self
                .records
                .get_mut(&device_hash)
                .ok_or(ServiceError::NotFound("Device code"))?;
            if !record.is_expired() {
                if record.status != DeviceCodeStatus::Pending {
                    return Err(ServiceError::InvalidState(
                        "Device code is no longer pending".to_string(),
                    ));
                }
                record.status = status;
                return Ok(());
            }
        }
        self.forget(&device_hash);
        Err(ServiceError::Expired)
    }

    /// Drops a record together with its user code. Callers must not hold a
    /// guard into either map.
    fn forget(&self, device_code_hash: &str) {
        if let Some((_, record)) = self.records.remove(device_code_hash) {
            self.user_codes.remove(&normalize_user_code(&record.user_code));
        }
    }
}

#[async_trait]
impl DeviceCodeStore for InMemoryDeviceCodeStore {
    async fn insert(&self, record: DeviceAuthorization) -> Result<(), ServiceError> {
        match self.user_codes.entry(normalize_user_code(&record.user_code)) {
            // Astronomically unlikely, but never hand out a live user code twice
            Entry::Occupied(_) => Err(ServiceError::Conflict(
                "User code collision".to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(record.device_code_hash.clone());
                self.records.insert(record.device_code_hash.clone(), record);
                Ok(())
            }
        }
    }

    async fn approve(
        &self,
        user_code: &str,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.settle(
            user_code,
            DeviceCodeStatus::Approved {
                user_id,
                session_id,
            },
        )
    }

    async fn deny(&self, user_code: &str) -> Result<(), ServiceError> {
        self.settle(user_code, DeviceCodeStatus::Denied)
    }

    async fn redeem(
        &self,
        device_code_hash: &str,
        client_id: Uuid,
    ) -> Result<DeviceAuthorization, ServiceError> {
        let redeemed = self.records.remove_if(device_code_hash, |_, record| {
            record.client_id == client_id
                && !record.is_expired()
                && matches!(record.status, DeviceCodeStatus::Approved { .. })
        });
        if let Some((_, record)) = redeemed {
            self.user_codes.remove(&normalize_user_code(&record.user_code));
            return Ok(record);
        }

        let finished = {
            let record = self
                .records
                .get(device_code_hash)
                .ok_or(ServiceError::InvalidGrant)?;
            if record.client_id != client_id {
                return Err(ServiceError::InvalidGrant);
            }
            match record.status {
                DeviceCodeStatus::Denied => Err(ServiceError::InvalidGrant),
                _ if record.is_expired() => Err(ServiceError::Expired),
                DeviceCodeStatus::Pending => return Err(ServiceError::AuthorizationPending),
                // Lost a race with a concurrent redeem
                DeviceCodeStatus::Approved { .. } => return Err(ServiceError::InvalidGrant),
            }
        };
        // Denied and expired codes are reported once, then forgotten
        self.forget(device_code_hash);
        finished
    }

    async fn purge_expired(&self) -> Result<usize, ServiceError> {
        let expired: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.is_expired())
            .map(|r| r.key().clone())
            .collect();
        for device_code_hash in &expired {
            self.forget(device_code_hash);
        }
        Ok(expired.len())
    }
}

// ---------------------------------------------------------------------------
// Refresh tokens
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    tokens: Mutex<HashMap<String, RefreshToken>>,
}

impl InMemoryRefreshTokenStore {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, RefreshToken>>, ServiceError> {
        self.tokens.lock().map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Refresh token table lock poisoned: {}", e))
        })
    }

    fn revoke_where(
        &self,
        predicate: impl Fn(&RefreshToken) -> bool,
    ) -> Result<usize, ServiceError> {
        let now = Utc::now();
        let mut revoked = 0;
        for token in self.lock()?.values_mut() {
            if !token.is_revoked() && predicate(token) {
                token.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert(&self, token: RefreshToken) -> Result<(), ServiceError> {
        self.lock()?.insert(token.token_hash.clone(), token);
        Ok(())
    }

    async fn find(&self, token_hash: &str) -> Result<Option<RefreshToken>, ServiceError> {
        Ok(self.lock()?.get(token_hash).cloned())
    }

    async fn rotate(&self, old_hash: &str, replacement: RefreshToken) -> Result<(), ServiceError> {
        let mut tokens = self.lock()?;
        let old = tokens.get(old_hash).ok_or(ServiceError::InvalidGrant)?;
        if !old.is_valid() {
            return Err(ServiceError::InvalidGrant);
        }
        tokens.remove(old_hash);
        tokens.insert(replacement.token_hash.clone(), replacement);
        Ok(())
    }

    async fn revoke_for_session(&self, session_id: Uuid) -> Result<usize, ServiceError> {
        self.revoke_where(|t| t.session_id == Some(session_id))
    }

    async fn revoke_for_user(&self, user_id: Uuid) -> Result<usize, ServiceError> {
        self.revoke_where(|t| t.user_id == Some(user_id))
    }

    async fn purge_expired(&self) -> Result<usize, ServiceError> {
        let mut tokens = self.lock()?;
        let before = tokens.len();
        tokens.retain(|_, token| token.is_valid());
        Ok(before - tokens.len())
    }
}

// ---------------------------------------------------------------------------
// Activities
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryActivityStore {
    by_actor: DashMap<String, Vec<Activity>>,
}

#[async_trait]
impl ActivityStore for InMemoryActivityStore {
    async fn append(&self, activity: Activity) -> Result<(), ServiceError> {
        self.by_actor
            .entry(activity.actor_email.to_lowercase())
            .or_default()
            .push(activity);
        Ok(())
    }

    async fn list_for_actor(&self, actor_email: &str) -> Result<Vec<Activity>, ServiceError> {
        let mut activities = self
            .by_actor
            .get(&actor_email.to_lowercase())
            .map(|a| a.value().clone())
            .unwrap_or_default();
        activities.reverse();
        activities.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(activities)
    }
}
