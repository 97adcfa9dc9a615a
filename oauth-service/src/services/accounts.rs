use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::dtos::{LoginRequest, LoginResponse, RegisterRequest};
use crate::models::{
    AccountPayload, ActivityKind, Session, SessionPayload, SessionResponse, User, UserResponse,
};
use crate::services::{
    AccessTokenClaims, ActivityLog, EmailMessage, EmailPublisher, ServiceError, TokenSigner,
};
use crate::store::{RefreshTokenStore, SessionReader, SessionWriter, Stores, UserStore};
use crate::utils::{CredentialHasher, HashedCredential, Password};
use crate::validators::violation;

const MIN_PASSWORD_LEN: usize = 8;

/// The caller, as established by a validated access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub session_id: Uuid,
}

/// Resource-owner accounts and their login sessions.
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    session_reader: Arc<dyn SessionReader>,
    session_writer: Arc<dyn SessionWriter>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    hasher: CredentialHasher,
    signer: Arc<dyn TokenSigner>,
    activity: ActivityLog,
    email: Arc<dyn EmailPublisher>,
    issuer: String,
    access_token_ttl: Duration,
}

impl AccountService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stores: &Stores,
        hasher: CredentialHasher,
        signer: Arc<dyn TokenSigner>,
        activity: ActivityLog,
        email: Arc<dyn EmailPublisher>,
        issuer: String,
        access_token_ttl: Duration,
    ) -> Self {
        Self {
            users: stores.users.clone(),
            session_reader: stores.session_reader.clone(),
            session_writer: stores.session_writer.clone(),
            refresh_tokens: stores.refresh_tokens.clone(),
            hasher,
            signer,
            activity,
            email,
            issuer,
            access_token_ttl,
        }
    }

    #[tracing::instrument(skip_all, fields(email = %request.email))]
    pub async fn register(&self, request: &RegisterRequest) -> Result<UserResponse, ServiceError> {
        request.validate()?;

        let hashed = self
            .hasher
            .hash_blocking(Password::new(request.password.clone()))
            .await?;
        let user = self
            .users
            .insert(User::new(request.email.trim().to_string(), hashed.hash, hashed.salt))
            .await?;

        self.activity
            .record(
                &user.email,
                ActivityKind::UserRegistered,
                &AccountPayload {
                    user_id: user.user_id,
                    email: user.email.clone(),
                    sessions_terminated: 0,
                },
            )
            .await;
        self.notify(EmailMessage::welcome(&user.email)).await;

        tracing::info!(user_id = %user.user_id, "User registered");
        Ok(user.into())
    }

    /// Verify credentials and open a session. Unknown email and wrong
    /// password fail identically.
    #[tracing::instrument(skip_all, fields(email = %request.email))]
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ServiceError> {
        request.validate()?;

        let user = self.users.find_by_email(&request.email).await?;
        // Unknown emails pay for a derivation too
        let stored = match &user {
            Some(user) => HashedCredential {
                hash: user.password_hash.clone(),
                salt: user.password_salt.clone(),
            },
            None => self.hasher.decoy(),
        };

        let matched = self
            .hasher
            .verify_blocking(
                Password::new(request.password.clone()),
                stored.hash,
                stored.salt,
            )
            .await;
        let user = match user {
            Some(user) if matched => user,
            _ => {
                tracing::warn!("Login failed");
                return Err(ServiceError::Unauthorized);
            }
        };

        let session = self.session_writer.create(user.user_id).await?;

        let mut claims = AccessTokenClaims::new(
            &self.issuer,
            &user.user_id.to_string(),
            &self.issuer,
            self.access_token_ttl,
        );
        claims.sid = Some(session.session_id.to_string());
        claims.email = Some(user.email.clone());
        let access_token = self.signer.sign_access_token(&claims)?;

        self.activity
            .record(
                &user.email,
                ActivityKind::UserLogin,
                &SessionPayload {
                    session_id: session.session_id,
                    sequence_id: session.sequence_id,
                },
            )
            .await;

        tracing::info!(
            user_id = %user.user_id,
            session_id = %session.session_id,
            "User logged in"
        );

        Ok(LoginResponse {
            session_id: session.session_id,
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_ttl.num_seconds(),
        })
    }

    /// End the caller's current session.
    pub async fn logout(&self, principal: &Principal) -> Result<SessionResponse, ServiceError> {
        let session = self
            .end_session(principal, principal.session_id, ActivityKind::UserLogout)
            .await?;
        Ok(session.into())
    }

    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<SessionResponse>, ServiceError> {
        Ok(self
            .session_reader
            .list_for_user(user_id)
            .await?
            .into_iter()
            .map(SessionResponse::from)
            .collect())
    }

    /// Another user's session reads as absent.
    pub async fn get_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<SessionResponse, ServiceError> {
        Ok(self.owned_session(user_id, session_id).await?.into())
    }

    pub async fn terminate_session(
        &self,
        principal: &Principal,
        session_id: Uuid,
    ) -> Result<SessionResponse, ServiceError> {
        let session = self
            .end_session(principal, session_id, ActivityKind::SessionTerminated)
            .await?;
        Ok(session.into())
    }

    async fn owned_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Session, ServiceError> {
        let session = self.session_reader.get(session_id).await?;
        if session.user_id != user_id {
            return Err(ServiceError::NotFound("Session"));
        }
        Ok(session)
    }

    async fn end_session(
        &self,
        principal: &Principal,
        session_id: Uuid,
        kind: ActivityKind,
    ) -> Result<Session, ServiceError> {
        let session = self.owned_session(principal.user_id, session_id).await?;
        let terminated = self.session_writer.terminate(&session).await?;

        // Access tokens already issued run out on their own
        let revoked = self.refresh_tokens.revoke_for_session(session_id).await?;

        self.activity
            .record(
                &principal.email,
                kind,
                &SessionPayload {
                    session_id,
                    sequence_id: terminated.sequence_id,
                },
            )
            .await;

        tracing::info!(
            session_id = %session_id,
            refresh_tokens_revoked = revoked,
            "Session terminated"
        );
        Ok(terminated)
    }

    /// Replace a user's password and sign them out everywhere.
    #[tracing::instrument(skip_all, fields(email = %email))]
    pub async fn reset_password(
        &self,
        email: &str,
        new_password: Password,
    ) -> Result<(), ServiceError> {
        if new_password.as_str().chars().count() < MIN_PASSWORD_LEN {
            let mut errors = ValidationErrors::new();
            errors.add(
                "password",
                violation("length", "Password must be at least 8 characters"),
            );
            return Err(errors.into());
        }

        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;

        let hashed = self.hasher.hash_blocking(new_password).await?;
        self.users
            .update_credentials(user.user_id, hashed.hash, hashed.salt)
            .await?;

        let terminated = self.sign_out_everywhere(user.user_id).await?;

        self.activity
            .record(
                &user.email,
                ActivityKind::PasswordReset,
                &AccountPayload {
                    user_id: user.user_id,
                    email: user.email.clone(),
                    sessions_terminated: terminated,
                },
            )
            .await;
        self.notify(EmailMessage::password_changed(&user.email)).await;

        tracing::info!(user_id = %user.user_id, sessions_terminated = terminated, "Password reset");
        Ok(())
    }

    /// Soft-delete the account; its sessions and refresh tokens die with it.
    #[tracing::instrument(skip_all, fields(email = %email))]
    pub async fn delete_account(&self, email: &str) -> Result<UserResponse, ServiceError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;

        let deleted = self.users.soft_delete(user.user_id).await?;
        let terminated = self.sign_out_everywhere(user.user_id).await?;

        self.activity
            .record(
                &deleted.email,
                ActivityKind::AccountDeleted,
                &AccountPayload {
                    user_id: deleted.user_id,
                    email: deleted.email.clone(),
                    sessions_terminated: terminated,
                },
            )
            .await;
        self.notify(EmailMessage::account_deleted(&deleted.email)).await;

        tracing::info!(user_id = %deleted.user_id, "Account deleted");
        Ok(deleted.into())
    }

    async fn sign_out_everywhere(&self, user_id: Uuid) -> Result<usize, ServiceError> {
        let terminated = self.session_writer.terminate_all_for_user(user_id).await?;
        self.refresh_tokens.revoke_for_user(user_id).await?;
        Ok(terminated.len())
    }

    async fn notify(&self, message: EmailMessage) {
        let to = message.to.clone();
        if let Err(e) = self.email.publish(message).await {
            tracing::warn!(error = %e, to = %to, "Failed to publish email");
        }
    }
}
