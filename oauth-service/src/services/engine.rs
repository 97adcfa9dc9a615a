//! Authorization engine.
//!
//! Every token request walks the same path:
//!
//! ```text
//! Received -> Validated -> ClientResolved -> CredentialChecked -> Issued
//! ```
//!
//! and may be rejected at any edge. Nothing is written before
//! `CredentialChecked`, so malformed input and failed client
//! authentication leave no state behind. Each successful issuance records
//! exactly one activity.

use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{DeviceConfig, TokenConfig};
use crate::dtos::{
    AuthorizeRequest, AuthorizeResponse, DeviceAuthorizationRequest,
    DeviceAuthorizationResponse, TokenRequest, TokenResponse,
};
use crate::models::{
    ActivityKind, AuthorizationCode, ClientApplication, DeviceAuthorization, DeviceCodeStatus,
    RefreshToken, Session, TokenIssuedPayload, User,
};
use crate::services::{AccessTokenClaims, ActivityLog, ServiceError, TokenSigner};
use crate::store::{
    AuthorizationCodeStore, ClientStore, DeviceCodeStore, RefreshTokenStore, SessionReader,
    Stores, UserStore,
};
use crate::utils::{
    format_scopes, generate_opaque_token, hash_token, negotiate_scopes, CredentialHasher,
    Password, ScopeProvider,
};
use crate::validators::{AuthorizeRequestValidator, TokenGrant, TokenRequestValidator};

const TOKEN_TYPE: &str = "Bearer";
const OPAQUE_TOKEN_BYTES: usize = 32;
/// User-code collisions are retried this many times before giving up.
const USER_CODE_ATTEMPTS: usize = 3;

/// Lifetimes and public URIs the engine stamps into what it issues.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub issuer: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub authorization_code_ttl: Duration,
    pub device_code_ttl: Duration,
    pub device_poll_interval_seconds: u64,
    pub verification_uri: String,
}

impl EngineSettings {
    pub fn from_config(token: &TokenConfig, device: &DeviceConfig) -> Self {
        Self {
            issuer: token.issuer.clone(),
            access_token_ttl: Duration::minutes(token.access_token_expiry_minutes),
            refresh_token_ttl: Duration::days(token.refresh_token_expiry_days),
            authorization_code_ttl: Duration::seconds(token.authorization_code_expiry_seconds),
            device_code_ttl: Duration::seconds(device.expiry_seconds),
            device_poll_interval_seconds: device.poll_interval_seconds,
            verification_uri: device.verification_uri.clone(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            access_token_ttl: Duration::minutes(15),
            refresh_token_ttl: Duration::days(7),
            authorization_code_ttl: Duration::minutes(5),
            device_code_ttl: Duration::minutes(10),
            device_poll_interval_seconds: 5,
            verification_uri: "http://localhost:3000/device".to_string(),
        }
    }
}

/// Where a token request was when it succeeded or was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    ClientResolved,
    CredentialChecked,
    Issued,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::ClientResolved => "client_resolved",
            Stage::CredentialChecked => "credential_checked",
            Stage::Issued => "issued",
        }
    }
}

/// A user-bound grant that has passed its checks.
struct UserGrant {
    user: User,
    session_id: Uuid,
    scopes: Vec<String>,
}

struct Issuance {
    response: TokenResponse,
    actor_email: String,
    session_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct AuthorizationEngine {
    clients: Arc<dyn ClientStore>,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionReader>,
    codes: Arc<dyn AuthorizationCodeStore>,
    devices: Arc<dyn DeviceCodeStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    scopes: Arc<dyn ScopeProvider>,
    signer: Arc<dyn TokenSigner>,
    hasher: CredentialHasher,
    activity: ActivityLog,
    settings: EngineSettings,
}

impl AuthorizationEngine {
    pub fn new(
        stores: &Stores,
        scopes: Arc<dyn ScopeProvider>,
        signer: Arc<dyn TokenSigner>,
        hasher: CredentialHasher,
        activity: ActivityLog,
        settings: EngineSettings,
    ) -> Self {
        Self {
            clients: stores.clients.clone(),
            users: stores.users.clone(),
            sessions: stores.session_reader.clone(),
            codes: stores.codes.clone(),
            devices: stores.devices.clone(),
            refresh_tokens: stores.refresh_tokens.clone(),
            scopes,
            signer,
            hasher,
            activity,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Token endpoint: validate, authenticate the client, dispatch on the
    /// grant.
    #[tracing::instrument(
        skip_all,
        fields(grant_type = %request.grant_type, client_id = %request.client_id)
    )]
    pub async fn token(&self, request: &TokenRequest) -> Result<TokenResponse, ServiceError> {
        let mut stage = Stage::Received;
        let result = self.process_token(request, &mut stage).await;

        match &result {
            Ok(_) => tracing::info!(stage = stage.as_str(), "Token issued"),
            Err(e) => log_rejection(stage, e),
        }
        result
    }

    async fn process_token(
        &self,
        request: &TokenRequest,
        stage: &mut Stage,
    ) -> Result<TokenResponse, ServiceError> {
        let validated = TokenRequestValidator::validate(request)?;
        *stage = Stage::Validated;

        let client = self
            .clients
            .find_active(validated.client_id)
            .await?
            .ok_or(ServiceError::InvalidClient)?;
        *stage = Stage::ClientResolved;

        self.check_client_secret(&client, validated.client_secret)
            .await?;
        *stage = Stage::CredentialChecked;

        let requested = self
            .scopes
            .parse_scopes(validated.scope.as_deref().unwrap_or_default());
        let grant_type = validated.grant.grant_type();

        let issuance = match validated.grant {
            TokenGrant::ClientCredentials => self.client_credentials(&client, &requested)?,
            TokenGrant::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
            } => {
                let grant = self
                    .exchange_code(
                        &client,
                        &code,
                        &redirect_uri,
                        code_verifier.as_deref(),
                        &requested,
                    )
                    .await?;
                self.issue_user_tokens(&client, grant).await?
            }
            TokenGrant::DeviceCode { device_code } => {
                let grant = self
                    .redeem_device_code(&client, &device_code, &requested)
                    .await?;
                self.issue_user_tokens(&client, grant).await?
            }
            TokenGrant::RefreshToken { refresh_token } => {
                self.rotate_refresh_token(&client, &refresh_token, &requested)
                    .await?
            }
        };
        *stage = Stage::Issued;

        self.activity
            .record(
                &issuance.actor_email,
                ActivityKind::TokenIssued,
                &TokenIssuedPayload {
                    client_id: client.id,
                    grant_type,
                    scope: issuance.response.scope.clone(),
                    session_id: issuance.session_id,
                    refresh_token_issued: issuance.response.refresh_token.is_some(),
                },
            )
            .await;

        Ok(issuance.response)
    }

    async fn check_client_secret(
        &self,
        client: &ClientApplication,
        secret: Password,
    ) -> Result<(), ServiceError> {
        let matched = self
            .hasher
            .verify_blocking(
                secret,
                client.secret_hash.clone(),
                client.secret_salt.clone(),
            )
            .await;
        if matched {
            Ok(())
        } else {
            Err(ServiceError::InvalidClient)
        }
    }

    fn client_credentials(
        &self,
        client: &ClientApplication,
        requested: &[String],
    ) -> Result<Issuance, ServiceError> {
        let scopes = negotiate_scopes(requested, &client.allowed_scopes);
        let client_id = client.id.to_string();

        let mut claims = AccessTokenClaims::new(
            &self.settings.issuer,
            &client_id,
            &client_id,
            self.settings.access_token_ttl,
        );
        claims.scope = format_scopes(&scopes);
        claims.client_id = Some(client_id.clone());

        let access_token = self.signer.sign_access_token(&claims)?;

        Ok(Issuance {
            response: TokenResponse {
                access_token,
                token_type: TOKEN_TYPE.to_string(),
                expires_in: self.settings.access_token_ttl.num_seconds(),
                refresh_token: None,
                scope: claims.scope,
            },
            actor_email: client_actor(client.id),
            session_id: None,
        })
    }

    async fn exchange_code(
        &self,
        client: &ClientApplication,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
        requested: &[String],
    ) -> Result<UserGrant, ServiceError> {
        // Consumed before anything else is checked: a code gets one chance
        let record = self
            .codes
            .consume(&hash_token(code), client.id, redirect_uri)
            .await?;

        if let Some(pkce) = &record.pkce {
            match code_verifier {
                Some(verifier) if pkce.verify(verifier) => {}
                _ => {
                    tracing::warn!(client_id = %client.id, "PKCE verification failed");
                    return Err(ServiceError::InvalidGrant);
                }
            }
        }

        let session = self.active_session(record.session_id).await?;
        let user = self.grant_user(session.user_id).await?;

        Ok(UserGrant {
            user,
            session_id: session.session_id,
            scopes: narrow(requested, &record.scopes),
        })
    }

    async fn redeem_device_code(
        &self,
        client: &ClientApplication,
        device_code: &str,
        requested: &[String],
    ) -> Result<UserGrant, ServiceError> {
        let record = self
            .devices
            .redeem(&hash_token(device_code), client.id)
            .await?;

        let DeviceCodeStatus::Approved {
            user_id,
            session_id,
        } = record.status
        else {
            return Err(ServiceError::InvalidGrant);
        };

        let session = self.active_session(session_id).await?;
        if session.user_id != user_id {
            return Err(ServiceError::InvalidGrant);
        }
        let user = self.grant_user(user_id).await?;

        Ok(UserGrant {
            user,
            session_id,
            scopes: narrow(requested, &record.scopes),
        })
    }

    async fn rotate_refresh_token(
        &self,
        client: &ClientApplication,
        refresh_token: &str,
        requested: &[String],
    ) -> Result<Issuance, ServiceError> {
        let presented_hash = hash_token(refresh_token);
        let existing = self
            .refresh_tokens
            .find(&presented_hash)
            .await?
            .filter(|t| t.client_id == client.id && t.is_valid())
            .ok_or(ServiceError::InvalidGrant)?;

        let (Some(user_id), Some(session_id)) = (existing.user_id, existing.session_id) else {
            return Err(ServiceError::InvalidGrant);
        };
        let session = self.active_session(session_id).await?;
        let user = self.grant_user(user_id).await?;

        let grant = UserGrant {
            user,
            session_id: session.session_id,
            scopes: narrow(requested, &existing.scopes),
        };

        // Sign first so a signing failure cannot burn the presented token
        let (response, replacement) = self.mint_user_tokens(client, &grant)?;
        self.refresh_tokens
            .rotate(&presented_hash, replacement)
            .await?;

        Ok(Issuance {
            response,
            actor_email: grant.user.email,
            session_id: Some(grant.session_id),
        })
    }

    async fn issue_user_tokens(
        &self,
        client: &ClientApplication,
        grant: UserGrant,
    ) -> Result<Issuance, ServiceError> {
        let (response, refresh) = self.mint_user_tokens(client, &grant)?;
        self.refresh_tokens.insert(refresh).await?;

        Ok(Issuance {
            response,
            actor_email: grant.user.email,
            session_id: Some(grant.session_id),
        })
    }

    /// Access token plus a fresh refresh token record, not yet stored.
    fn mint_user_tokens(
        &self,
        client: &ClientApplication,
        grant: &UserGrant,
    ) -> Result<(TokenResponse, RefreshToken), ServiceError> {
        let mut claims = AccessTokenClaims::new(
            &self.settings.issuer,
            &grant.user.user_id.to_string(),
            &client.id.to_string(),
            self.settings.access_token_ttl,
        );
        claims.scope = format_scopes(&grant.scopes);
        claims.client_id = Some(client.id.to_string());
        claims.sid = Some(grant.session_id.to_string());
        claims.email = Some(grant.user.email.clone());

        let access_token = self.signer.sign_access_token(&claims)?;

        let refresh_plaintext = generate_opaque_token(OPAQUE_TOKEN_BYTES);
        let refresh = RefreshToken::new(
            &refresh_plaintext,
            client.id,
            Some(grant.user.user_id),
            Some(grant.session_id),
            grant.scopes.clone(),
            self.settings.refresh_token_ttl,
        );

        Ok((
            TokenResponse {
                access_token,
                token_type: TOKEN_TYPE.to_string(),
                expires_in: self.settings.access_token_ttl.num_seconds(),
                refresh_token: Some(refresh_plaintext),
                scope: claims.scope,
            },
            refresh,
        ))
    }

    /// Grants hang off a login session; once it is gone they are too.
    async fn active_session(&self, session_id: Uuid) -> Result<Session, ServiceError> {
        match self.sessions.get(session_id).await {
            Ok(session) if session.is_active() => Ok(session),
            Ok(_) | Err(ServiceError::NotFound(_)) => Err(ServiceError::InvalidGrant),
            Err(e) => Err(e),
        }
    }

    async fn grant_user(&self, user_id: Uuid) -> Result<User, ServiceError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(ServiceError::InvalidGrant)
    }

    /// Issue an authorization code for the user behind `session_id`.
    #[tracing::instrument(
        skip_all,
        fields(client_id = %request.client_id, session_id = %session_id)
    )]
    pub async fn authorize(
        &self,
        request: &AuthorizeRequest,
        session_id: Uuid,
    ) -> Result<AuthorizeResponse, ServiceError> {
        let validated = AuthorizeRequestValidator::validate(request)?;

        let client = self
            .clients
            .find_active(validated.client_id)
            .await?
            .ok_or(ServiceError::InvalidClient)?;

        if client.callback_uri != validated.callback_uri {
            let mut errors = validator::ValidationErrors::new();
            errors.add(
                "callback_uri",
                crate::validators::violation(
                    "callback_mismatch",
                    "callback_uri does not match the registered callback",
                ),
            );
            return Err(ServiceError::Validation(errors));
        }

        let session = match self.sessions.get(session_id).await {
            Ok(session) if session.is_active() => session,
            Ok(_) | Err(ServiceError::NotFound(_)) => return Err(ServiceError::Unauthorized),
            Err(e) => return Err(e),
        };
        let user = self
            .users
            .find_by_id(session.user_id)
            .await?
            .ok_or(ServiceError::Unauthorized)?;

        let requested = self
            .scopes
            .parse_scopes(validated.scope.as_deref().unwrap_or_default());
        let scopes = negotiate_scopes(&requested, &client.allowed_scopes);

        let code = generate_opaque_token(OPAQUE_TOKEN_BYTES);
        let record = AuthorizationCode::new(
            &code,
            client.id,
            validated.callback_uri.clone(),
            user.user_id,
            session.session_id,
            scopes.clone(),
            validated.pkce,
            self.settings.authorization_code_ttl,
        );
        self.codes.insert(record).await?;

        let mut redirect = url::Url::parse(&validated.callback_uri)
            .map_err(|e| anyhow::anyhow!("Registered callback is not a URL: {}", e))?;
        {
            let mut query = redirect.query_pairs_mut();
            query.append_pair("code", &code);
            if let Some(state) = &validated.state {
                query.append_pair("state", state);
            }
        }

        self.activity
            .record(
                &user.email,
                ActivityKind::AuthorizationCodeIssued,
                &serde_json::json!({
                    "client_id": client.id,
                    "session_id": session.session_id,
                    "scope": format_scopes(&scopes),
                }),
            )
            .await;

        tracing::info!(user_id = %user.user_id, "Authorization code issued");

        Ok(AuthorizeResponse {
            code,
            redirect_uri: redirect.to_string(),
            state: validated.state,
            expires_in: self.settings.authorization_code_ttl.num_seconds(),
        })
    }

    /// Begin a device flow (RFC 8628 §3.1).
    #[tracing::instrument(skip_all, fields(client_id = %request.client_id))]
    pub async fn start_device_authorization(
        &self,
        request: &DeviceAuthorizationRequest,
    ) -> Result<DeviceAuthorizationResponse, ServiceError> {
        let client_id = AuthorizeRequestValidator::validate_device(request)?;

        let client = self
            .clients
            .find_active(client_id)
            .await?
            .ok_or(ServiceError::InvalidClient)?;

        let requested = self
            .scopes
            .parse_scopes(request.scope.as_deref().unwrap_or_default());
        let scopes = negotiate_scopes(&requested, &client.allowed_scopes);

        let mut attempt = 0;
        let (record, device_code) = loop {
            attempt += 1;
            let (record, device_code) = DeviceAuthorization::issue(
                client.id,
                scopes.clone(),
                self.settings.device_code_ttl,
                self.settings.device_poll_interval_seconds,
            );
            match self.devices.insert(record.clone()).await {
                Ok(()) => break (record, device_code),
                Err(ServiceError::Conflict(_)) if attempt < USER_CODE_ATTEMPTS => continue,
                Err(e) => return Err(e),
            }
        };

        self.activity
            .record(
                &client_actor(client.id),
                ActivityKind::DeviceAuthorizationStarted,
                &serde_json::json!({
                    "client_id": client.id,
                    "user_code": record.user_code,
                    "scope": format_scopes(&scopes),
                }),
            )
            .await;

        let verification_uri = self.settings.verification_uri.clone();
        Ok(DeviceAuthorizationResponse {
            verification_uri_complete: format!(
                "{}?user_code={}",
                verification_uri, record.user_code
            ),
            device_code,
            user_code: record.user_code.clone(),
            verification_uri,
            expires_in: record.expires_in_seconds(),
            interval: record.interval_seconds,
        })
    }
}

/// Activity actor for client-only operations.
fn client_actor(client_id: Uuid) -> String {
    format!("client:{}", client_id)
}

/// Narrow an earlier grant's scopes by what is requested now. Asking for
/// nothing keeps the original grant.
fn narrow(requested: &[String], granted: &[String]) -> Vec<String> {
    negotiate_scopes(requested, granted)
}

fn log_rejection(stage: Stage, error: &ServiceError) {
    match error {
        ServiceError::Internal(e) => {
            tracing::error!(stage = stage.as_str(), error = %e, "Token request failed")
        }
        ServiceError::AuthorizationPending => {
            tracing::debug!(stage = stage.as_str(), "Device authorization pending")
        }
        other => tracing::warn!(
            stage = stage.as_str(),
            code = other.oauth_code(),
            "Token request rejected"
        ),
    }
}
