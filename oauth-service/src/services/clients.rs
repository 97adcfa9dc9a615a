use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::models::{
    ActivityKind, ApplicationPayload, ClientApplication, ClientApplicationResponse, User,
};
use crate::services::{ActivityLog, ServiceError};
use crate::store::{ClientStore, Stores};
use crate::utils::{generate_opaque_token, parse_scopes, CredentialHasher, Password};
use crate::validators::{absolute_uri, violation};

const CLIENT_SECRET_BYTES: usize = 32;
const MAX_NAME_LEN: usize = 100;

/// A newly created application together with its secret. The plaintext
/// secret is returned exactly once and never stored.
#[derive(Debug, Serialize)]
pub struct CreatedApplication {
    #[serde(flatten)]
    pub application: ClientApplicationResponse,
    pub client_secret: String,
}

/// Administration of registered client applications. Each application is
/// visible to and managed by the account that registered it; anyone else
/// gets `NotFound`.
#[derive(Clone)]
pub struct ClientRegistry {
    clients: Arc<dyn ClientStore>,
    hasher: CredentialHasher,
    activity: ActivityLog,
}

impl ClientRegistry {
    pub fn new(stores: &Stores, hasher: CredentialHasher, activity: ActivityLog) -> Self {
        Self {
            clients: stores.clients.clone(),
            hasher,
            activity,
        }
    }

    #[tracing::instrument(skip_all, fields(name = %name, actor = %actor))]
    pub async fn create(
        &self,
        name: &str,
        callback_uri: &str,
        scope: &str,
        actor: &str,
    ) -> Result<CreatedApplication, ServiceError> {
        let mut errors = ValidationErrors::new();
        check_name(&mut errors, name);
        absolute_uri(&mut errors, "callback_uri", callback_uri);
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let secret = generate_opaque_token(CLIENT_SECRET_BYTES);
        let hashed = self
            .hasher
            .hash_blocking(Password::new(secret.clone()))
            .await?;

        let app = self
            .clients
            .insert(ClientApplication::new(
                name.trim().to_string(),
                callback_uri.to_string(),
                hashed.hash,
                hashed.salt,
                parse_scopes(scope),
                actor.to_string(),
            ))
            .await?;

        self.record(actor, ActivityKind::ApplicationCreated, &app, None)
            .await;
        tracing::info!(application_id = %app.id, "Application created");

        Ok(CreatedApplication {
            application: app.into(),
            client_secret: secret,
        })
    }

    pub async fn get(
        &self,
        id: Uuid,
        actor: &str,
    ) -> Result<ClientApplicationResponse, ServiceError> {
        Ok(self.owned(id, actor).await?.into())
    }

    pub async fn list(&self, actor: &str) -> Result<Vec<ClientApplicationResponse>, ServiceError> {
        Ok(self
            .clients
            .list_active()
            .await?
            .into_iter()
            .filter(|app| is_owner(app, actor))
            .map(Into::into)
            .collect())
    }

    pub async fn rename(
        &self,
        id: Uuid,
        new_name: &str,
        actor: &str,
    ) -> Result<ClientApplicationResponse, ServiceError> {
        let mut errors = ValidationErrors::new();
        check_name(&mut errors, new_name);
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let previous = self.owned(id, actor).await?;
        let app = self.clients.rename(id, new_name.trim(), actor).await?;

        self.record(
            actor,
            ActivityKind::ApplicationUpdated,
            &app,
            Some(previous.name),
        )
        .await;
        Ok(app.into())
    }

    /// Issue a new secret; the old one stops working immediately.
    pub async fn rotate_secret(&self, id: Uuid, actor: &str) -> Result<String, ServiceError> {
        self.owned(id, actor).await?;
        let secret = generate_opaque_token(CLIENT_SECRET_BYTES);
        let hashed = self
            .hasher
            .hash_blocking(Password::new(secret.clone()))
            .await?;
        let app = self
            .clients
            .update_secret(id, hashed.hash, hashed.salt, actor)
            .await?;

        self.record(actor, ActivityKind::ApplicationSecretRotated, &app, None)
            .await;
        tracing::info!(application_id = %id, "Application secret rotated");
        Ok(secret)
    }

    pub async fn delete(
        &self,
        id: Uuid,
        actor: &str,
    ) -> Result<ClientApplicationResponse, ServiceError> {
        self.owned(id, actor).await?;
        let app = self.clients.soft_delete(id, actor).await?;
        self.record(actor, ActivityKind::ApplicationDeleted, &app, None)
            .await;
        tracing::info!(application_id = %id, "Application deleted");
        Ok(app.into())
    }

    async fn owned(&self, id: Uuid, actor: &str) -> Result<ClientApplication, ServiceError> {
        match self.clients.find_active(id).await? {
            Some(app) if is_owner(&app, actor) => Ok(app),
            Some(_) => {
                tracing::warn!(
                    application_id = %id,
                    actor = %actor,
                    "Application owned by another account"
                );
                Err(ServiceError::NotFound("Application"))
            }
            None => Err(ServiceError::NotFound("Application")),
        }
    }

    async fn record(
        &self,
        actor: &str,
        kind: ActivityKind,
        app: &ClientApplication,
        previous_name: Option<String>,
    ) {
        self.activity
            .record(
                actor,
                kind,
                &ApplicationPayload {
                    application_id: app.id,
                    name: app.name.clone(),
                    previous_name,
                },
            )
            .await;
    }
}

fn is_owner(app: &ClientApplication, actor: &str) -> bool {
    User::email_key(&app.created_by) == User::email_key(actor)
}

fn check_name(errors: &mut ValidationErrors, name: &str) {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        errors.add("name", violation("required", "name is required"));
    } else if trimmed.chars().count() > MAX_NAME_LEN {
        errors.add("name", violation("length", "name must be at most 100 characters"));
    }
}
