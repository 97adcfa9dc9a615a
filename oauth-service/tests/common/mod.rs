//! Shared setup for oauth-service integration tests.
//!
//! Everything runs against the in-memory stores with cheap hashing
//! parameters and an HS256 signing key, so no external services are needed.

#![allow(dead_code)]

use oauth_service::{
    build_router,
    dtos::{AuthorizeRequest, LoginRequest, LoginResponse, RegisterRequest, TokenRequest},
    services::{
        CreatedApplication, EngineSettings, JwtService, MockEmailPublisher, Principal,
    },
    store::Stores,
    utils::{CredentialHasher, HashParams},
    AppState,
};
use service_core::axum::Router;
use std::sync::Arc;

pub const TEST_SIGNING_SECRET: &[u8] = b"integration-test-signing-secret-0123456789";
pub const TEST_ISSUER: &str = "http://localhost:8080";
pub const TEST_CALLBACK: &str = "https://app.example.com/callback";
pub const TEST_PASSWORD: &str = "correct-horse-battery";
pub const ADMIN_EMAIL: &str = "admin@example.com";

pub struct TestApp {
    pub state: AppState,
    pub stores: Stores,
    pub jwt: JwtService,
    pub email: Arc<MockEmailPublisher>,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        Self::with_stores(Stores::in_memory(), settings)
    }

    /// Build the app over caller-supplied stores, e.g. with one replaced by
    /// a failing double.
    pub fn with_stores(stores: Stores, settings: EngineSettings) -> Self {
        let jwt = JwtService::from_secret(TEST_SIGNING_SECRET, TEST_ISSUER);
        let email = Arc::new(MockEmailPublisher::default());
        let state = AppState::assemble(
            &stores,
            CredentialHasher::new(HashParams::low_cost()),
            jwt.clone(),
            email.clone(),
            EngineSettings {
                issuer: TEST_ISSUER.to_string(),
                ..settings
            },
            vec!["http://localhost:3000".to_string()],
        );

        Self {
            state,
            stores,
            jwt,
            email,
        }
    }

    pub async fn router(&self) -> Router {
        build_router(self.state.clone())
            .await
            .expect("Failed to build router")
    }

    /// Register an application with the given scope entitlement.
    pub async fn create_client(&self, name: &str, scope: &str) -> CreatedApplication {
        self.state
            .clients
            .create(name, TEST_CALLBACK, scope, ADMIN_EMAIL)
            .await
            .expect("Failed to create client application")
    }

    pub async fn register(&self, email: &str) {
        self.state
            .accounts
            .register(&RegisterRequest {
                email: email.to_string(),
                password: TEST_PASSWORD.to_string(),
            })
            .await
            .expect("Failed to register user");
    }

    pub async fn login(&self, email: &str) -> LoginResponse {
        self.state
            .accounts
            .login(&LoginRequest {
                email: email.to_string(),
                password: TEST_PASSWORD.to_string(),
            })
            .await
            .expect("Failed to log in")
    }

    /// Register, log in and return the resulting principal.
    pub async fn signed_in_user(&self, email: &str) -> (Principal, LoginResponse) {
        self.register(email).await;
        let login = self.login(email).await;
        (self.principal(&login.access_token), login)
    }

    pub fn principal(&self, access_token: &str) -> Principal {
        let claims = self
            .jwt
            .validate_first_party_token(access_token)
            .expect("Login token should validate");
        Principal {
            user_id: claims.subject_id().expect("sub should be a user id"),
            email: claims.email.clone().expect("email claim"),
            session_id: claims.session_id().expect("sid claim"),
        }
    }

    /// Run `/oauth/authorize` for `client` and return the plaintext code.
    pub async fn authorization_code(
        &self,
        client: &CreatedApplication,
        principal: &Principal,
        scope: Option<&str>,
        code_challenge: Option<(&str, &str)>,
    ) -> String {
        let request = AuthorizeRequest {
            client_id: client.application.id.to_string(),
            callback_uri: TEST_CALLBACK.to_string(),
            scope: scope.map(str::to_string),
            state: Some("xyz".to_string()),
            code_challenge: code_challenge.map(|(c, _)| c.to_string()),
            code_challenge_method: code_challenge.map(|(_, m)| m.to_string()),
        };
        self.state
            .engine
            .authorize(&request, principal.session_id)
            .await
            .expect("Failed to authorize")
            .code
    }
}

/// Token request carrying the client's credentials and nothing else.
pub fn token_request(client: &CreatedApplication, grant_type: &str) -> TokenRequest {
    TokenRequest {
        grant_type: grant_type.to_string(),
        client_id: client.application.id.to_string(),
        client_secret: client.client_secret.clone(),
        ..Default::default()
    }
}

pub fn code_request(client: &CreatedApplication, code: &str) -> TokenRequest {
    TokenRequest {
        code: Some(code.to_string()),
        redirect_uri: Some(TEST_CALLBACK.to_string()),
        ..token_request(client, "code")
    }
}

pub fn refresh_request(client: &CreatedApplication, refresh_token: &str) -> TokenRequest {
    TokenRequest {
        refresh_token: Some(refresh_token.to_string()),
        ..token_request(client, "refresh_token")
    }
}

pub fn device_request(client: &CreatedApplication, device_code: &str) -> TokenRequest {
    TokenRequest {
        device_code: Some(device_code.to_string()),
        ..token_request(client, "device_code")
    }
}
