pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;
pub mod validators;

use service_core::axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::health_check;
use crate::services::{
    AccountService, ActivityLog, AuthorizationEngine, ClientRegistry, EmailPublisher,
    EngineSettings, JwtService, TokenSigner,
};
use crate::store::Stores;
use crate::utils::{CredentialHasher, WhitespaceScopeParser};

#[derive(Clone)]
pub struct AppState {
    pub engine: AuthorizationEngine,
    pub accounts: AccountService,
    pub clients: ClientRegistry,
    pub activity: ActivityLog,
    pub jwt: JwtService,
    pub allowed_origins: Vec<String>,
}

impl AppState {
    /// Wire every service over one set of stores and one signing key.
    pub fn assemble(
        stores: &Stores,
        hasher: CredentialHasher,
        jwt: JwtService,
        email: Arc<dyn EmailPublisher>,
        settings: EngineSettings,
        allowed_origins: Vec<String>,
    ) -> Self {
        let activity = ActivityLog::new(stores.activities.clone());
        let signer: Arc<dyn TokenSigner> = Arc::new(jwt.clone());

        let accounts = AccountService::new(
            stores,
            hasher.clone(),
            signer.clone(),
            activity.clone(),
            email,
            settings.issuer.clone(),
            settings.access_token_ttl,
        );
        let clients = ClientRegistry::new(stores, hasher.clone(), activity.clone());
        let engine = AuthorizationEngine::new(
            stores,
            Arc::new(WhitespaceScopeParser),
            signer,
            hasher,
            activity.clone(),
            settings,
        );

        Self {
            engine,
            accounts,
            clients,
            activity,
            jwt,
            allowed_origins,
        }
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Routes that need a logged-in user
    let user_routes = Router::new()
        .route("/auth/logout", post(handlers::account::logout))
        .route("/oauth/authorize", post(handlers::oauth::authorize))
        .route("/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/sessions/:session_id",
            get(handlers::sessions::get_session).delete(handlers::sessions::terminate_session),
        )
        .route("/activities", get(handlers::activity::list_activities))
        .route(
            "/applications",
            post(handlers::applications::create_application)
                .get(handlers::applications::list_applications),
        )
        .route(
            "/applications/:id",
            get(handlers::applications::get_application)
                .patch(handlers::applications::rename_application)
                .delete(handlers::applications::delete_application),
        )
        .route(
            "/applications/:id/secret",
            post(handlers::applications::rotate_application_secret),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let origins = state
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/oauth/token", post(handlers::oauth::token))
        .route(
            "/oauth/device_authorization",
            post(handlers::oauth::device_authorization),
        )
        .route("/auth/register", post(handlers::account::register))
        .route("/auth/login", post(handlers::account::login))
        .merge(user_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        );

    Ok(app)
}
