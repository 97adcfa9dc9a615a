use oauth_service::{
    build_router,
    config::OAuthConfig,
    services::{EngineSettings, JwtService, NoopEmailPublisher},
    store::Stores,
    utils::CredentialHasher,
    AppState,
};
use service_core::observability::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Fail fast on bad configuration
    let config = OAuthConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting authorization service"
    );

    let jwt = JwtService::new(&config.token)?;
    tracing::info!(issuer = %jwt.issuer(), "JWT service initialized");

    let hasher = CredentialHasher::new(config.hashing);
    let stores = Stores::in_memory();
    tracing::info!("In-memory stores initialized");
    tokio::spawn(purge_stores(
        stores.clone(),
        Duration::from_secs(config.purge_interval_seconds),
    ));

    let state = AppState::assemble(
        &stores,
        hasher,
        jwt,
        Arc::new(NoopEmailPublisher),
        EngineSettings::from_config(&config.token, &config.device),
        config.security.allowed_origins.clone(),
    );

    let app = build_router(state).await?;

    let addr = config.common.socket_addr();
    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Duration::from_secs(
            config.common.shutdown_grace_seconds,
        )))
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn purge_stores(stores: Stores, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match stores.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "Expired grants purged"),
            Err(e) => tracing::warn!(error = %e, "Store purge failed"),
        }
    }
}

async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    // In-flight requests get a grace period to finish
    tokio::time::sleep(grace).await;
}
