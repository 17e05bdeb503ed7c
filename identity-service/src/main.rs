use identity_service::{
    build_router,
    config::IdentityConfig,
    services::{EmailService, MongoDirectory, RedisCache, RestIdentityAuthority},
    AppState,
};
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Fail fast on invalid configuration
    let config = IdentityConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let directory = MongoDirectory::connect(&config.mongodb.uri, &config.mongodb.database).await?;
    directory.initialize_indexes().await?;
    tracing::info!("Database initialized");

    let cache = RedisCache::new(&config.redis).await?;
    tracing::info!("Cache initialized");

    let notifier = EmailService::new(&config.smtp)?;
    let authority = RestIdentityAuthority::new(&config.authority);

    let state = AppState::new(
        config.clone(),
        Arc::new(directory),
        Arc::new(cache),
        Arc::new(authority),
        Arc::new(notifier),
    );

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
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
}
