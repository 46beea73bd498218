use service_core::observability::logging::init_tracing;
use service_core::utils::{SharedClock, SystemClock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use trust_service::{
    build_router,
    config::TrustConfig,
    db,
    services::{
        ensure_bootstrap_admin, spawn_maintenance, EmailProvider, MockEmailService,
        SmtpEmailService,
    },
    store::{MemoryStore, PgStore, Stores},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = TrustConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting trust service"
    );

    let stores = match &config.database {
        Some(database) => {
            let pool = db::create_pool(database).await?;
            db::run_migrations(&pool).await?;
            Stores::postgres(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory credential store");
            Stores::memory(Arc::new(MemoryStore::new()))
        }
    };

    let email: Arc<dyn EmailProvider> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpEmailService::new(smtp)?),
        None => {
            tracing::warn!("SMTP not configured, reset emails are recorded in memory only");
            Arc::new(MockEmailService::new())
        }
    };

    let clock: SharedClock = Arc::new(SystemClock);
    let state = AppState::new(config.clone(), stores, email, clock)?;

    if let Some(admin) = &config.bootstrap_admin {
        ensure_bootstrap_admin(
            state.stores.users.as_ref(),
            state.auth_service.audit(),
            admin,
        )
        .await?;
    }

    // Background cleanup
    let shutdown = CancellationToken::new();
    let maintenance = spawn_maintenance(
        state.auth_service.sessions().clone(),
        state.auth_service.resets().clone(),
        Duration::from_secs(config.maintenance.interval_seconds),
        shutdown.clone(),
    );
    let sweep_every = Duration::from_secs(config.rate_limit.sweep_interval_seconds);
    let sweepers = [
        state
            .login_limiter
            .limiter
            .clone()
            .spawn_sweeper(sweep_every, shutdown.clone()),
        state
            .password_reset_limiter
            .limiter
            .clone()
            .spawn_sweeper(sweep_every, shutdown.clone()),
    ];
    tracing::info!("Background maintenance started");

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    shutdown.cancel();
    let _ = maintenance.await;
    for sweeper in sweepers {
        let _ = sweeper.await;
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
}
