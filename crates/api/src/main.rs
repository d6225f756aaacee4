use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use emisafe_core::store::{CommandStore, DeviceStore, InMemoryStore};
use emisafe_session::SessionOrchestrator;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use emisafe_api::config::ServerConfig;
use emisafe_api::router::build_app_router;
use emisafe_api::state::AppState;
use emisafe_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "emisafe_api=debug,emisafe_session=debug,emisafe_db=info,tower_http=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Stores ---
    let (devices, commands): (Arc<dyn DeviceStore>, Arc<dyn CommandStore>) =
        match &config.database_url {
            Some(database_url) => {
                let pool = emisafe_db::create_pool(database_url)
                    .await
                    .expect("Failed to connect to database");
                tracing::info!("Database connection pool created");

                emisafe_db::health_check(&pool)
                    .await
                    .expect("Database health check failed");
                emisafe_db::run_migrations(&pool)
                    .await
                    .expect("Failed to run database migrations");
                tracing::info!("Database migrations applied");

                let store = Arc::new(emisafe_db::PgStore::new(pool));
                let devices: Arc<dyn DeviceStore> = store.clone();
                let commands: Arc<dyn CommandStore> = store;
                (devices, commands)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using the in-memory demo fleet");
                let store = Arc::new(InMemoryStore::with_demo_fleet());
                let devices: Arc<dyn DeviceStore> = store.clone();
                let commands: Arc<dyn CommandStore> = store;
                (devices, commands)
            }
        };

    // --- Session subsystem ---
    let orchestrator = Arc::new(SessionOrchestrator::new(devices, commands));

    // --- Heartbeat ---
    let heartbeat_cancel = CancellationToken::new();
    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(orchestrator.registry()),
        Duration::from_secs(config.heartbeat_interval_secs),
        heartbeat_cancel.clone(),
    );

    // --- Router ---
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    let app = build_app_router(AppState::new(config, Arc::clone(&orchestrator)));

    // --- Start server ---
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let server = axum::serve(listener, app).with_graceful_shutdown({
        let orchestrator = Arc::clone(&orchestrator);
        async move {
            shutdown_signal().await;
            // Open WebSockets keep the server from draining until closed.
            orchestrator.shutdown().await;
        }
    });
    server.await.expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    heartbeat_cancel.cancel();
    let _ = tokio::time::timeout(shutdown_timeout, heartbeat_handle).await;
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server shuts
/// down cleanly whether stopped interactively or by a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
