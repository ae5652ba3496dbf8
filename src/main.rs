//! Info21 Peer Admin - data administration for the peer-learning database
//!
//! Serves CRUD over the administered tables, CSV import and export, and
//! invocation of the stored functions and procedures with forms synthesized
//! from their signatures.

mod config;
mod crud;
mod db;
mod error;
mod export;
mod forms;
mod import;
mod models;
mod request_log;
mod routes;
mod routines;
mod schema;
mod state;
mod value;

use crate::config::Settings;
use crate::db::postgres::PgStore;
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("Starting Info21 Peer Admin...");

    let settings = Settings::load()?;
    info!("Configuration loaded successfully");

    let pool = db::create_pool(&settings.database).await?;
    db::provision_schema(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let state = Arc::new(AppState::new(store, &settings.storage, &settings.session));

    let app = create_router(state, &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("Server listening on http://{}", addr);
    info!("Data directory: {}", settings.storage.data_dir.display());
    info!("Session lifetime: {}s", settings.session.ttl.as_secs());
    info!("   GET  /data                                  - List tables");
    info!("   GET  /data/{{table}}/read                     - List records");
    info!("   POST /data/{{table}}/create                   - Create a record");
    info!("   POST /data/{{table}}/{{pk}}/update              - Update a record");
    info!("   POST /data/{{table}}/{{pk}}/delete              - Delete a record");
    info!("   GET  /data/{{table}}/export                   - Download as CSV");
    info!("   POST /data/import                           - Import every fixture");
    info!("   GET  /operation                             - List routines");
    info!("   POST /operation/execute_sql                 - Run an ad-hoc query");
    info!("   POST /operation/execute/{{type}}/{{name}}/{{params}} - Run a routine");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,peer_admin=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
