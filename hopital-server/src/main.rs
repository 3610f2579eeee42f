//! hopital - hospital management back-end entry point

use hopital_store::{AuditLog, SqliteStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hopital_server::{
    bootstrap, build_router,
    config::{LogFormat, LogSettings, ServerConfig},
    AppState,
};

const CONFIG_FILE: &str = "config.yaml";

/// RUST_LOG wins over the configured level
fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let registry = tracing_subscriber::registry().with(filter);
    match log.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::var("HOPITAL_CONFIG").unwrap_or_else(|_| CONFIG_FILE.to_string());
    let config_file = std::path::Path::new(&config_path)
        .exists()
        .then_some(config_path.as_str());
    let config = match ServerConfig::load(config_file) {
        Ok(config) => config,
        Err(e) => {
            // Tracing is not set up yet
            eprintln!("Failed to load config {}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log);
    tracing::info!("Starting hopital server...");
    if config_file.is_none() {
        tracing::info!("No config file at {}, using defaults", config_path);
    }

    // Create data directory
    if let Err(e) = std::fs::create_dir_all(&config.storage.data_dir) {
        tracing::error!("Failed to create data directory: {}", e);
        std::process::exit(1);
    }

    let store = SqliteStore::open(config.database_path()).unwrap_or_else(|e| {
        tracing::error!("Failed to open database: {}", e);
        std::process::exit(1);
    });

    let audit_log = AuditLog::open(config.audit_db_path()).unwrap_or_else(|e| {
        tracing::error!("Failed to open audit log: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = bootstrap::seed(&store, &config) {
        tracing::error!("Failed to seed database: {}", e);
        std::process::exit(1);
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(
        "Sign-up: {}",
        if config.auth.allow_sign_up {
            "open"
        } else {
            "closed"
        }
    );

    let state = match AppState::new(config, store, audit_log) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!("Invalid access configuration: {}", e);
            std::process::exit(1);
        }
    };

    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Listening on http://{}", bind_addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .unwrap_or_else(|e| {
        tracing::error!("Server error: {}", e);
    });

    tracing::info!("Server shut down gracefully");
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
