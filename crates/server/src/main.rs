//! Palaver - real-time group-chat server
//!
//! Opens the database, binds the TCP listener, and runs until ctrl-c.

use std::sync::{Arc, Mutex};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use palaver_core::Database;
use palaver_net::Server;

mod config;

use config::Config;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Palaver server");

    // Optional first argument: path to a config file
    let config_arg = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = match Config::load(config_arg.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let db_path = match config.database_path() {
        Ok(path) => path,
        Err(e) => {
            tracing::error!("Failed to resolve database path: {}", e);
            std::process::exit(1);
        }
    };

    let db = match Database::open(&db_path) {
        Ok(db) => Arc::new(Mutex::new(db)),
        Err(e) => {
            tracing::error!(path = %db_path.display(), "Failed to open database: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(path = %db_path.display(), "Database open");

    let server = match Server::start(config.port, db).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(port = config.port, "Failed to start server: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %server.addr(), "Accepting connections");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
    server.shutdown();
}
