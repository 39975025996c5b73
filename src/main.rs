//! gatekeeper - Authentication and request gating for an HTTP API
//!
//! This is the main entry point for the gatekeeper server.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;

use gatekeeper::auth::{
    AdmissionGate, CredentialHasher, LoginService, SigningStrategy, TokenAuthority,
};
use gatekeeper::config::Config;
use gatekeeper::server::{AppState, Server};
use gatekeeper::store::InMemoryUserStore;
use gatekeeper::telemetry::init_tracing;

/// gatekeeper - Authentication and request gating for an HTTP API
#[derive(Parser, Debug)]
#[command(name = "gatekeeper")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "GATEKEEPER_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    init_tracing(&config.logging.level, &config.logging.format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        app = %config.app.name,
        "Starting gatekeeper"
    );

    // Key material is loaded once here; nothing reads it from disk later
    let strategy = SigningStrategy::from_config(&config.auth)?;
    let authority = Arc::new(TokenAuthority::with_system_clock(
        config.auth.token_policy(),
        strategy,
    )?);
    info!(
        algorithm = %authority.algorithm(),
        issuer = %config.auth.issuer,
        audience = %config.auth.audience,
        ttl_secs = config.auth.access_token_ttl_secs,
        "Token authority initialized"
    );

    let gate = Arc::new(AdmissionGate::with_system_clock(config.rate_limit));
    info!(
        rps = gate.requests_per_second(),
        burst = gate.burst(),
        "Admission gate initialized"
    );

    let hasher = CredentialHasher::new(config.auth.hashing)?;
    let store = Arc::new(InMemoryUserStore::with_users(config.users.clone()));
    info!(users = store.len(), "User store initialized");

    let state = AppState {
        authority: Arc::clone(&authority),
        gate,
        login: LoginService::new(store, hasher, authority),
    };

    let server = Server::new(config.server.clone(), config.cors.clone(), state);

    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    info!("gatekeeper shutdown complete");

    result.map_err(Into::into)
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
