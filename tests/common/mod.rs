//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gatekeeper::auth::{
    AdmissionGate, CredentialHasher, HashingConfig, LoginService, RateLimitConfig,
    SigningStrategy, TokenAuthority, TokenPolicy,
};
use gatekeeper::config::{CorsConfig, ServerConfig};
use gatekeeper::models::StoredCredential;
use gatekeeper::server::{AppState, Server};
use gatekeeper::store::InMemoryUserStore;

pub const TEST_SECRET: &str = "s3cr3t";
pub const TEST_USER_ID: &str = "user-42";
pub const TEST_USERNAME: &str = "alice";
pub const TEST_PASSWORD: &str = "correct-password";

/// Cheap Argon2 parameters so tests stay fast
pub fn create_test_hasher() -> CredentialHasher {
    CredentialHasher::new(HashingConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("Failed to create test hasher")
}

/// Token policy used throughout the integration tests
pub fn create_test_policy() -> TokenPolicy {
    TokenPolicy {
        issuer: "svc".to_string(),
        audience: "api".to_string(),
        ttl: Duration::from_secs(15 * 60),
    }
}

/// Create a symmetric token authority on the system clock
pub fn create_test_authority() -> Arc<TokenAuthority> {
    Arc::new(
        TokenAuthority::with_system_clock(
            create_test_policy(),
            SigningStrategy::symmetric(TEST_SECRET).expect("Failed to build strategy"),
        )
        .expect("Failed to build authority"),
    )
}

/// Create a user store holding the test user
pub fn create_test_store(hasher: &CredentialHasher) -> Arc<InMemoryUserStore> {
    let hash = hasher
        .hash(TEST_PASSWORD)
        .expect("Failed to hash test password");
    Arc::new(InMemoryUserStore::with_users([StoredCredential::new(
        TEST_USER_ID,
        TEST_USERNAME,
        hash,
    )]))
}

/// Create a test application state
pub fn create_test_state(rate_limit: RateLimitConfig) -> AppState<InMemoryUserStore> {
    let hasher = create_test_hasher();
    let store = create_test_store(&hasher);
    let authority = create_test_authority();

    AppState {
        authority: Arc::clone(&authority),
        gate: Arc::new(AdmissionGate::with_system_clock(rate_limit)),
        login: LoginService::new(store, hasher, authority),
    }
}

/// Create a test server configuration with a random port
pub fn create_test_server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    }
}

/// Run a test server in the background and return the address
/// The server will be shut down when the returned shutdown sender is dropped or sent
pub async fn run_test_server(
    state: AppState<InMemoryUserStore>,
) -> (std::net::SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let server = Server::new(create_test_server_config(), CorsConfig::default(), state);

    tokio::spawn(async move {
        server
            .run_with_listener(listener, async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    (addr, shutdown_tx)
}
