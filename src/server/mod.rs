//! HTTP server components for gatekeeper
//!
//! This module provides the HTTP server infrastructure including:
//! - Router configuration and route handlers
//! - Admission, authentication, error-rendering and logging middleware
//! - Server lifecycle management

pub mod middleware;
pub mod router;

pub use middleware::{auth_middleware, AuthenticatedUser, CorrelationId, Credential};
pub use router::{build_router, ApiResponse, AppState, HealthResponse};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method},
    middleware as axum_middleware, Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::AdmissionGate;
use crate::config::{CorsConfig, ServerConfig};
use crate::store::UserStore;

/// Wrap the routes in the full middleware stack
///
/// Outermost first: request id, CORS, admission gate, trace span, access
/// log, error rendering, panic recovery, timeout, body limit. CORS sits
/// outside the gate so browsers can read 429 bodies.
pub fn build_app(
    routes: Router,
    gate: Arc<AdmissionGate>,
    server: &ServerConfig,
    cors: &CorsConfig,
) -> Router {
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        let request_id = middleware::request_id_of(request.extensions());
        tracing::info_span!(
            "http_request",
            http.method = %request.method(),
            http.path = %request.uri().path(),
            request_id = %request_id,
        )
    });

    let stack = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(build_cors(cors))
        .layer(axum_middleware::from_fn_with_state(
            gate,
            middleware::admission_middleware,
        ))
        .layer(trace)
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(
            middleware::error_rendering_middleware,
        ))
        .layer(CatchPanicLayer::custom(middleware::handle_panic))
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )));

    routes
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .layer(stack)
}

/// CORS layer from configuration
///
/// An empty origin list emits no CORS headers. `*` allows any origin but
/// never with credentials.
pub fn build_cors(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::HeaderName::from_static("x-request-id")]);

    if config.allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::new();
    }

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(config.allow_credentials)
}

/// HTTP Server for gatekeeper
///
/// Manages the axum server lifecycle, including:
/// - Binding to configured address
/// - Applying middleware layers
/// - Graceful shutdown handling
pub struct Server<S: UserStore + 'static> {
    config: ServerConfig,
    cors: CorsConfig,
    state: AppState<S>,
}

impl<S: UserStore + 'static> Server<S> {
    /// Create a new server instance
    pub fn new(config: ServerConfig, cors: CorsConfig, state: AppState<S>) -> Self {
        Self {
            config,
            cors,
            state,
        }
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.config.host.parse().unwrap_or([0, 0, 0, 0].into()),
            self.config.port,
        )
    }

    /// The fully layered application
    pub fn app(&self) -> Router {
        let gate = Arc::clone(&self.state.gate);
        build_app(
            build_router(self.state.clone()),
            gate,
            &self.config,
            &self.cors,
        )
    }

    /// Run the server until shutdown signal is received
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = self.bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        self.run_with_listener(listener, shutdown).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let app = self.app();
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    /// Failed to serve requests
    #[error("Server error: {0}")]
    Serve(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        CredentialHasher, HashingConfig, LoginService, RateLimitConfig, SigningStrategy,
        TokenAuthority, TokenPolicy,
    };
    use crate::store::MockUserStore;
    use axum_test::TestServer;

    fn create_test_state(rate_limit: RateLimitConfig) -> AppState<MockUserStore> {
        let authority = Arc::new(
            TokenAuthority::with_system_clock(
                TokenPolicy {
                    issuer: "svc".to_string(),
                    audience: "api".to_string(),
                    ttl: Duration::from_secs(900),
                },
                SigningStrategy::symmetric("s3cr3t").unwrap(),
            )
            .unwrap(),
        );

        AppState {
            authority: Arc::clone(&authority),
            gate: Arc::new(AdmissionGate::with_system_clock(rate_limit)),
            login: LoginService::new(
                Arc::new(MockUserStore::new()),
                CredentialHasher::new(HashingConfig {
                    memory_kib: 1024,
                    iterations: 1,
                    parallelism: 1,
                })
                .unwrap(),
                authority,
            ),
        }
    }

    // Test 1: Server can be created with config
    #[test]
    fn test_server_new() {
        let server = Server::new(
            ServerConfig::default(),
            CorsConfig::default(),
            create_test_state(RateLimitConfig::default()),
        );
        assert_eq!(server.bind_addr().port(), 8080);
    }

    // Test 2: Server bind address calculation
    #[test]
    fn test_server_bind_addr() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9090,
            ..Default::default()
        };
        let server = Server::new(
            config,
            CorsConfig::default(),
            create_test_state(RateLimitConfig::default()),
        );
        assert_eq!(server.bind_addr().to_string(), "127.0.0.1:9090");
    }

    // Test 3: Server graceful shutdown
    #[tokio::test]
    async fn test_server_graceful_shutdown() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        };
        let server = Server::new(
            config,
            CorsConfig::default(),
            create_test_state(RateLimitConfig::default()),
        );

        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
        };

        let handle = tokio::spawn(async move { server.run(shutdown).await });

        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }

    // Test 4: full stack assigns and echoes request ids
    #[tokio::test]
    async fn test_app_sets_request_id() {
        let server = Server::new(
            ServerConfig::default(),
            CorsConfig::default(),
            create_test_state(RateLimitConfig::default()),
        );
        let test_server = TestServer::new(server.app()).unwrap();

        let response = test_server.get("/healthz").await;
        response.assert_status_ok();
        assert!(!response.header("x-request-id").is_empty());
    }

    // Test 5: admission runs before authentication
    #[tokio::test]
    async fn test_admission_before_auth() {
        let server = Server::new(
            ServerConfig::default(),
            CorsConfig::default(),
            create_test_state(RateLimitConfig {
                requests_per_second: 1,
                burst: Some(1),
            }),
        );
        let test_server = TestServer::new(server.app()).unwrap();

        test_server
            .get("/api/v1/me")
            .await
            .assert_status(axum::http::StatusCode::UNAUTHORIZED);
        test_server
            .get("/api/v1/me")
            .await
            .assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
    }

    // Test 6: wildcard CORS origin answers preflight
    #[tokio::test]
    async fn test_cors_wildcard() {
        let cors = CorsConfig {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: true,
        };
        let server = Server::new(
            ServerConfig::default(),
            cors,
            create_test_state(RateLimitConfig::default()),
        );
        let test_server = TestServer::new(server.app()).unwrap();

        let response = test_server
            .get("/healthz")
            .add_header(header::ORIGIN, HeaderValue::from_static("https://x.test"))
            .await;
        assert_eq!(
            response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            "*"
        );
    }

    // Test 7: wrong method on a known route gets a structured body
    #[tokio::test]
    async fn test_wrong_method_has_error_body() {
        let server = Server::new(
            ServerConfig::default(),
            CorsConfig::default(),
            create_test_state(RateLimitConfig::default()),
        );
        let test_server = TestServer::new(server.app()).unwrap();

        let response = test_server.get("/api/v1/auth/login").await;
        response.assert_status(axum::http::StatusCode::NOT_FOUND);
        let body: crate::error::ErrorBody = response.json();
        assert_eq!(body.code, 404001);
        assert_eq!(
            body.request_id,
            response.header("x-request-id").to_str().unwrap()
        );
    }

    // Test 8: rate-limited responses still carry CORS headers
    #[tokio::test]
    async fn test_too_many_requests_has_cors_headers() {
        let cors = CorsConfig {
            allowed_origins: vec!["https://app.test".to_string()],
            allow_credentials: false,
        };
        let server = Server::new(
            ServerConfig::default(),
            cors,
            create_test_state(RateLimitConfig {
                requests_per_second: 1,
                burst: Some(1),
            }),
        );
        let test_server = TestServer::new(server.app()).unwrap();
        let origin = HeaderValue::from_static("https://app.test");

        test_server
            .get("/healthz")
            .add_header(header::ORIGIN, origin.clone())
            .await
            .assert_status_ok();

        let response = test_server
            .get("/healthz")
            .add_header(header::ORIGIN, origin)
            .await;
        response.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            "https://app.test"
        );
    }

    // Test 9: ServerError display messages
    #[test]
    fn test_server_error_display() {
        let bind_err = ServerError::Bind("address in use".to_string());
        assert_eq!(
            bind_err.to_string(),
            "Failed to bind to address: address in use"
        );

        let serve_err = ServerError::Serve("connection reset".to_string());
        assert_eq!(serve_err.to_string(), "Server error: connection reset");
    }
}
