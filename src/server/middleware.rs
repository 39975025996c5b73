//! HTTP middleware for gatekeeper
//!
//! This module provides middleware and extractors for:
//! - Admission control (token bucket) ahead of all other work
//! - Bearer-token authentication on protected routes
//! - Rendering classified errors with the request id
//! - Request/response logging and panic recovery

use std::any::Any;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, Extensions, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use tower_http::request_id::RequestId;

use crate::auth::{AdmissionGate, IdentityClaims, TokenAuthority};
use crate::error::{AppError, ErrorBody, ErrorKind, ErrorReport};

/// Request id assigned by the request-id layer, or empty if there is none
pub fn request_id_of(extensions: &Extensions) -> String {
    extensions
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Extractor for the request correlation id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CorrelationId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CorrelationId(request_id_of(&parts.extensions)))
    }
}

/// What the `Authorization` header holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Header absent or blank
    Missing,
    /// Not a bearer credential, or a bearer scheme with no token
    Malformed,
    /// A bearer token, not yet verified
    Bearer(String),
}

impl Credential {
    /// Classify an `Authorization` header value
    pub fn parse(value: Option<&HeaderValue>) -> Self {
        let Some(value) = value else {
            return Credential::Missing;
        };
        let Ok(value) = value.to_str() else {
            return Credential::Malformed;
        };

        let value = value.trim();
        if value.is_empty() {
            return Credential::Missing;
        }

        let Some((scheme, token)) = value.split_once(char::is_whitespace) else {
            return Credential::Malformed;
        };
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Credential::Malformed;
        }

        let token = token.trim();
        if token.is_empty() {
            Credential::Malformed
        } else {
            Credential::Bearer(token.to_string())
        }
    }
}

/// Verified identity attached to a request by [`auth_middleware`]
///
/// Handlers that take this extractor can only run with a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub IdentityClaims);

impl AuthenticatedUser {
    pub fn subject(&self) -> &str {
        &self.0.subject
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(AppError::unauthenticated)
    }
}

/// Authentication middleware function
///
/// Every rejection, whatever the cause, is the same unauthenticated error.
/// On success the verified claims are attached as [`AuthenticatedUser`].
pub async fn auth_middleware(
    State(authority): State<Arc<TokenAuthority>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let credential = Credential::parse(request.headers().get(header::AUTHORIZATION));

    let claims = match credential {
        Credential::Bearer(token) => authority.verify(&token)?,
        Credential::Missing => {
            tracing::debug!("Missing authorization header");
            return Err(AppError::unauthenticated());
        }
        Credential::Malformed => {
            tracing::debug!("Malformed authorization header");
            return Err(AppError::unauthenticated());
        }
    };

    request.extensions_mut().insert(AuthenticatedUser(claims));

    Ok(next.run(request).await)
}

/// Admission-control middleware function
///
/// Runs before everything except request-id assignment. An exhausted bucket
/// ends the request here with a fixed 429 body.
pub async fn admission_middleware(
    State(gate): State<Arc<AdmissionGate>>,
    request: Request,
    next: Next,
) -> Response {
    if gate.try_acquire() {
        return next.run(request).await;
    }

    let request_id = request_id_of(request.extensions());
    tracing::debug!(request_id = %request_id, "Request rejected by admission gate");

    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorBody::too_many_requests(request_id)),
    )
        .into_response()
}

/// Error-rendering middleware function
///
/// Responses built from [`AppError`] carry an [`ErrorReport`]. This fills in
/// the request id and logs the cause, which is never part of the body.
pub async fn error_rendering_middleware(request: Request, next: Next) -> Response {
    let request_id = request_id_of(request.extensions());

    let mut response = next.run(request).await;

    if response.extensions().get::<ErrorReport>().is_none() {
        match bare_status_error(response.status()) {
            Some(err) => response = err.into_response(),
            None => return response,
        }
    }

    let Some(report) = response.extensions_mut().remove::<ErrorReport>() else {
        return response;
    };

    match report.kind {
        ErrorKind::Internal => tracing::error!(
            request_id = %request_id,
            code = report.body.code,
            cause = report.cause.as_deref().unwrap_or("unknown"),
            "Internal error"
        ),
        kind => tracing::debug!(
            request_id = %request_id,
            code = report.body.code,
            kind = ?kind,
            "Request failed"
        ),
    }

    let body = ErrorBody {
        request_id,
        ..report.body
    };
    match serde_json::to_vec(&body) {
        Ok(bytes) => {
            response.headers_mut().remove(header::CONTENT_LENGTH);
            *response.body_mut() = Body::from(bytes);
        }
        Err(e) => tracing::error!(error = %e, "Failed to render error body"),
    }

    response
}

/// Classified error for statuses the framework or tower layers produce
/// without a body: an unrouted method and a handler timeout
fn bare_status_error(status: StatusCode) -> Option<AppError> {
    match status {
        StatusCode::METHOD_NOT_ALLOWED => Some(AppError::not_found()),
        StatusCode::REQUEST_TIMEOUT => Some(AppError::internal("request timed out")),
        _ => None,
    }
}

/// Logging middleware function
///
/// Logs request and response details including:
/// - Method and path
/// - Status code
/// - Response time
/// - Request id
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request_id_of(request.extensions());

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        path = %uri.path(),
        status = %status.as_u16(),
        duration_ms = %elapsed.as_millis(),
        request_id = %request_id,
        "Request completed"
    );

    response
}

/// Panic handler for the catch-panic layer
///
/// The panic becomes an internal error; its message only reaches the log.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    AppError::internal(format!("handler panicked: {}", detail)).into_response()
}
