//! HTTP router for gatekeeper
//!
//! This module defines the axum router that handles all HTTP requests.
//! It provides routes for:
//! - Health checks
//! - Login (public)
//! - The caller's own identity (protected)

use axum::{
    extract::{rejection::JsonRejection, State},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::middleware::{auth_middleware, AuthenticatedUser, CorrelationId};
use crate::auth::{AdmissionGate, IdentityClaims, LoginService, TokenAuthority};
use crate::error::{AppError, Details};
use crate::models::{LoginRequest, LoginResponse};
use crate::store::UserStore;

/// Shared application state
pub struct AppState<S: UserStore> {
    /// Token issuance and verification
    pub authority: Arc<TokenAuthority>,

    /// Process-wide admission gate
    pub gate: Arc<AdmissionGate>,

    /// Username/password login
    pub login: LoginService<S>,
}

impl<S: UserStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            authority: Arc::clone(&self.authority),
            gate: Arc::clone(&self.gate),
            login: self.login.clone(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Success envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub code: u32,
    pub message: String,
    pub data: T,
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, request_id: impl Into<String>) -> Self {
        Self {
            code: 0,
            message: "OK".to_string(),
            data,
            request_id: request_id.into(),
        }
    }
}

/// Build the main application router
///
/// `/healthz` and `/api/v1/auth/login` are public; everything under the
/// protected group passes through [`auth_middleware`] first. Unknown paths
/// fall back to a not-found error.
pub fn build_router<S: UserStore + 'static>(state: AppState<S>) -> Router {
    let protected = Router::new()
        .route("/api/v1/me", get(me_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.authority),
            auth_middleware,
        ));

    Router::new()
        .route("/healthz", get(health_handler))
        .route("/api/v1/auth/login", post(login_handler::<S>))
        .merge(protected)
        .fallback(not_found_handler)
        .with_state(state)
}

/// Health check endpoint handler
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Login endpoint handler
async fn login_handler<S: UserStore + 'static>(
    State(state): State<AppState<S>>,
    CorrelationId(request_id): CorrelationId,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<LoginResponse>>, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        let mut details = Details::new();
        details.insert("body".to_string(), rejection.body_text());
        AppError::bad_input(details)
    })?;

    request.validate().map_err(AppError::bad_input)?;

    let issued = state
        .login
        .login(request.username.trim(), &request.password)
        .await?;

    Ok(Json(ApiResponse::ok(
        LoginResponse {
            access_token: issued.token,
            expires_at: issued.claims.expires_at,
        },
        request_id,
    )))
}

/// Identity of the caller
async fn me_handler(
    AuthenticatedUser(claims): AuthenticatedUser,
    CorrelationId(request_id): CorrelationId,
) -> Json<ApiResponse<IdentityClaims>> {
    Json(ApiResponse::ok(claims, request_id))
}

async fn not_found_handler() -> AppError {
    AppError::not_found()
}
