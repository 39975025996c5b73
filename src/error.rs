//! Application error types for gatekeeper
//!
//! The core components (token authority, password hasher, key loader, user
//! store) report cause-only errors. They never pick an HTTP status themselves.
//! [`classify`] maps every cause onto one [`ErrorKind`], and [`AppError`] is
//! the classified value that gets rendered into a response.

use std::collections::BTreeMap;
use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::auth::password::HashError;

/// Classification code used for admission-control rejections
pub const TOO_MANY_REQUESTS_CODE: u32 = 429001;

/// Message used for admission-control rejections
pub const TOO_MANY_REQUESTS_MESSAGE: &str = "Too Many Requests";

/// Token issuance and verification errors
///
/// Verification failures deliberately collapse into [`TokenError::Rejected`];
/// the precise reason is only written to the log.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TokenError {
    /// The token failed verification
    #[error("Token rejected")]
    Rejected,

    /// The token could not be signed
    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// Errors raised while building signing material at startup
#[derive(Debug, Error)]
pub enum KeyError {
    /// Algorithm selector is not one of the recognized identifiers
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Symmetric secret is empty
    #[error("Symmetric signing secret must not be empty")]
    EmptySecret,

    /// A key path required by the asymmetric strategy is not configured
    #[error("Missing key path: {0}")]
    MissingPath(&'static str),

    /// Key file could not be read
    #[error("Failed to read key file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input is not a PEM document
    #[error("Invalid PEM in {0}: no BEGIN line")]
    InvalidPem(String),

    /// PEM container holds a key of the wrong family or kind
    #[error("Unsupported key type '{label}' in {origin}")]
    UnsupportedKeyType { origin: String, label: String },

    /// PEM container has the right label but the key inside is malformed
    #[error("Failed to parse {what} from {origin}: {reason}")]
    Parse {
        what: &'static str,
        origin: String,
        reason: String,
    },

    /// Public key does not belong to the private key
    #[error("Public key does not match the private key")]
    Mismatch,

    /// Parsed key could not be converted for the JWT library
    #[error("Failed to prepare {what} for signing: {reason}")]
    Encoding { what: &'static str, reason: String },
}

/// User store errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// Backend is unavailable
    #[error("User store unavailable: {0}")]
    Unavailable(String),

    /// Stored record is unusable
    #[error("Corrupt user record: {0}")]
    Corrupt(String),
}

/// The closed set of failure kinds exposed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request payload
    BadInput,
    /// Missing, invalid or expired credential
    Unauthenticated,
    /// Authenticated but not permitted
    Forbidden,
    /// Referenced resource is absent
    NotFound,
    /// Anything unexpected
    Internal,
}

impl ErrorKind {
    /// HTTP status for this kind
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::BadInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable classification code for this kind
    pub fn code(self) -> u32 {
        match self {
            ErrorKind::BadInput => 400001,
            ErrorKind::Unauthenticated => 401001,
            ErrorKind::Forbidden => 403001,
            ErrorKind::NotFound => 404001,
            ErrorKind::Internal => 500001,
        }
    }

    /// Client-facing message for this kind
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::BadInput => "Bad Request",
            ErrorKind::Unauthenticated => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "Resource Not Found",
            ErrorKind::Internal => "Internal Server Error",
        }
    }
}

/// Maps a cause onto the taxonomy
pub trait Classify {
    /// The kind this cause belongs to
    fn kind(&self) -> ErrorKind;
}

/// Classify a cause
pub fn classify<E: Classify + ?Sized>(cause: &E) -> ErrorKind {
    cause.kind()
}

impl Classify for TokenError {
    fn kind(&self) -> ErrorKind {
        match self {
            TokenError::Rejected => ErrorKind::Unauthenticated,
            TokenError::Signing(_) => ErrorKind::Internal,
        }
    }
}

impl Classify for HashError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

impl Classify for KeyError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// Field name to reason, safe to show to clients
pub type Details = BTreeMap<String, String>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A classified application error
///
/// Code, status and message are all derived from `kind`, so they can never
/// disagree. The wrapped cause is for operators only and is never rendered.
#[derive(Debug, Error)]
#[error("{}", .kind.message())]
pub struct AppError {
    kind: ErrorKind,
    details: Option<Details>,
    #[source]
    cause: Option<BoxError>,
}

impl AppError {
    /// Create an error of the given kind with no details or cause
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            details: None,
            cause: None,
        }
    }

    /// Classify `cause` and wrap it
    pub fn from_cause<E>(cause: E) -> Self
    where
        E: Classify + std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind: classify(&cause),
            details: None,
            cause: Some(Box::new(cause)),
        }
    }

    /// Wrap a failure that has no classification; always internal
    pub fn internal<E>(cause: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            kind: ErrorKind::Internal,
            details: None,
            cause: Some(cause.into()),
        }
    }

    pub fn bad_input(details: Details) -> Self {
        Self::new(ErrorKind::BadInput).with_details(details)
    }

    pub fn unauthenticated() -> Self {
        Self::new(ErrorKind::Unauthenticated)
    }

    pub fn forbidden() -> Self {
        Self::new(ErrorKind::Forbidden)
    }

    pub fn not_found() -> Self {
        Self::new(ErrorKind::NotFound)
    }

    /// Attach client-safe details
    pub fn with_details(mut self, details: Details) -> Self {
        self.details = if details.is_empty() {
            None
        } else {
            Some(details)
        };
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> u32 {
        self.kind.code()
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    pub fn message(&self) -> &'static str {
        self.kind.message()
    }

    pub fn details(&self) -> Option<&Details> {
        self.details.as_ref()
    }

    /// The wrapped cause, if any
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Body for this error under the given request id
    pub fn body(&self, request_id: impl Into<String>) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.message().to_string(),
            details: self.details.clone(),
            request_id: request_id.into(),
        }
    }

    /// Full cause chain, for logs
    fn cause_chain(&self) -> Option<String> {
        let cause = self.cause.as_deref()?;
        let mut chain = cause.to_string();
        let mut next = cause.source();
        while let Some(err) = next {
            chain.push_str(": ");
            chain.push_str(&err.to_string());
            next = err.source();
        }
        Some(chain)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        Self::from_cause(err)
    }
}

impl From<HashError> for AppError {
    fn from(err: HashError) -> Self {
        Self::from_cause(err)
    }
}

impl From<KeyError> for AppError {
    fn from(err: KeyError) -> Self {
        Self::from_cause(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::from_cause(err)
    }
}

/// Structured error body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Details>,
    #[serde(default)]
    pub request_id: String,
}

impl ErrorBody {
    /// Fixed body for admission-control rejections
    pub fn too_many_requests(request_id: impl Into<String>) -> Self {
        Self {
            code: TOO_MANY_REQUESTS_CODE,
            message: TOO_MANY_REQUESTS_MESSAGE.to_string(),
            details: None,
            request_id: request_id.into(),
        }
    }
}

/// Response extension left behind by [`AppError`] so the rendering
/// middleware can attach the request id and log the cause
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub body: ErrorBody,
    pub cause: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = self.body(String::new());
        let report = ErrorReport {
            kind: self.kind,
            body: body.clone(),
            cause: self.cause_chain(),
        };

        let mut response = (self.status(), Json(body)).into_response();
        response.extensions_mut().insert(report);
        response
    }
}
