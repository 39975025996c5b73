//! User and login models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Details;

/// Stored credential record
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// User ID; becomes the token subject
    pub id: String,

    /// Login name
    pub username: String,

    /// Argon2 PHC string
    pub password_hash: String,
}

impl std::fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredential")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

impl StoredCredential {
    /// Create a new credential record
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            password_hash: password_hash.into(),
        }
    }
}

/// Login request body
///
/// Fields default to empty so a missing field is reported the same way as
/// an empty one.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl LoginRequest {
    /// Create a new login request
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Field-level problems with the request, if any
    pub fn validate(&self) -> Result<(), Details> {
        let mut details = Details::new();

        if self.username.trim().is_empty() {
            details.insert("username".to_string(), "is required".to_string());
        }
        if self.password.is_empty() {
            details.insert("password".to_string(), "is required".to_string());
        }

        if details.is_empty() {
            Ok(())
        } else {
            Err(details)
        }
    }
}

/// Login response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}
