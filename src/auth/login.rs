//! Username/password login
//!
//! Looks the user up, checks the password, and only then asks the token
//! authority for a token. "No such user" and "wrong password" produce the
//! same error so the response cannot be used to enumerate accounts.

use std::sync::Arc;

use tracing::{debug, info};

use super::jwt::{IssuedToken, TokenAuthority};
use super::password::CredentialHasher;
use crate::error::AppError;
use crate::store::UserStore;

/// Login flow over a user store
pub struct LoginService<S: UserStore> {
    store: Arc<S>,
    hasher: CredentialHasher,
    authority: Arc<TokenAuthority>,
}

impl<S: UserStore> Clone for LoginService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            hasher: self.hasher.clone(),
            authority: Arc::clone(&self.authority),
        }
    }
}

impl<S: UserStore + 'static> LoginService<S> {
    /// Create a new login service
    pub fn new(store: Arc<S>, hasher: CredentialHasher, authority: Arc<TokenAuthority>) -> Self {
        Self {
            store,
            hasher,
            authority,
        }
    }

    /// Authenticate `username` with `password` and issue a token
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedToken, AppError> {
        let credential = self.store.find_by_username(username).await?;

        let hasher = self.hasher.clone();
        let stored_hash = credential.as_ref().map(|c| c.password_hash.clone());
        let candidate = password.to_string();

        // Argon2 is CPU-bound; keep it off the async workers
        let verified = tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => hasher.verify(&hash, &candidate),
            None => hasher.verify_dummy(&candidate),
        })
        .await
        .map_err(AppError::internal)?;

        let credential = match credential {
            Some(credential) if verified => credential,
            _ => {
                info!(username = %username, "Login failed");
                return Err(AppError::unauthenticated());
            }
        };

        let issued = self.authority.issue(&credential.id)?;
        debug!(user_id = %credential.id, "Login succeeded");

        Ok(issued)
    }
}
