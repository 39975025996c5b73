//! Credential storage for gatekeeper
//!
//! This module defines the user store trait and an in-memory implementation.

pub mod memory;

pub use memory::InMemoryUserStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::StoredCredential;

/// Lookup of stored credentials by username
///
/// It uses `async_trait` for async methods and `mockall::automock` for testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find the credential for a username
    ///
    /// Returns `Ok(None)` if no such user exists.
    async fn find_by_username(&self, username: &str)
        -> Result<Option<StoredCredential>, StoreError>;
}
