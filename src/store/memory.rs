//! In-memory user store seeded from configuration

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::UserStore;
use crate::error::StoreError;
use crate::models::StoredCredential;

/// User store backed by a map keyed on username
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, StoredCredential>>,
}

impl InMemoryUserStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `users`
    ///
    /// Later entries replace earlier ones with the same username.
    pub fn with_users(users: impl IntoIterator<Item = StoredCredential>) -> Self {
        let users = users
            .into_iter()
            .map(|user| (user.username.clone(), user))
            .collect();
        Self {
            users: RwLock::new(users),
        }
    }

    /// Insert or replace a user
    pub fn insert(&self, user: StoredCredential) -> Result<(), StoreError> {
        let mut users = self
            .users
            .write()
            .map_err(|_| StoreError::Unavailable("user store lock poisoned".to_string()))?;
        users.insert(user.username.clone(), user);
        Ok(())
    }

    /// Number of stored users
    pub fn len(&self) -> usize {
        self.users.read().map(|users| users.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<StoredCredential>, StoreError> {
        let users = self
            .users
            .read()
            .map_err(|_| StoreError::Unavailable("user store lock poisoned".to_string()))?;
        Ok(users.get(username).cloned())
    }
}
