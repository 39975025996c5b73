//! Password hashing and verification
//!
//! Passwords are hashed with Argon2id into PHC strings, so the salt and the
//! cost parameters travel with the hash and verification needs nothing else.

use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Plaintext hashed once to produce the stand-in hash used when there is no
/// real hash to check against
const DUMMY_PASSWORD: &str = "gatekeeper-dummy-password";

/// Argon2 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashingConfig {
    /// Memory cost in KiB
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,

    /// Number of passes
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Degree of parallelism
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

fn default_memory_kib() -> u32 {
    Params::DEFAULT_M_COST
}

fn default_iterations() -> u32 {
    Params::DEFAULT_T_COST
}

fn default_parallelism() -> u32 {
    Params::DEFAULT_P_COST
}

/// Error type for password hashing operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HashError {
    /// Cost parameters are out of range
    #[error("Invalid hashing parameters: {0}")]
    InvalidParams(String),

    /// Hashing failed
    #[error("Hash failed: {0}")]
    HashFailed(String),
}

/// One-way password hasher
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    /// Stand-in hash at this hasher's own cost
    dummy: Arc<str>,
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("params", self.argon2.params())
            .finish()
    }
}

impl CredentialHasher {
    /// Create a hasher with explicit cost parameters
    pub fn new(config: HashingConfig) -> Result<Self, HashError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| HashError::InvalidParams(e.to_string()))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy = hash_with(&argon2, DUMMY_PASSWORD)?;

        Ok(Self {
            argon2,
            dummy: dummy.into(),
        })
    }

    /// Hash a password into a PHC string
    ///
    /// A fresh random salt is used for every call, so hashing the same
    /// password twice gives two different strings.
    ///
    /// # Example
    ///
    /// ```
    /// use gatekeeper::auth::password::{CredentialHasher, HashingConfig};
    ///
    /// let hasher = CredentialHasher::new(HashingConfig::default()).unwrap();
    /// let hash = hasher.hash("hunter2").unwrap();
    /// assert!(hash.starts_with("$argon2id$"));
    /// assert!(hasher.verify(&hash, "hunter2"));
    /// ```
    pub fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        hash_with(&self.argon2, plaintext)
    }

    /// Check a candidate password against a stored hash
    ///
    /// Returns `false` for any mismatch, including a hash that cannot be
    /// parsed. A malformed hash still costs one full Argon2 computation.
    /// Parameters embedded in the stored hash take precedence over the
    /// hasher's own, so hashes made with other costs still verify.
    pub fn verify(&self, hash: &str, candidate: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(candidate.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => {
                self.verify_dummy(candidate);
                false
            }
        }
    }

    /// Burn one verification against a stand-in hash and return `false`
    ///
    /// Used where no stored hash exists so the caller's timing does not
    /// reveal that fact. The stand-in hash carries this hasher's cost
    /// parameters, so it costs the same as checking a real hash.
    pub fn verify_dummy(&self, candidate: &str) -> bool {
        if let Ok(parsed) = PasswordHash::new(&self.dummy) {
            let _ = self
                .argon2
                .verify_password(candidate.as_bytes(), &parsed);
        }
        false
    }
}

fn hash_with(argon2: &Argon2<'_>, plaintext: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);

    argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HashError::HashFailed(e.to_string()))
}
