//! Authentication system for gatekeeper
//!
//! This module provides:
//! - Password hashing and verification
//! - Signed token issuance and verification under a fixed signing strategy
//! - Username/password login
//! - Process-wide admission control

pub mod jwt;
pub mod keys;
pub mod login;
pub mod password;
pub mod ratelimit;

pub use jwt::{IdentityClaims, IssuedToken, TokenAuthority, TokenPolicy};
pub use keys::{SigningAlgorithm, SigningStrategy};
pub use login::LoginService;
pub use password::{CredentialHasher, HashError, HashingConfig};
pub use ratelimit::{AdmissionGate, RateLimitConfig};
