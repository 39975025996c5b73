//! Domain models for gatekeeper

pub mod user;

pub use user::{LoginRequest, LoginResponse, StoredCredential};
