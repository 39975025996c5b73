//! gatekeeper - Authentication and request gating for an HTTP API
//!
//! This crate provides signed-token issuance and verification under a
//! symmetric or asymmetric signing strategy, password hashing, a bearer-token
//! authentication middleware, process-wide admission control, and a unified
//! error taxonomy rendered into structured JSON bodies.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod store;
pub mod telemetry;
