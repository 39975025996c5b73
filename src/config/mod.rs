//! Configuration management for gatekeeper
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::auth::jwt::TokenPolicy;
use crate::auth::keys::SigningAlgorithm;
use crate::auth::password::HashingConfig;
use crate::models::StoredCredential;
use crate::telemetry::LogFormat;

pub use crate::auth::ratelimit::RateLimitConfig;

const ENV_PREFIX: &str = "GATEKEEPER_";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Application identity
    #[serde(default)]
    pub app: AppConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Cross-origin configuration
    #[serde(default)]
    pub cors: CorsConfig,

    /// Token and password configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Admission control configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Seed users for the in-memory user store
    #[serde(default)]
    pub users: Vec<StoredCredential>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix GATEKEEPER_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(name) = env_var("APP_NAME") {
            config.app.name = name;
        }

        // Server
        if let Some(host) = env_var("SERVER_HOST") {
            config.server.host = host;
        }
        if let Some(port) = env_var("SERVER_PORT") {
            config.server.port = parse_env("SERVER_PORT", &port)?;
        }
        if let Some(limit) = env_var("SERVER_MAX_BODY_BYTES") {
            config.server.max_body_bytes = parse_env("SERVER_MAX_BODY_BYTES", &limit)?;
        }
        if let Some(timeout) = env_var("SERVER_REQUEST_TIMEOUT_SECS") {
            config.server.request_timeout_secs =
                parse_env("SERVER_REQUEST_TIMEOUT_SECS", &timeout)?;
        }

        // CORS
        if let Some(origins) = env_var("CORS_ALLOWED_ORIGINS") {
            config.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        // Auth
        if let Some(algorithm) = env_var("AUTH_ALGORITHM") {
            config.auth.algorithm = algorithm;
        }
        if let Some(secret) = env_var("AUTH_JWT_SECRET") {
            config.auth.jwt_secret = Some(secret);
        }
        if let Some(issuer) = env_var("AUTH_ISSUER") {
            config.auth.issuer = issuer;
        }
        if let Some(audience) = env_var("AUTH_AUDIENCE") {
            config.auth.audience = audience;
        }
        if let Some(ttl) = env_var("AUTH_ACCESS_TOKEN_TTL_SECS") {
            config.auth.access_token_ttl_secs = parse_env("AUTH_ACCESS_TOKEN_TTL_SECS", &ttl)?;
        }
        if let Some(path) = env_var("AUTH_PRIVATE_KEY_PATH") {
            config.auth.private_key_path = Some(path);
        }
        if let Some(path) = env_var("AUTH_PUBLIC_KEY_PATH") {
            config.auth.public_key_path = Some(path);
        }

        // Rate limit
        if let Some(rps) = env_var("RATE_LIMIT_RPS") {
            config.rate_limit.requests_per_second = parse_env("RATE_LIMIT_RPS", &rps)?;
        }
        if let Some(burst) = env_var("RATE_LIMIT_BURST") {
            config.rate_limit.burst = Some(parse_env("RATE_LIMIT_BURST", &burst)?);
        }

        // Logging
        if let Some(level) = env_var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = env_var("LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Check that every field the selected signing strategy needs is present
    ///
    /// All missing fields are reported together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let algorithm: SigningAlgorithm = self
            .auth
            .algorithm
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("auth.algorithm: {}", self.auth.algorithm)))?;

        let mut missing = Vec::new();

        match algorithm {
            SigningAlgorithm::Hs256 => {
                if is_blank(self.auth.jwt_secret.as_deref()) {
                    missing.push("auth.jwt_secret");
                }
            }
            SigningAlgorithm::Rs256 => {
                if is_blank(self.auth.private_key_path.as_deref()) {
                    missing.push("auth.private_key_path");
                }
                if is_blank(self.auth.public_key_path.as_deref()) {
                    missing.push("auth.public_key_path");
                }
            }
        }
        if self.auth.issuer.trim().is_empty() {
            missing.push("auth.issuer");
        }
        if self.auth.audience.trim().is_empty() {
            missing.push("auth.audience");
        }

        if !missing.is_empty() {
            return Err(ConfigError::MissingRequired(missing.join(", ")));
        }

        if self.auth.access_token_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.access_token_ttl_secs must be positive".to_string(),
            ));
        }
        if self.logging.format.parse::<LogFormat>().is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "logging.format: {}",
                self.logging.format
            )));
        }

        Ok(())
    }
}

/// Application identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Service name used in logs
    #[serde(default = "default_app_name")]
    pub name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
        }
    }
}

fn default_app_name() -> String {
    "gatekeeper".to_string()
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_request_timeout() -> u64 {
    30
}

/// Cross-origin configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CorsConfig {
    /// Allowed origins; `*` allows any origin. Empty disables CORS headers.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Whether to allow credentials (ignored for `*`)
    #[serde(default)]
    pub allow_credentials: bool,
}

/// Token and password configuration
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// `HS256` or `RS256`
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Shared secret for HS256
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Token issuer
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Token audience
    #[serde(default = "default_audience")]
    pub audience: String,

    /// Token lifetime in seconds
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_secs: u64,

    /// PEM private key for RS256 (PKCS#1 or PKCS#8)
    #[serde(default)]
    pub private_key_path: Option<String>,

    /// PEM public key for RS256
    #[serde(default)]
    pub public_key_path: Option<String>,

    /// Argon2 cost parameters
    #[serde(default)]
    pub hashing: HashingConfig,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("algorithm", &self.algorithm)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("private_key_path", &self.private_key_path)
            .field("public_key_path", &self.public_key_path)
            .field("hashing", &self.hashing)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            jwt_secret: None,
            issuer: default_issuer(),
            audience: default_audience(),
            access_token_ttl_secs: default_access_token_ttl(),
            private_key_path: None,
            public_key_path: None,
            hashing: HashingConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Issuer, audience and lifetime for the token authority
    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            ttl: Duration::from_secs(self.access_token_ttl_secs),
        }
    }
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_issuer() -> String {
    "gatekeeper".to_string()
}

fn default_audience() -> String {
    "gatekeeper-api".to_string()
}

fn default_access_token_ttl() -> u64 {
    15 * 60
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format, `json` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name)).ok()
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Parse(format!("Invalid value for {}{}: {}", ENV_PREFIX, name, value)))
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
