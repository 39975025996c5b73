//! Token issuance and verification
//!
//! A [`TokenAuthority`] signs identity claims under one [`SigningStrategy`]
//! and verifies them back. Verification failures are reported to callers as
//! the single [`TokenError::Rejected`]; which check failed is only logged.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, decode_header, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::keys::{SigningAlgorithm, SigningStrategy};
use crate::clock::{Clock, SystemClock};
use crate::error::{KeyError, TokenError};

/// Issuer, audience and lifetime stamped into every token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPolicy {
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

/// Verified identity carried by a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaims {
    pub subject: String,
    pub issuer: String,
    pub audience: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A freshly signed token and the claims inside it
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: IdentityClaims,
}

impl IssuedToken {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.claims.expires_at
    }
}

/// `aud` may be a single string or an array on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(aud) => aud == audience,
            Audience::Many(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: String,
    iss: String,
    aud: Audience,
    iat: i64,
    exp: i64,
}

/// Why a token was rejected; logged, never returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum Rejection {
    #[error("malformed token header")]
    MalformedHeader,

    #[error("algorithm mismatch: expected {expected}, token declares {found:?}")]
    AlgorithmMismatch {
        expected: SigningAlgorithm,
        found: jsonwebtoken::Algorithm,
    },

    #[error("signature does not verify")]
    BadSignature,

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("token expired")]
    Expired,

    #[error("missing required claim: {0}")]
    MissingClaim(String),

    #[error("malformed token: {0}")]
    Malformed(String),
}

impl From<jsonwebtoken::errors::Error> for Rejection {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind as Kind;

        match err.kind() {
            Kind::InvalidSignature => Rejection::BadSignature,
            Kind::InvalidIssuer => Rejection::IssuerMismatch,
            Kind::InvalidAudience => Rejection::AudienceMismatch,
            Kind::ExpiredSignature => Rejection::Expired,
            Kind::MissingRequiredClaim(claim) => Rejection::MissingClaim(claim.clone()),
            _ => Rejection::Malformed(err.to_string()),
        }
    }
}

/// Issues and verifies signed identity tokens
///
/// Built once at startup and shared behind an `Arc`. Nothing in it changes
/// after construction, so concurrent `issue`/`verify` calls need no locking.
pub struct TokenAuthority {
    policy: TokenPolicy,
    algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("policy", &self.policy)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    /// Create an authority reading time from `clock`
    pub fn new(
        policy: TokenPolicy,
        strategy: SigningStrategy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, KeyError> {
        let algorithm = strategy.algorithm();
        let (encoding_key, decoding_key) = strategy.jwt_keys()?;

        let mut validation = Validation::new(algorithm.to_jwt());
        validation.set_issuer(&[policy.issuer.as_str()]);
        validation.set_audience(&[policy.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        // Expiry is checked against our own clock
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(Self {
            policy,
            algorithm,
            encoding_key,
            decoding_key,
            validation,
            clock,
        })
    }

    /// Create an authority on the system clock
    pub fn with_system_clock(
        policy: TokenPolicy,
        strategy: SigningStrategy,
    ) -> Result<Self, KeyError> {
        Self::new(policy, strategy, Arc::new(SystemClock))
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    /// Sign a token for `subject`
    pub fn issue(&self, subject: &str) -> Result<IssuedToken, TokenError> {
        if subject.is_empty() {
            return Err(TokenError::Signing("subject must not be empty".to_string()));
        }

        let issued_at = self.clock.now().timestamp();
        let ttl = i64::try_from(self.policy.ttl.as_secs())
            .map_err(|_| TokenError::Signing("ttl out of range".to_string()))?;
        let expires_at = issued_at
            .checked_add(ttl)
            .ok_or_else(|| TokenError::Signing("expiry out of range".to_string()))?;

        let wire = WireClaims {
            sub: subject.to_string(),
            iss: self.policy.issuer.clone(),
            aud: Audience::One(self.policy.audience.clone()),
            iat: issued_at,
            exp: expires_at,
        };

        let header = Header::new(self.algorithm.to_jwt());
        let token = encode(&header, &wire, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        let claims = IdentityClaims {
            subject: wire.sub,
            issuer: wire.iss,
            audience: self.policy.audience.clone(),
            issued_at: timestamp(issued_at)
                .ok_or_else(|| TokenError::Signing("issued-at out of range".to_string()))?,
            expires_at: timestamp(expires_at)
                .ok_or_else(|| TokenError::Signing("expiry out of range".to_string()))?,
        };

        debug!(subject = %claims.subject, expires_at = %claims.expires_at, "Token issued");

        Ok(IssuedToken { token, claims })
    }

    /// Verify a token and return its claims
    pub fn verify(&self, token: &str) -> Result<IdentityClaims, TokenError> {
        self.evaluate(token).map_err(|rejection| {
            warn!(reason = %rejection, "Token rejected");
            TokenError::Rejected
        })
    }

    pub(crate) fn evaluate(&self, token: &str) -> Result<IdentityClaims, Rejection> {
        let header = decode_header(token).map_err(|_| Rejection::MalformedHeader)?;
        if header.alg != self.algorithm.to_jwt() {
            return Err(Rejection::AlgorithmMismatch {
                expected: self.algorithm,
                found: header.alg,
            });
        }

        let data = decode::<WireClaims>(token, &self.decoding_key, &self.validation)?;
        let wire = data.claims;

        if wire.sub.is_empty() {
            return Err(Rejection::MissingClaim("sub".to_string()));
        }
        if wire.iss != self.policy.issuer {
            return Err(Rejection::IssuerMismatch);
        }
        if !wire.aud.contains(&self.policy.audience) {
            return Err(Rejection::AudienceMismatch);
        }
        if wire.exp <= self.clock.now().timestamp() {
            return Err(Rejection::Expired);
        }

        Ok(IdentityClaims {
            subject: wire.sub,
            issuer: wire.iss,
            audience: self.policy.audience.clone(),
            issued_at: timestamp(wire.iat)
                .ok_or_else(|| Rejection::Malformed("iat out of range".to_string()))?,
            expires_at: timestamp(wire.exp)
                .ok_or_else(|| Rejection::Malformed("exp out of range".to_string()))?,
        })
    }
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}
