//! Signing strategies and key material loading
//!
//! A [`SigningStrategy`] is either a shared HMAC secret or an RSA key pair.
//! The JWT algorithm is derived from the variant, so a strategy can never
//! sign with one algorithm and verify with another.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::config::AuthConfig;
use crate::error::KeyError;

/// Smallest RSA modulus the signer accepts
pub const MIN_RSA_BITS: usize = 2048;

/// The two recognized algorithm identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256
    Hs256,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    Rs256,
}

impl SigningAlgorithm {
    /// Identifier as it appears in the token header
    pub fn as_str(self) -> &'static str {
        match self {
            SigningAlgorithm::Hs256 => "HS256",
            SigningAlgorithm::Rs256 => "RS256",
        }
    }

    pub(crate) fn to_jwt(self) -> Algorithm {
        match self {
            SigningAlgorithm::Hs256 => Algorithm::HS256,
            SigningAlgorithm::Rs256 => Algorithm::RS256,
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HS256" => Ok(SigningAlgorithm::Hs256),
            "RS256" => Ok(SigningAlgorithm::Rs256),
            _ => Err(KeyError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Key material used to sign and verify tokens
pub enum SigningStrategy {
    /// Shared secret, HS256
    Symmetric { secret: Vec<u8> },

    /// RSA key pair, RS256. Verification only ever touches the public key.
    Asymmetric {
        private_key: Box<RsaPrivateKey>,
        public_key: RsaPublicKey,
    },
}

impl fmt::Debug for SigningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningStrategy::Symmetric { secret } => f
                .debug_struct("Symmetric")
                .field("secret", &format_args!("<{} bytes>", secret.len()))
                .finish(),
            SigningStrategy::Asymmetric { public_key, .. } => f
                .debug_struct("Asymmetric")
                .field("private_key", &"<RsaPrivateKey>")
                .field("modulus_bits", &(public_key.size() * 8))
                .finish(),
        }
    }
}

impl SigningStrategy {
    /// Shared-secret strategy
    pub fn symmetric(secret: impl Into<Vec<u8>>) -> Result<Self, KeyError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(KeyError::EmptySecret);
        }
        Ok(SigningStrategy::Symmetric { secret })
    }

    /// Key-pair strategy from already parsed keys
    ///
    /// The public key must be the one derived from the private key.
    pub fn asymmetric(private_key: RsaPrivateKey, public_key: RsaPublicKey) -> Result<Self, KeyError> {
        let bits = private_key.size() * 8;
        if bits < MIN_RSA_BITS {
            return Err(KeyError::Parse {
                what: "RSA private key",
                origin: "key pair".to_string(),
                reason: format!("key is {} bits, at least {} required", bits, MIN_RSA_BITS),
            });
        }

        if RsaPublicKey::from(&private_key) != public_key {
            return Err(KeyError::Mismatch);
        }

        Ok(SigningStrategy::Asymmetric {
            private_key: Box::new(private_key),
            public_key,
        })
    }

    /// Key-pair strategy from PEM text
    pub fn asymmetric_from_pem(private_pem: &str, public_pem: &str) -> Result<Self, KeyError> {
        let private_key = parse_private_key(private_pem, "private key PEM")?;
        let public_key = parse_public_key(public_pem, "public key PEM")?;
        Self::asymmetric(private_key, public_key)
    }

    /// Key-pair strategy from PEM files
    pub fn asymmetric_from_files(
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
    ) -> Result<Self, KeyError> {
        let private_key_path = private_key_path.as_ref();
        let public_key_path = public_key_path.as_ref();

        let private_pem = read_pem(private_key_path)?;
        let public_pem = read_pem(public_key_path)?;

        let private_key =
            parse_private_key(&private_pem, &private_key_path.display().to_string())?;
        let public_key = parse_public_key(&public_pem, &public_key_path.display().to_string())?;

        Self::asymmetric(private_key, public_key)
    }

    /// Build the strategy selected by configuration
    pub fn from_config(config: &AuthConfig) -> Result<Self, KeyError> {
        match config.algorithm.parse::<SigningAlgorithm>()? {
            SigningAlgorithm::Hs256 => {
                let secret = config.jwt_secret.as_deref().unwrap_or_default();
                Self::symmetric(secret.as_bytes())
            }
            SigningAlgorithm::Rs256 => {
                let private_key_path = config
                    .private_key_path
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .ok_or(KeyError::MissingPath("auth.private_key_path"))?;
                let public_key_path = config
                    .public_key_path
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .ok_or(KeyError::MissingPath("auth.public_key_path"))?;
                Self::asymmetric_from_files(private_key_path, public_key_path)
            }
        }
    }

    /// Algorithm implied by the strategy
    pub fn algorithm(&self) -> SigningAlgorithm {
        match self {
            SigningStrategy::Symmetric { .. } => SigningAlgorithm::Hs256,
            SigningStrategy::Asymmetric { .. } => SigningAlgorithm::Rs256,
        }
    }

    /// Signing key and verification key for the JWT library
    pub(crate) fn jwt_keys(&self) -> Result<(EncodingKey, DecodingKey), KeyError> {
        match self {
            SigningStrategy::Symmetric { secret } => Ok((
                EncodingKey::from_secret(secret),
                DecodingKey::from_secret(secret),
            )),
            SigningStrategy::Asymmetric {
                private_key,
                public_key,
            } => {
                let private_der = private_key.to_pkcs1_der().map_err(|e| KeyError::Encoding {
                    what: "RSA private key",
                    reason: e.to_string(),
                })?;
                let public_der = public_key.to_pkcs1_der().map_err(|e| KeyError::Encoding {
                    what: "RSA public key",
                    reason: e.to_string(),
                })?;
                Ok((
                    EncodingKey::from_rsa_der(private_der.as_bytes()),
                    DecodingKey::from_rsa_der(public_der.as_bytes()),
                ))
            }
        }
    }
}

fn read_pem(path: &Path) -> Result<String, KeyError> {
    std::fs::read_to_string(path).map_err(|source| KeyError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Label of the first PEM block, e.g. `RSA PRIVATE KEY`
fn pem_label(pem: &str) -> Option<&str> {
    const BEGIN: &str = "-----BEGIN ";
    let start = pem.find(BEGIN)? + BEGIN.len();
    let rest = &pem[start..];
    let end = rest.find("-----")?;
    Some(rest[..end].trim())
}

/// Parse an RSA private key in PKCS#1 or PKCS#8 form
fn parse_private_key(pem: &str, origin: &str) -> Result<RsaPrivateKey, KeyError> {
    let label = pem_label(pem).ok_or_else(|| KeyError::InvalidPem(origin.to_string()))?;

    let parsed = match label {
        "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| e.to_string()),
        "PRIVATE KEY" => RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| e.to_string()),
        other => {
            return Err(KeyError::UnsupportedKeyType {
                origin: origin.to_string(),
                label: other.to_string(),
            })
        }
    };

    let key = parsed.map_err(|reason| KeyError::Parse {
        what: "RSA private key",
        origin: origin.to_string(),
        reason,
    })?;

    key.validate().map_err(|e| KeyError::Parse {
        what: "RSA private key",
        origin: origin.to_string(),
        reason: e.to_string(),
    })?;

    Ok(key)
}

/// Parse an RSA public key in SPKI or PKCS#1 form
fn parse_public_key(pem: &str, origin: &str) -> Result<RsaPublicKey, KeyError> {
    let label = pem_label(pem).ok_or_else(|| KeyError::InvalidPem(origin.to_string()))?;

    let parsed = match label {
        "PUBLIC KEY" => RsaPublicKey::from_public_key_pem(pem).map_err(|e| e.to_string()),
        "RSA PUBLIC KEY" => RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| e.to_string()),
        other => {
            return Err(KeyError::UnsupportedKeyType {
                origin: origin.to_string(),
                label: other.to_string(),
            })
        }
    };

    parsed.map_err(|reason| KeyError::Parse {
        what: "RSA public key",
        origin: origin.to_string(),
        reason,
    })
}
