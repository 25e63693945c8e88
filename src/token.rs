//! Platform `id_token` verification.
//!
//! The verifier accepts asymmetric algorithms only. The algorithm and `kid`
//! are read from the raw header before any key lookup, so tokens declaring
//! `none` or an HMAC algorithm are rejected without touching the key cache.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::jwks::KeySetCache;
use crate::registration::PlatformRegistration;
use crate::types::KeyId;

/// Clock skew tolerated on `exp`, `nbf` and `iat`.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Signature algorithms a platform may use.
pub const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// Why an `id_token` was rejected.
///
/// The distinction is for logs. HTTP callers collapse every variant into a
/// single generic "invalid token" response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum VerificationError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("algorithm {0} is not allowed")]
    DisallowedAlgorithm(String),

    #[error("token header has no kid")]
    MissingKid,

    #[error("no platform key with kid {0}")]
    UnknownKid(KeyId),

    #[error("platform key set unavailable: {0}")]
    KeySetUnavailable(String),

    #[error("platform key unusable: {0}")]
    UnusableKey(String),

    #[error("signature verification failed")]
    BadSignature,

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("token issued in the future")]
    IssuedInFuture,

    #[error("missing required claim {0}")]
    MissingClaim(String),
}

/// What a token must match to be accepted.
#[derive(Debug, Clone, Copy)]
pub struct TokenExpectations<'a> {
    pub issuer: &'a str,
    pub audience: &'a str,
    pub jwks_uri: &'a str,
}

impl<'a> From<&'a PlatformRegistration> for TokenExpectations<'a> {
    fn from(registration: &'a PlatformRegistration) -> Self {
        Self {
            issuer: registration.issuer(),
            audience: registration.client_id(),
            jwks_uri: registration.jwks_uri().as_str(),
        }
    }
}

/// The payload of a token that passed signature and registered-claim checks.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims {
    inner: JsonValue,
}

impl VerifiedClaims {
    #[must_use]
    pub fn get_claim(&self, name: &str) -> Option<&JsonValue> {
        self.inner.get(name)
    }

    /// String claim, `None` if absent or not a string.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get_claim(name).and_then(JsonValue::as_str)
    }

    #[must_use]
    pub fn as_json(&self) -> &JsonValue {
        &self.inner
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    #[must_use]
    pub fn nonce(&self) -> Option<&str> {
        self.get_str("nonce")
    }
}

/// The JOSE header fields read before verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntrustedHeader {
    pub alg: Algorithm,
    pub kid: Option<KeyId>,
}

#[derive(Deserialize)]
struct RawHeader {
    alg: Option<String>,
    kid: Option<String>,
}

/// Decode the header without verifying anything.
///
/// # Errors
///
/// - [`VerificationError::Malformed`] if the token is not a three-part compact JWS.
/// - [`VerificationError::DisallowedAlgorithm`] if `alg` is absent, unknown,
///   symmetric or `none`.
pub fn decode_untrusted_header(token: &str) -> Result<UntrustedHeader, VerificationError> {
    let mut parts = token.split('.');
    let (Some(header), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(VerificationError::Malformed(
            "expected three dot-separated segments".into(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|e| VerificationError::Malformed(format!("header is not base64url: {e}")))?;
    let raw: RawHeader = serde_json::from_slice(&bytes)
        .map_err(|e| VerificationError::Malformed(format!("header is not JSON: {e}")))?;

    let alg_name = raw.alg.unwrap_or_default();
    let alg = alg_name
        .parse::<Algorithm>()
        .ok()
        .filter(|alg| ALLOWED_ALGORITHMS.contains(alg))
        .ok_or(VerificationError::DisallowedAlgorithm(alg_name))?;

    Ok(UntrustedHeader {
        alg,
        kid: raw.kid.map(KeyId::from),
    })
}

/// Read the `kid` header of a token.
///
/// # Errors
///
/// See [`decode_untrusted_header`]; additionally [`VerificationError::MissingKid`].
pub fn extract_kid_from_token(token: &str) -> Result<KeyId, VerificationError> {
    decode_untrusted_header(token)?
        .kid
        .ok_or(VerificationError::MissingKid)
}

/// Verifies platform-signed `id_token`s against the platform's published keys.
#[derive(Debug, Clone)]
pub struct IdTokenVerifier {
    keys: Arc<KeySetCache>,
    leeway: Duration,
}

impl IdTokenVerifier {
    #[must_use]
    pub fn new(keys: Arc<KeySetCache>) -> Self {
        Self {
            keys,
            leeway: DEFAULT_CLOCK_SKEW,
        }
    }

    #[must_use]
    pub fn with_clock_skew(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    #[must_use]
    pub fn key_cache(&self) -> &Arc<KeySetCache> {
        &self.keys
    }

    /// Verify signature, `iss`, `aud`, `exp`, `nbf` and `iat`.
    ///
    /// `aud` may be a string or an array; it must contain the expected audience.
    ///
    /// # Errors
    ///
    /// Returns the specific [`VerificationError`] for the first failed check.
    pub async fn verify(
        &self,
        token: &str,
        expected: &TokenExpectations<'_>,
    ) -> Result<VerifiedClaims, VerificationError> {
        let header = decode_untrusted_header(token)?;
        let kid = header.kid.ok_or(VerificationError::MissingKid)?;
        let key = self.keys.decoding_key(expected.jwks_uri, &kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway.as_secs();
        validation.validate_nbf = true;
        validation.set_issuer(&[expected.issuer]);
        validation.set_audience(&[expected.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let data = decode::<JsonValue>(token, &key, &validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => VerificationError::BadSignature,
            ErrorKind::InvalidIssuer => VerificationError::IssuerMismatch,
            ErrorKind::InvalidAudience => VerificationError::AudienceMismatch,
            ErrorKind::ExpiredSignature => VerificationError::Expired,
            ErrorKind::ImmatureSignature => VerificationError::NotYetValid,
            ErrorKind::MissingRequiredClaim(claim) => {
                VerificationError::MissingClaim(claim.clone())
            }
            ErrorKind::InvalidAlgorithm => {
                VerificationError::DisallowedAlgorithm(format!("{:?}", header.alg))
            }
            ErrorKind::InvalidKeyFormat => VerificationError::UnusableKey(e.to_string()),
            _ => VerificationError::Malformed(e.to_string()),
        })?;

        self.check_issued_at(&data.claims)?;

        tracing::debug!(
            issuer = %expected.issuer,
            kid = %kid,
            "id_token signature and registered claims verified"
        );
        Ok(VerifiedClaims { inner: data.claims })
    }

    fn check_issued_at(&self, claims: &JsonValue) -> Result<(), VerificationError> {
        let iat = claims
            .get("iat")
            .and_then(JsonValue::as_f64)
            .ok_or_else(|| VerificationError::MissingClaim("iat".into()))?;
        let now = time::OffsetDateTime::now_utc().unix_timestamp() as f64;
        if iat > now + self.leeway.as_secs_f64() {
            return Err(VerificationError::IssuedInFuture);
        }
        Ok(())
    }
}
