use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::nonce;

/// Opaque server-side session identifier carried in the encrypted session cookie.
///
/// Generated from 256 bits of randomness. Use [`SessionId::redacted`] when logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a fresh random session identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(nonce::generate_session_token())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log correlation without exposing the id.
    #[must_use]
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(8).collect();
        format!("{prefix}…")
    }
}

/// JWK key identifier (`kid` header of a signed token).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct KeyId(pub String);
