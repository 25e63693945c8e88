use jsonwebtoken::jwk::Jwk;
use serde::{Deserialize, Serialize};

/// The tool's own JWKS document, served at `/.well-known/jwks.json`.
///
/// The tool signs no outbound messages, so the published set is empty.
/// Platforms still fetch it during registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ToolKeySet {
    pub keys: Vec<Jwk>,
}

impl ToolKeySet {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}
