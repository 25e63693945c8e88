use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;

/// Generates the OIDC `state` parameter for a login attempt.
///
/// Returns a 43-character URL-safe string (32 random bytes → base64url).
#[must_use]
pub fn generate_state() -> String {
    random_token()
}

/// Generates the OIDC `nonce` bound into the platform's `id_token`.
///
/// Returns a 43-character URL-safe string (32 random bytes → base64url).
#[must_use]
pub fn generate_nonce() -> String {
    random_token()
}

/// Generates an opaque session identifier.
#[must_use]
pub fn generate_session_token() -> String {
    random_token()
}

fn random_token() -> String {
    let random_bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}
