use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::types::SessionId;

/// Session cookie for a tool embedded in a platform iframe.
///
/// Third-party contexts need `SameSite=None`, which browsers only accept
/// together with `Secure`. Without `secure`, `Lax` is used instead.
pub(super) fn session_cookie(
    name: &str,
    session_id: &SessionId,
    ttl: Duration,
    secure: bool,
) -> Cookie<'static> {
    let same_site = if secure { SameSite::None } else { SameSite::Lax };
    Cookie::build((name.to_string(), session_id.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(same_site)
        .path("/".to_string())
        .max_age(ttl)
        .build()
}

/// Expired, empty session cookie for logout.
pub(super) fn clear_session_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}

/// Session id from the decrypted session cookie, if any.
pub(super) fn session_id(jar: &PrivateCookieJar, name: &str) -> Option<SessionId> {
    jar.get(name)
        .map(|c| SessionId::from(c.value().to_string()))
        .filter(|id| !id.as_str().is_empty())
}
