use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::Key;

use super::cookies;
use super::error::LtiError;
use super::state::AppState;
use super::traits::{ProgressGateway, SessionStore};
use super::types::AuthenticatedSession;
use crate::types::SessionId;

/// Identity of a browser session that completed a launch.
///
/// Use as an Axum extractor in route handlers. Rejects with `401` when the
/// cookie is missing, undecryptable, unknown, expired, or belongs to a
/// session that only has a pending launch.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected(user: AuthUser) -> impl IntoResponse {
///     format!("Hello, {}", user.user.subject)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Session ID (from cookie).
    pub session_id: SessionId,
    pub user: AuthenticatedSession,
}

impl<S: SessionStore, G: ProgressGateway> FromRequestParts<AppState<S, G>> for AuthUser {
    type Rejection = LtiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S, G>,
    ) -> Result<Self, Self::Rejection> {
        let jar: PrivateCookieJar<Key> = PrivateCookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| LtiError::Unauthenticated)?;

        let session_id = cookies::session_id(&jar, &state.settings.session_cookie_name)
            .ok_or(LtiError::Unauthenticated)?;

        let user = state
            .sessions
            .get(&session_id)
            .await
            .map_err(|e| LtiError::Store(e.to_string()))?
            .and_then(|data| data.user)
            .ok_or(LtiError::Unauthenticated)?;

        Ok(Self { session_id, user })
    }
}
