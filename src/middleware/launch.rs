//! Launch validation: state, token, nonce, LTI claims, identity.
//!
//! The caller consumes the pending launch before calling
//! [`validate_launch`], so every outcome, success or not, spends it.

use serde::Deserialize;
use time::OffsetDateTime;

use super::error::LtiError;
use super::types::{AuthenticatedSession, LaunchSession};
use crate::claims::LaunchClaims;
use crate::registration::PlatformRegistry;
use crate::roles::classify_roles;
use crate::token::{IdTokenVerifier, TokenExpectations};

/// Form body the platform POSTs to the launch URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LaunchForm {
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Run every launch check against the consumed `pending` launch.
///
/// # Errors
///
/// The first failed check, as the matching [`LtiError`]. Details are logged here.
pub async fn validate_launch(
    verifier: &IdTokenVerifier,
    registry: &PlatformRegistry,
    pending: Option<LaunchSession>,
    form: &LaunchForm,
    launch_ttl: time::Duration,
) -> Result<AuthenticatedSession, LtiError> {
    let id_token = form
        .id_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(LtiError::MissingToken)?;

    let pending = pending.ok_or_else(|| {
        tracing::warn!("Launch without a pending login for this session");
        LtiError::InvalidState("no pending launch")
    })?;
    if !pending.is_fresh(launch_ttl) {
        tracing::warn!(issuer = %pending.issuer, "Pending launch expired");
        return Err(LtiError::InvalidState("pending launch expired"));
    }
    if form.state.as_deref() != Some(pending.state.as_str()) {
        tracing::warn!(issuer = %pending.issuer, "Launch state mismatch");
        return Err(LtiError::InvalidState("state mismatch"));
    }

    let registration = registry
        .find(&pending.issuer, &pending.client_id)
        .ok_or_else(|| {
            tracing::error!(
                issuer = %pending.issuer,
                client_id = %pending.client_id,
                "Registration for pending launch no longer exists"
            );
            LtiError::UnknownClient(pending.client_id.clone())
        })?;

    let verified = verifier
        .verify(id_token, &TokenExpectations::from(registration))
        .await
        .map_err(|e| {
            tracing::warn!(
                issuer = %registration.issuer(),
                client_id = %registration.client_id(),
                error = %e,
                "id_token rejected"
            );
            LtiError::InvalidToken(e.to_string())
        })?;

    if verified.nonce() != Some(pending.nonce.as_str()) {
        tracing::warn!(issuer = %registration.issuer(), "id_token nonce mismatch");
        return Err(LtiError::InvalidNonce);
    }

    let claims = LaunchClaims::from_verified(&verified);
    claims.validate(registration).map_err(|e| {
        tracing::warn!(issuer = %registration.issuer(), error = %e, "LTI claims rejected");
        LtiError::InvalidClaims(e.to_string())
    })?;

    let display_name = claims.display_name();
    let LaunchClaims {
        subject,
        email,
        roles,
        context,
        resource_link,
        ..
    } = claims;
    let subject = subject.ok_or_else(|| LtiError::InvalidClaims("missing sub".into()))?;

    Ok(AuthenticatedSession {
        role: classify_roles(roles.as_slice()),
        subject,
        issuer: registration.issuer().to_owned(),
        display_name,
        email,
        roles,
        course_context: context,
        resource_link,
        authenticated_at: OffsetDateTime::now_utc(),
    })
}
