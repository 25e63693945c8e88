//! LTI 1.3 message claims.

use serde::{Deserialize, Serialize};

use crate::registration::PlatformRegistration;
use crate::token::VerifiedClaims;

pub const MESSAGE_TYPE_CLAIM: &str = "https://purl.imsglobal.org/spec/lti/claim/message_type";
pub const VERSION_CLAIM: &str = "https://purl.imsglobal.org/spec/lti/claim/version";
pub const DEPLOYMENT_ID_CLAIM: &str = "https://purl.imsglobal.org/spec/lti/claim/deployment_id";
pub const ROLES_CLAIM: &str = "https://purl.imsglobal.org/spec/lti/claim/roles";
pub const CONTEXT_CLAIM: &str = "https://purl.imsglobal.org/spec/lti/claim/context";
pub const RESOURCE_LINK_CLAIM: &str = "https://purl.imsglobal.org/spec/lti/claim/resource_link";
pub const TARGET_LINK_URI_CLAIM: &str =
    "https://purl.imsglobal.org/spec/lti/claim/target_link_uri";

/// The only message type this tool launches.
pub const RESOURCE_LINK_REQUEST: &str = "LtiResourceLinkRequest";

/// Supported LTI version.
pub const LTI_VERSION: &str = "1.3.0";

/// Course the launch came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseContext {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Placement of the tool inside the course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLink {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Why a verified token is not an acceptable launch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("missing claim {0}")]
    Missing(&'static str),

    #[error("unsupported message type {0}")]
    UnsupportedMessageType(String),

    #[error("unsupported LTI version {0}")]
    UnsupportedVersion(String),

    #[error("deployment id {0} is not registered")]
    DeploymentMismatch(String),
}

/// LTI-specific view of a verified `id_token`.
///
/// Malformed optional claims (a `context` without an `id`, a non-array
/// `roles`) are treated as absent; only the required claims are enforced by
/// [`validate`](Self::validate).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaunchClaims {
    pub subject: Option<String>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub message_type: Option<String>,
    pub version: Option<String>,
    pub deployment_id: Option<String>,
    pub roles: Vec<String>,
    pub context: Option<CourseContext>,
    pub resource_link: Option<ResourceLink>,
    pub target_link_uri: Option<String>,
}

impl LaunchClaims {
    #[must_use]
    pub fn from_verified(claims: &VerifiedClaims) -> Self {
        let string = |name: &str| claims.get_str(name).map(str::to_owned);
        let object = |name: &str| claims.get_claim(name).cloned();

        let roles = claims
            .get_claim(ROLES_CLAIM)
            .and_then(|v| v.as_array())
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            subject: string("sub"),
            name: string("name"),
            given_name: string("given_name"),
            family_name: string("family_name"),
            email: string("email"),
            message_type: string(MESSAGE_TYPE_CLAIM),
            version: string(VERSION_CLAIM),
            deployment_id: string(DEPLOYMENT_ID_CLAIM),
            roles,
            context: object(CONTEXT_CLAIM).and_then(|v| serde_json::from_value(v).ok()),
            resource_link: object(RESOURCE_LINK_CLAIM).and_then(|v| serde_json::from_value(v).ok()),
            target_link_uri: string(TARGET_LINK_URI_CLAIM),
        }
    }

    /// Check message type, version and deployment against `registration`.
    ///
    /// # Errors
    ///
    /// Returns the first failed [`ClaimError`].
    pub fn validate(&self, registration: &PlatformRegistration) -> Result<(), ClaimError> {
        let message_type = self
            .message_type
            .as_deref()
            .ok_or(ClaimError::Missing("message_type"))?;
        if message_type != RESOURCE_LINK_REQUEST {
            return Err(ClaimError::UnsupportedMessageType(message_type.to_owned()));
        }

        let version = self.version.as_deref().ok_or(ClaimError::Missing("version"))?;
        if version != LTI_VERSION {
            return Err(ClaimError::UnsupportedVersion(version.to_owned()));
        }

        let deployment_id = self
            .deployment_id
            .as_deref()
            .ok_or(ClaimError::Missing("deployment_id"))?;
        if deployment_id != registration.deployment_id() {
            return Err(ClaimError::DeploymentMismatch(deployment_id.to_owned()));
        }

        Ok(())
    }

    /// `name`, or `given_name family_name` when `name` is absent.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return Some(name.to_owned());
        }
        let parts: Vec<&str> = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|p| !p.trim().is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}
