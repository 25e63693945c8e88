use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::claims::{CourseContext, ResourceLink};
use crate::roles::RoleClass;

/// Pending launch attempt created by login initiation.
///
/// Consumed exactly once by the launch handler through
/// [`SessionStore::take_launch`](super::SessionStore::take_launch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSession {
    pub state: String,
    pub nonce: String,
    pub login_hint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_hint: Option<String>,
    /// Registration the login was initiated for.
    pub issuer: String,
    pub client_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
}

impl LaunchSession {
    /// Whether the attempt is younger than `max_age`.
    #[must_use]
    pub fn is_fresh(&self, max_age: time::Duration) -> bool {
        OffsetDateTime::now_utc() - self.issued_at < max_age
    }
}

/// Identity established by a fully validated launch.
///
/// This is what `GET /api/user` returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedSession {
    /// Platform user id (`sub`).
    pub subject: String,
    pub issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Role URIs as presented by the platform, unrecognized values included.
    pub roles: Vec<String>,
    pub role: RoleClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_context: Option<CourseContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_link: Option<ResourceLink>,
    #[serde(with = "time::serde::rfc3339")]
    pub authenticated_at: OffsetDateTime,
}

/// Everything stored under one session id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionData {
    pub launch: Option<LaunchSession>,
    pub user: Option<AuthenticatedSession>,
}

impl SessionData {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Partial update applied by [`SessionStore::set`](super::SessionStore::set).
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    /// Record a pending launch, replacing any earlier one.
    BeginLaunch(LaunchSession),
    /// Mark the session authenticated.
    Authenticate(AuthenticatedSession),
}
