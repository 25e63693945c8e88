use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::error::Error;
use crate::nonce;

/// A platform (LMS) registration: the static trust anchor for one
/// issuer + client id pair.
///
/// Required fields are constructor parameters, no runtime "missing field" errors.
///
/// ```rust,ignore
/// use lti_tool::PlatformRegistration;
///
/// let registration = PlatformRegistration::new(
///     "https://blackboard.com",
///     "my-client-id",
///     "deployment-1",
///     "https://lms.example.com/oidc/authorize".parse()?,
///     "https://lms.example.com/oidc/jwks".parse()?,
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct PlatformRegistration {
    pub(crate) issuer: String,
    pub(crate) client_id: String,
    pub(crate) deployment_id: String,
    pub(crate) authorization_endpoint: Url,
    pub(crate) jwks_uri: Url,
}

impl PlatformRegistration {
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        deployment_id: impl Into<String>,
        authorization_endpoint: Url,
        jwks_uri: Url,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            deployment_id: deployment_id.into(),
            authorization_endpoint,
            jwks_uri,
        }
    }

    /// Expected `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Client id assigned by the platform; the expected `aud`.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Expected deployment-id claim.
    #[must_use]
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    /// Platform OIDC authorization endpoint.
    #[must_use]
    pub fn authorization_endpoint(&self) -> &Url {
        &self.authorization_endpoint
    }

    /// Platform JWKS URI.
    #[must_use]
    pub fn jwks_uri(&self) -> &Url {
        &self.jwks_uri
    }

    /// Checks identifiers are non-empty and endpoints use HTTPS
    /// (plain HTTP is accepted for loopback hosts only).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first offending field.
    pub fn validate(&self) -> Result<(), Error> {
        for (name, value) in [
            ("issuer", &self.issuer),
            ("clientId", &self.client_id),
            ("deploymentId", &self.deployment_id),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("registration {name} is empty")));
            }
        }
        require_https("authorizationEndpoint", &self.authorization_endpoint)?;
        require_https("jwksUri", &self.jwks_uri)
    }

    /// Build the OIDC authorization redirect for a login initiation.
    ///
    /// `redirect_uri` must be the tool's own pre-registered launch URL; it is
    /// never taken from request input. It is also sent as `target_link_uri`.
    #[must_use]
    pub fn authorization_request(
        &self,
        redirect_uri: &Url,
        login_hint: &str,
        lti_message_hint: Option<&str>,
    ) -> AuthorizationRequest {
        let state = nonce::generate_state();
        let nonce = nonce::generate_nonce();

        let mut url = self.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "id_token")
                .append_pair("response_mode", "form_post")
                .append_pair("scope", "openid")
                .append_pair("prompt", "none")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", redirect_uri.as_str())
                .append_pair("state", &state)
                .append_pair("nonce", &nonce)
                .append_pair("login_hint", login_hint)
                .append_pair("target_link_uri", redirect_uri.as_str());
            if let Some(hint) = lti_message_hint {
                query.append_pair("lti_message_hint", hint);
            }
        }

        AuthorizationRequest {
            url: url.into(),
            state,
            nonce,
        }
    }
}

/// Third-party login initiation parameters, from the query (GET) or form body (POST).
///
/// All fields are optional at the wire level so that a missing parameter is
/// reported by name instead of as a generic extractor rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginInitiation {
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub login_hint: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    /// Informational only; the redirect target is always the registered launch URL.
    #[serde(default)]
    pub target_link_uri: Option<String>,
    #[serde(default)]
    pub lti_message_hint: Option<String>,
    #[serde(default)]
    pub lti_deployment_id: Option<String>,
}

/// Authorization redirect plus the single-use values to store in the session.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub nonce: String,
}

/// Why a login initiation could not be matched to a registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("no registration for issuer {0}")]
    UnknownIssuer(String),

    #[error("client id {client_id} is not registered for issuer {issuer}")]
    UnknownClient { issuer: String, client_id: String },

    #[error("issuer {0} has several registrations and no client id was supplied")]
    AmbiguousClient(String),
}

/// Registry of platform registrations keyed by issuer, then client id.
///
/// Loaded once at startup and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct PlatformRegistry {
    by_issuer: HashMap<String, Vec<PlatformRegistration>>,
}

impl PlatformRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validated registration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the registration is invalid or the
    /// issuer + client id pair is already registered.
    pub fn register(&mut self, registration: PlatformRegistration) -> Result<(), Error> {
        registration.validate()?;
        let entries = self
            .by_issuer
            .entry(registration.issuer.clone())
            .or_default();
        if entries
            .iter()
            .any(|existing| existing.client_id == registration.client_id)
        {
            return Err(Error::Config(format!(
                "duplicate registration for issuer {} and client id {}",
                registration.issuer, registration.client_id
            )));
        }
        entries.push(registration);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn with(mut self, registration: PlatformRegistration) -> Result<Self, Error> {
        self.register(registration)?;
        Ok(self)
    }

    /// Exact lookup by issuer and client id.
    #[must_use]
    pub fn find(&self, issuer: &str, client_id: &str) -> Option<&PlatformRegistration> {
        self.by_issuer
            .get(issuer)?
            .iter()
            .find(|r| r.client_id == client_id)
    }

    /// Resolve the registration for a login initiation.
    ///
    /// A supplied `client_id` must match exactly. Without one, the issuer
    /// must have exactly one registration.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] when no single registration matches.
    pub fn resolve(
        &self,
        issuer: &str,
        client_id: Option<&str>,
    ) -> Result<&PlatformRegistration, LookupError> {
        let entries = self
            .by_issuer
            .get(issuer)
            .ok_or_else(|| LookupError::UnknownIssuer(issuer.to_string()))?;

        match client_id {
            Some(client_id) => entries
                .iter()
                .find(|r| r.client_id == client_id)
                .ok_or_else(|| LookupError::UnknownClient {
                    issuer: issuer.to_string(),
                    client_id: client_id.to_string(),
                }),
            None => match entries.as_slice() {
                [only] => Ok(only),
                _ => Err(LookupError::AmbiguousClient(issuer.to_string())),
            },
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlatformRegistration> {
        self.by_issuer.values().flatten()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_issuer.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn require_https(name: &str, url: &Url) -> Result<(), Error> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if is_loopback(url) => Ok(()),
        scheme => Err(Error::Config(format!(
            "{name} must use https (got {scheme}://{})",
            url.host_str().unwrap_or_default()
        ))),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}
