use std::time::Duration;

use axum_extra::extract::cookie::Key;
use url::Url;

use super::error::LtiError;
use crate::error::Error;
use crate::jwks::{DEFAULT_JWKS_TTL, DEFAULT_MIN_REFRESH_INTERVAL, FETCH_TIMEOUT};
use crate::registration::{PlatformRegistration, PlatformRegistry};
use crate::token::DEFAULT_CLOCK_SKEW;

/// Environment variables that together describe one platform registration.
const REGISTRATION_VARS: [&str; 5] = [
    "LTI_PLATFORM_ISS",
    "LTI_CLIENT_ID",
    "LTI_DEPLOYMENT_ID",
    "LTI_PLATFORM_OIDC_AUTH",
    "LTI_PLATFORM_JWKS",
];

/// Runtime settings shared by the route handlers.
#[derive(Clone)]
pub(crate) struct ToolSettings {
    pub(crate) cookie_key: Key,
    pub(crate) session_cookie_name: String,
    pub(crate) session_ttl: time::Duration,
    pub(crate) launch_ttl: time::Duration,
    pub(crate) secure_cookies: bool,
    pub(crate) student_dashboard: String,
    pub(crate) admin_dashboard: String,
    pub(crate) landing_page: String,
    pub(crate) launch_url: Option<Url>,
    pub(crate) missing: Vec<String>,
}

impl ToolSettings {
    fn defaults() -> Self {
        Self {
            cookie_key: Key::generate(),
            session_cookie_name: "__lti_session".into(),
            session_ttl: time::Duration::hours(8),
            launch_ttl: time::Duration::minutes(10),
            secure_cookies: true,
            student_dashboard: "/student-dashboard".into(),
            admin_dashboard: "/admin-dashboard".into(),
            landing_page: "/".into(),
            launch_url: None,
            missing: Vec::new(),
        }
    }

    /// Fails with [`LtiError::Configuration`] while any required setting is missing.
    pub(crate) fn ensure_configured(&self) -> Result<&Url, LtiError> {
        if !self.missing.is_empty() {
            return Err(LtiError::Configuration(format!(
                "missing {}",
                self.missing.join(", ")
            )));
        }
        self.launch_url
            .as_ref()
            .ok_or_else(|| LtiError::Configuration("missing BASE_URL".into()))
    }
}

/// LTI tool configuration.
///
/// Use [`from_env()`](ToolConfig::from_env) for deployment, or
/// [`new()`](ToolConfig::new) with `with_*` methods for full control.
pub struct ToolConfig {
    pub(super) registry: PlatformRegistry,
    pub(super) http: reqwest::Client,
    pub(super) jwks_ttl: Duration,
    pub(super) jwks_refresh_interval: Duration,
    pub(super) clock_skew: Duration,
    pub(super) settings: ToolSettings,
}

impl ToolConfig {
    /// Create config from a registry and the tool's public base URL.
    ///
    /// The launch URL sent as `redirect_uri` is `base_url` + `/lti/launch`.
    #[must_use]
    pub fn new(registry: PlatformRegistry, base_url: &Url) -> Self {
        let mut settings = ToolSettings::defaults();
        settings.launch_url = launch_url(base_url);
        if registry.is_empty() {
            settings.missing.push("platform registration".into());
        }
        Self {
            registry,
            http: default_http_client(),
            jwks_ttl: DEFAULT_JWKS_TTL,
            jwks_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            clock_skew: DEFAULT_CLOCK_SKEW,
            settings,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Registration
    /// - `LTI_PLATFORM_ISS`, `LTI_CLIENT_ID`, `LTI_DEPLOYMENT_ID`,
    ///   `LTI_PLATFORM_OIDC_AUTH`, `LTI_PLATFORM_JWKS`: one platform registration
    /// - `LTI_REGISTRATIONS_FILE`: JSON array of additional registrations
    ///
    /// # Tool
    /// - `BASE_URL`: public base URL of the tool
    /// - `SESSION_SECRET`: cookie encryption key material, at least 64 bytes
    /// - `COOKIE_SECURE`: `false` or `0` for plain-HTTP development
    /// - `SESSION_TTL_HOURS` (default 8), `JWKS_CACHE_TTL_SECS` (default 600)
    ///
    /// Absent required values are recorded rather than rejected: the server
    /// starts, `/lti/health` lists them, and login/launch fail with a
    /// configuration error until they are provided.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for values that are present but malformed.
    pub fn from_env() -> Result<Self, Error> {
        let mut missing = Vec::new();
        let mut registry = PlatformRegistry::new();

        if let Ok(path) = std::env::var("LTI_REGISTRATIONS_FILE") {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("LTI_REGISTRATIONS_FILE {path}: {e}")))?;
            let registrations: Vec<PlatformRegistration> = serde_json::from_str(&raw)
                .map_err(|e| Error::Config(format!("LTI_REGISTRATIONS_FILE {path}: {e}")))?;
            for registration in registrations {
                registry.register(registration)?;
            }
        }

        let values: Vec<Option<String>> = REGISTRATION_VARS.iter().map(|name| env(name)).collect();
        match values.as_slice() {
            [Some(iss), Some(client_id), Some(deployment_id), Some(auth), Some(jwks)] => {
                registry.register(PlatformRegistration::new(
                    iss.as_str(),
                    client_id.as_str(),
                    deployment_id.as_str(),
                    parse_url("LTI_PLATFORM_OIDC_AUTH", auth)?,
                    parse_url("LTI_PLATFORM_JWKS", jwks)?,
                ))?;
            }
            partial => {
                let any_set = partial.iter().any(Option::is_some);
                if any_set || registry.is_empty() {
                    missing.extend(
                        REGISTRATION_VARS
                            .iter()
                            .zip(partial)
                            .filter(|(_, value)| value.is_none())
                            .map(|(name, _)| (*name).to_string()),
                    );
                }
            }
        }

        let base_url = env("BASE_URL")
            .map(|raw| parse_url("BASE_URL", &raw))
            .transpose()?;
        if base_url.is_none() {
            missing.push("BASE_URL".into());
        }

        let cookie_key = match env("SESSION_SECRET") {
            Some(secret) => Key::try_from(secret.as_bytes()).map_err(|_| {
                Error::Config("SESSION_SECRET must be at least 64 bytes".into())
            })?,
            None => {
                missing.push("SESSION_SECRET".into());
                Key::generate()
            }
        };

        let secure_cookies = !matches!(env("COOKIE_SECURE").as_deref(), Some("false" | "0"));

        let mut config = Self {
            registry,
            http: default_http_client(),
            jwks_ttl: DEFAULT_JWKS_TTL,
            jwks_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            clock_skew: DEFAULT_CLOCK_SKEW,
            settings: ToolSettings::defaults(),
        }
        .with_cookie_key(cookie_key)
        .with_secure_cookies(secure_cookies);

        if let Some(hours) = env("SESSION_TTL_HOURS") {
            let hours: u32 = hours
                .parse()
                .map_err(|e| Error::Config(format!("SESSION_TTL_HOURS: {e}")))?;
            config = config.with_session_ttl_hours(hours);
        }
        if let Some(secs) = env("JWKS_CACHE_TTL_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| Error::Config(format!("JWKS_CACHE_TTL_SECS: {e}")))?;
            config = config.with_jwks_cache_ttl(Duration::from_secs(secs));
        }

        config.settings.launch_url = base_url.as_ref().and_then(launch_url);
        config.settings.missing = missing;
        Ok(config)
    }

    #[must_use]
    pub fn with_cookie_key(mut self, key: Key) -> Self {
        self.settings.cookie_key = key;
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_session_ttl_hours(mut self, hours: u32) -> Self {
        self.settings.session_ttl = time::Duration::hours(i64::from(hours));
        self
    }

    /// Maximum age of a pending launch (login to launch POST).
    #[must_use]
    pub fn with_launch_ttl(mut self, ttl: time::Duration) -> Self {
        self.settings.launch_ttl = ttl;
        self
    }

    /// `false` drops `Secure` and falls back to `SameSite=Lax`; plain-HTTP development only.
    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    /// Use a custom HTTP client for JWKS fetches.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn with_jwks_cache_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_ttl = ttl;
        self
    }

    /// Minimum spacing between key set refetches triggered by an unknown `kid`.
    #[must_use]
    pub fn with_jwks_refresh_interval(mut self, interval: Duration) -> Self {
        self.jwks_refresh_interval = interval;
        self
    }

    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    #[must_use]
    pub fn with_dashboards(
        mut self,
        student: impl Into<String>,
        admin: impl Into<String>,
        landing: impl Into<String>,
    ) -> Self {
        self.settings.student_dashboard = student.into();
        self.settings.admin_dashboard = admin.into();
        self.settings.landing_page = landing.into();
        self
    }

    /// The fixed `redirect_uri` sent to platforms.
    #[must_use]
    pub fn launch_url(&self) -> Option<&Url> {
        self.settings.launch_url.as_ref()
    }

    /// Required settings that were not provided.
    #[must_use]
    pub fn missing(&self) -> &[String] {
        &self.settings.missing
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.settings.missing.is_empty() && self.settings.launch_url.is_some()
    }

    #[must_use]
    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    #[must_use]
    pub fn session_ttl(&self) -> time::Duration {
        self.settings.session_ttl
    }

    /// Lifetime of a session that only holds a pending launch.
    #[must_use]
    pub fn launch_ttl(&self) -> time::Duration {
        self.settings.launch_ttl
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_url(name: &str, raw: &str) -> Result<Url, Error> {
    raw.parse()
        .map_err(|e| Error::Config(format!("{name}: {e}")))
}

fn launch_url(base_url: &Url) -> Option<Url> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("lti/launch").ok()
}

fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}
