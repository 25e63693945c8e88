use std::sync::Arc;

use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::http::{StatusCode, header::LOCATION};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::PrivateCookieJar;
use serde_json::{Value as JsonValue, json};
use time::OffsetDateTime;

use super::api;
use super::config::ToolConfig;
use super::cookies;
use super::error::LtiError;
use super::extractor::AuthUser;
use super::launch::{LaunchForm, validate_launch};
use super::state::AppState;
use super::traits::{ProgressGateway, SessionStore};
use super::types::{LaunchSession, SessionUpdate};
use crate::jwks::KeySetCache;
use crate::registration::{LoginInitiation, LookupError};
use crate::roles::RoleClass;
use crate::token::IdTokenVerifier;
use crate::types::SessionId;
use crate::well_known::ToolKeySet;

/// Assemble the tool: LTI endpoints, dashboards, and the `/api` routes.
///
/// The session store and gateway are shared so that the caller can keep a
/// handle, e.g. for periodic session purging.
pub fn app<S, G>(config: ToolConfig, sessions: Arc<S>, gateway: Arc<G>) -> Router
where
    S: SessionStore,
    G: ProgressGateway,
{
    let keys = KeySetCache::new(config.http)
        .with_ttl(config.jwks_ttl)
        .with_min_refresh_interval(config.jwks_refresh_interval);
    let verifier = IdTokenVerifier::new(Arc::new(keys)).with_clock_skew(config.clock_skew);

    let state = AppState {
        registry: Arc::new(config.registry),
        verifier,
        sessions,
        gateway,
        settings: Arc::new(config.settings),
    };

    let student_dashboard = state.settings.student_dashboard.clone();
    let admin_dashboard = state.settings.admin_dashboard.clone();
    let landing_page = state.settings.landing_page.clone();

    Router::new()
        .route("/lti/login", get(login_query::<S, G>).post(login_form::<S, G>))
        .route("/lti/launch", post(launch::<S, G>))
        .route("/lti/logout", post(logout::<S, G>))
        .route("/lti/health", get(health::<S, G>))
        .route("/.well-known/jwks.json", get(jwks))
        .route(&landing_page, get(landing))
        .route(&student_dashboard, get(student_dashboard_page::<S, G>))
        .route(&admin_dashboard, get(admin_dashboard_page::<S, G>))
        .merge(api::routes::<S, G>())
        .with_state(state)
}

// ── Login ──────────────────────────────────────────────────────────

async fn login_query<S: SessionStore, G: ProgressGateway>(
    State(state): State<AppState<S, G>>,
    jar: PrivateCookieJar,
    params: Result<Query<LoginInitiation>, QueryRejection>,
) -> Result<(PrivateCookieJar, Response), LtiError> {
    let Query(params) = params.map_err(|e| {
        tracing::warn!(error = %e, "Unreadable login initiation query");
        LtiError::MissingParameter("iss")
    })?;
    initiate_login(state, jar, params).await
}

async fn login_form<S: SessionStore, G: ProgressGateway>(
    State(state): State<AppState<S, G>>,
    jar: PrivateCookieJar,
    params: Result<Form<LoginInitiation>, FormRejection>,
) -> Result<(PrivateCookieJar, Response), LtiError> {
    let Form(params) = params.map_err(|e| {
        tracing::warn!(error = %e, "Unreadable login initiation form");
        LtiError::MissingParameter("iss")
    })?;
    initiate_login(state, jar, params).await
}

async fn initiate_login<S: SessionStore, G: ProgressGateway>(
    state: AppState<S, G>,
    jar: PrivateCookieJar,
    params: LoginInitiation,
) -> Result<(PrivateCookieJar, Response), LtiError> {
    let launch_url = state.settings.ensure_configured()?;

    let issuer = non_empty(params.iss).ok_or(LtiError::MissingParameter("iss"))?;
    let login_hint =
        non_empty(params.login_hint).ok_or(LtiError::MissingParameter("login_hint"))?;
    let client_id = non_empty(params.client_id);

    let registration = state
        .registry
        .resolve(&issuer, client_id.as_deref())
        .map_err(|e| {
            tracing::warn!(issuer = %issuer, error = %e, "Login initiation rejected");
            match e {
                LookupError::AmbiguousClient(_) => LtiError::MissingParameter("client_id"),
                other => LtiError::UnknownClient(other.to_string()),
            }
        })?;

    if let Some(deployment_id) = non_empty(params.lti_deployment_id)
        && deployment_id != registration.deployment_id()
    {
        tracing::warn!(
            issuer = %issuer,
            deployment_id = %deployment_id,
            "Login initiation for unregistered deployment"
        );
        return Err(LtiError::UnknownClient(format!(
            "deployment {deployment_id} is not registered"
        )));
    }

    let message_hint = non_empty(params.lti_message_hint);
    let request =
        registration.authorization_request(launch_url, &login_hint, message_hint.as_deref());

    if let Some(previous) = cookies::session_id(&jar, &state.settings.session_cookie_name)
        && let Err(e) = state.sessions.destroy(&previous).await
    {
        tracing::warn!(error = %e, "Session deletion failed during login");
    }

    let session_id = SessionId::generate();
    let pending = LaunchSession {
        state: request.state,
        nonce: request.nonce,
        login_hint,
        message_hint,
        issuer: registration.issuer().to_owned(),
        client_id: registration.client_id().to_owned(),
        issued_at: OffsetDateTime::now_utc(),
    };
    state
        .sessions
        .set(&session_id, SessionUpdate::BeginLaunch(pending))
        .await
        .map_err(|e| LtiError::Store(e.to_string()))?;

    let cookie = cookies::session_cookie(
        &state.settings.session_cookie_name,
        &session_id,
        state.settings.launch_ttl,
        state.settings.secure_cookies,
    );

    tracing::info!(
        issuer = %registration.issuer(),
        client_id = %registration.client_id(),
        session = %session_id.redacted(),
        "OIDC login initiated"
    );

    Ok((jar.add(cookie), found(&request.url)))
}

// ── Launch ─────────────────────────────────────────────────────────

async fn launch<S: SessionStore, G: ProgressGateway>(
    State(state): State<AppState<S, G>>,
    jar: PrivateCookieJar,
    form: Result<Form<LaunchForm>, FormRejection>,
) -> Result<(PrivateCookieJar, Redirect), LtiError> {
    state.settings.ensure_configured()?;
    let Form(form) = form.map_err(|e| {
        tracing::warn!(error = %e, "Unreadable launch form");
        LtiError::MissingToken
    })?;

    let previous = cookies::session_id(&jar, &state.settings.session_cookie_name);
    let pending = match &previous {
        Some(id) => state
            .sessions
            .take_launch(id)
            .await
            .map_err(|e| LtiError::Store(e.to_string()))?,
        None => None,
    };

    let user = validate_launch(
        &state.verifier,
        &state.registry,
        pending,
        &form,
        state.settings.launch_ttl,
    )
    .await?;

    if let Some(previous) = &previous
        && let Err(e) = state.sessions.destroy(previous).await
    {
        tracing::warn!(error = %e, "Pre-launch session deletion failed");
    }

    let session_id = SessionId::generate();
    let destination = match user.role {
        RoleClass::Instructor => state.settings.admin_dashboard.clone(),
        RoleClass::Learner => state.settings.student_dashboard.clone(),
        RoleClass::Unknown => state.settings.landing_page.clone(),
    };

    tracing::info!(
        subject = %user.subject,
        role = %user.role,
        session = %session_id.redacted(),
        "LTI launch authenticated"
    );

    state
        .sessions
        .set(&session_id, SessionUpdate::Authenticate(user))
        .await
        .map_err(|e| LtiError::Store(e.to_string()))?;

    let cookie = cookies::session_cookie(
        &state.settings.session_cookie_name,
        &session_id,
        state.settings.session_ttl,
        state.settings.secure_cookies,
    );

    Ok((jar.add(cookie), Redirect::to(&destination)))
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<S: SessionStore, G: ProgressGateway>(
    State(state): State<AppState<S, G>>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Redirect) {
    if let Some(session_id) = cookies::session_id(&jar, &state.settings.session_cookie_name) {
        if let Err(e) = state.sessions.destroy(&session_id).await {
            tracing::warn!(error = %e, "Session deletion failed during logout");
        } else {
            tracing::info!(session = %session_id.redacted(), "Logged out");
        }
    }

    let clear_cookie = cookies::clear_session_cookie(&state.settings.session_cookie_name);
    (jar.remove(clear_cookie), Redirect::to(&state.settings.landing_page))
}

// ── Discovery ──────────────────────────────────────────────────────

async fn jwks() -> Json<ToolKeySet> {
    Json(ToolKeySet::empty())
}

async fn health<S: SessionStore, G: ProgressGateway>(
    State(state): State<AppState<S, G>>,
) -> Json<JsonValue> {
    let settings = &state.settings;
    let configured = settings.ensure_configured().is_ok();
    Json(json!({
        "status": "ok",
        "configured": configured,
        "missing": settings.missing,
        "registrations": state.registry.len(),
        "launchUrl": settings.launch_url.as_ref().map(url::Url::as_str),
        "endpoints": {
            "login": "/lti/login",
            "launch": "/lti/launch",
            "jwks": "/.well-known/jwks.json"
        }
    }))
}

// ── Pages ──────────────────────────────────────────────────────────

async fn landing() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

async fn student_dashboard_page<S: SessionStore, G: ProgressGateway>(
    _user: AuthUser,
) -> Html<&'static str> {
    Html(STUDENT_DASHBOARD)
}

async fn admin_dashboard_page<S: SessionStore, G: ProgressGateway>(
    user: AuthUser,
) -> Result<Html<&'static str>, LtiError> {
    if user.user.role != RoleClass::Instructor {
        tracing::warn!(
            subject = %user.user.subject,
            role = %user.user.role,
            "Admin dashboard denied"
        );
        return Err(LtiError::Forbidden);
    }
    Ok(Html(ADMIN_DASHBOARD))
}

const LANDING_PAGE: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>Learning units</title></head>
<body><main><h1>Learning units</h1>
<p>Open this tool from your course to get started.</p></main></body></html>
"#;

const STUDENT_DASHBOARD: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>Student dashboard</title></head>
<body><div id="root" data-view="student" data-units="/api/student/units"
  data-unit-content="/api/unit/{unitId}/content" data-user="/api/user"></div></body></html>
"#;

const ADMIN_DASHBOARD: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>Instructor dashboard</title></head>
<body><div id="root" data-view="admin" data-user="/api/user"></div></body></html>
"#;

// ── Helpers ────────────────────────────────────────────────────────

/// `302 Found`; login initiation must not use `303`.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
