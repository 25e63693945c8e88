//! Shared harness for the router-level integration tests.
//!
//! The platform is a wiremock server publishing a JWKS; tokens are signed
//! with the RSA fixtures in `tests/fixtures/`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use http_body_util::BodyExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use lti_tool::middleware::{CookieKey, ProgressGateway, ToolConfig, app};
use lti_tool::progress::{ProgressReceipt, ProgressRecord, Unit, UnitContent, UnitProgress};
use lti_tool::session::MemorySessionStore;
use lti_tool::{PlatformRegistration, PlatformRegistry};
use serde_json::{Value as JsonValue, json};
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ISSUER: &str = "https://platform.example";
pub const CLIENT_ID: &str = "known-id";
pub const DEPLOYMENT_ID: &str = "deployment-1";
pub const PLATFORM_KID: &str = "platform-key-1";
pub const ROTATED_KID: &str = "platform-key-2";
pub const SESSION_COOKIE: &str = "__lti_session";
pub const JWKS_PATH: &str = "/jwks";

pub const LEARNER: &str = "http://purl.imsglobal.org/vocab/lis/v2/membership#Learner";
pub const INSTRUCTOR: &str = "http://purl.imsglobal.org/vocab/lis/v2/membership#Instructor";

const PLATFORM_PRIVATE_PEM: &str = include_str!("../fixtures/platform_rsa_private.pem");
const ROTATED_PRIVATE_PEM: &str = include_str!("../fixtures/rogue_rsa_private.pem");
const PLATFORM_MODULUS: &str = concat!(
    "6MMmdAhmfxIVFfJgp6B3fp_Ik7qjeBHn-F3pXrKaCcLCYFdM7eU_MbpfHcP9KXU6kSuEmeTpkI0AlM2k",
    "PP6mcxu28kfU4ruqb68j0ADQn04wF9RnGq0oGK5uQ7m8AN_04TfvQ9SzaLjYMntFlS8EhIxd16i1lP4K",
    "ckIYh3s_tnExDcFIRxjzCdzVDvcuIcu9wSrMhAoZsAuVSiUzHe-rswx9-KimhNh43UFGrzOSthOgoz4e",
    "R3oUhlmdyueKavjVQ33NpcKX0Pa1jN4oA33GSGlZ2_1IIDpnQbE9JrVe1UTn6VUsI99Bs5Fylb76148Z",
    "hA4--yB0YJJ4eHW1RC2UyQ",
);
const ROTATED_MODULUS: &str = concat!(
    "lNEJU18-129PE9e7RQ9cr297suQrgEwZwW94edy6ZRnNb_GgGRcZ9KgRytXIfh_00bijqNDIppHKk2N1",
    "unhCCxo4inUTcGKISwgpLiUGuCaPl3p_OvSTN7BwWKmwUPhmwY3u-ouDe8sL3u2o1ULrPp9g3DpJLIPh",
    "VfIpL9AyVbDBJIgExlYClsT88BmiObdbBkkP-GXqnGbaFJBain14zJOlKWiGV5uayTJXmL3jvfdvYR--",
    "YAEjQoviNhFUEdH8nnaeBRkUuuxfOqobWtJ-u7JR8P3nFnE7cRC9LS_hvUux144xYbE2g6EXPAvVrRAW",
    "4Se7UckGXVn1orjyViQq-w",
);

// ── Keys and tokens ────────────────────────────────────────────────

fn rsa_jwk(kid: &str, modulus: &str) -> JsonValue {
    json!({ "kty": "RSA", "kid": kid, "use": "sig", "alg": "RS256", "n": modulus, "e": "AQAB" })
}

/// JWKS publishing only the original platform key.
pub fn platform_jwks() -> JsonValue {
    json!({ "keys": [rsa_jwk(PLATFORM_KID, PLATFORM_MODULUS)] })
}

/// JWKS after rotation: the new key is published alongside the old one.
pub fn rotated_jwks() -> JsonValue {
    json!({
        "keys": [
            rsa_jwk(PLATFORM_KID, PLATFORM_MODULUS),
            rsa_jwk(ROTATED_KID, ROTATED_MODULUS)
        ]
    })
}

fn sign_with(pem: &str, claims: &JsonValue, kid: &str) -> String {
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &key).unwrap()
}

pub fn sign(claims: &JsonValue) -> String {
    sign_with(PLATFORM_PRIVATE_PEM, claims, PLATFORM_KID)
}

/// Token from the key published only after rotation.
pub fn sign_rotated(claims: &JsonValue) -> String {
    sign_with(ROTATED_PRIVATE_PEM, claims, ROTATED_KID)
}

/// Token from a key the platform never published, presented under the platform kid.
pub fn sign_forged(claims: &JsonValue) -> String {
    sign_with(ROTATED_PRIVATE_PEM, claims, PLATFORM_KID)
}

pub fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

pub fn launch_claims(nonce: &str, roles: &[&str]) -> JsonValue {
    json!({
        "iss": ISSUER,
        "aud": CLIENT_ID,
        "sub": "u1",
        "iat": now(),
        "exp": now() + 300,
        "nonce": nonce,
        "name": "Ada Lovelace",
        "https://purl.imsglobal.org/spec/lti/claim/message_type": "LtiResourceLinkRequest",
        "https://purl.imsglobal.org/spec/lti/claim/version": "1.3.0",
        "https://purl.imsglobal.org/spec/lti/claim/deployment_id": DEPLOYMENT_ID,
        "https://purl.imsglobal.org/spec/lti/claim/roles": roles,
        "https://purl.imsglobal.org/spec/lti/claim/context": {
            "id": "course-42",
            "label": "MATH101"
        },
        "https://purl.imsglobal.org/spec/lti/claim/resource_link": {
            "id": "link-7",
            "title": "Units"
        }
    })
}

// ── Fake content store ─────────────────────────────────────────────

#[derive(Default)]
pub struct FakeGateway {
    pub units: Vec<Unit>,
    pub progress: HashMap<String, UnitProgress>,
    pub fail: bool,
    pub recorded: Mutex<Vec<ProgressRecord>>,
}

#[derive(Debug, thiserror::Error)]
#[error("content store unavailable")]
pub struct Unavailable;

impl FakeGateway {
    pub fn with_units(count: usize) -> Self {
        let units = (1..=count)
            .map(|i| Unit {
                id: format!("unit-{i}"),
                title: format!("Unit {i}"),
                description: String::new(),
                unit_type: "lesson".into(),
                duration: 30,
                difficulty: None,
                order: i as i64,
                content: vec![json!({ "type": "text", "body": format!("Body {i}") })],
            })
            .collect();
        Self {
            units,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

impl ProgressGateway for FakeGateway {
    async fn course_units(
        &self,
        _course_id: &str,
    ) -> Result<Vec<Unit>, Box<dyn std::error::Error + Send + Sync>> {
        if self.fail {
            return Err(Box::new(Unavailable));
        }
        Ok(self.units.clone())
    }

    async fn student_progress(
        &self,
        _student_id: &str,
        _course_id: &str,
    ) -> Result<HashMap<String, UnitProgress>, Box<dyn std::error::Error + Send + Sync>> {
        if self.fail {
            return Err(Box::new(Unavailable));
        }
        Ok(self.progress.clone())
    }

    async fn record_progress(
        &self,
        record: ProgressRecord,
    ) -> Result<ProgressReceipt, Box<dyn std::error::Error + Send + Sync>> {
        if self.fail {
            return Err(Box::new(Unavailable));
        }
        let mut recorded = self.recorded.lock().unwrap();
        recorded.push(record);
        Ok(ProgressReceipt {
            success: true,
            record_id: Some(recorded.len().to_string()),
        })
    }

    async fn unit_content(
        &self,
        unit_id: &str,
    ) -> Result<Option<UnitContent>, Box<dyn std::error::Error + Send + Sync>> {
        if self.fail {
            return Err(Box::new(Unavailable));
        }
        Ok(self.units.iter().find(|u| u.id == unit_id).map(|unit| UnitContent {
            unit: unit.clone(),
            structure: Some(json!({ "layout": "single" })),
        }))
    }
}

// ── Harness ────────────────────────────────────────────────────────

pub struct TestTool {
    pub router: Router,
    pub platform: MockServer,
    pub gateway: Arc<FakeGateway>,
}

impl TestTool {
    pub async fn start() -> Self {
        Self::with_gateway(FakeGateway::with_units(3)).await
    }

    pub async fn with_gateway(gateway: FakeGateway) -> Self {
        let platform = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(platform_jwks()))
            .mount(&platform)
            .await;
        Self::with_platform(platform, gateway)
    }

    /// Tool whose registration points at an already configured mock platform.
    pub fn with_platform(platform: MockServer, gateway: FakeGateway) -> Self {
        Self::with_config(platform, gateway, |config| config)
    }

    /// Like [`TestTool::with_platform`], with extra settings applied to the config.
    pub fn with_config(
        platform: MockServer,
        gateway: FakeGateway,
        configure: impl FnOnce(ToolConfig) -> ToolConfig,
    ) -> Self {
        let registry = PlatformRegistry::new()
            .with(registration(&platform))
            .unwrap();
        let config = configure(
            ToolConfig::new(registry, &"https://tool.example".parse().unwrap())
                .with_cookie_key(CookieKey::generate()),
        );
        let gateway = Arc::new(gateway);
        let router = app(
            config,
            Arc::new(MemorySessionStore::new()),
            gateway.clone(),
        );
        Self {
            router,
            platform,
            gateway,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// POST `/lti/login` and return the session cookie, `state` and `nonce`.
    pub async fn login(&self) -> Login {
        let response = self
            .send(form_post(
                "/lti/login",
                None,
                &format!("iss={ISSUER}&login_hint=abc&client_id={CLIENT_ID}"),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        let params = redirect_params(&response);
        Login {
            cookie: session_cookie(&response).expect("login sets a session cookie"),
            state: params["state"].clone(),
            nonce: params["nonce"].clone(),
        }
    }

    pub async fn launch(
        &self,
        cookie: Option<&str>,
        id_token: &str,
        state: &str,
    ) -> Response<Body> {
        let body = format!("id_token={id_token}&state={}", urlencode(state));
        self.send(form_post("/lti/launch", cookie, &body)).await
    }

    /// Full login + launch as a learner; returns the authenticated session cookie.
    pub async fn authenticated(&self, roles: &[&str]) -> String {
        let login = self.login().await;
        let token = sign(&launch_claims(&login.nonce, roles));
        let response = self.launch(Some(&login.cookie), &token, &login.state).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        session_cookie(&response).expect("launch sets a session cookie")
    }
}

pub struct Login {
    pub cookie: String,
    pub state: String,
    pub nonce: String,
}

pub fn registration(platform: &MockServer) -> PlatformRegistration {
    PlatformRegistration::new(
        ISSUER,
        CLIENT_ID,
        DEPLOYMENT_ID,
        "https://platform.example/auth".parse().unwrap(),
        format!("{}{JWKS_PATH}", platform.uri()).parse().unwrap(),
    )
}

// ── Requests and responses ─────────────────────────────────────────

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn form_post(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn json_post(uri: &str, cookie: Option<&str>, body: &JsonValue) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// `name=value` of the session cookie set by `response`, ready for a `Cookie` header.
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{SESSION_COOKIE}=")))
        .and_then(|v| v.split(';').next())
        .map(str::to_owned)
}

/// Raw `Set-Cookie` header for the session cookie.
pub fn session_set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{SESSION_COOKIE}=")))
        .map(str::to_owned)
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("location header")
        .to_str()
        .unwrap()
        .to_string()
}

pub fn redirect_params(response: &Response<Body>) -> HashMap<String, String> {
    Url::parse(&location(response))
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

pub async fn json_body(response: Response<Body>) -> (StatusCode, JsonValue) {
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    let json: JsonValue = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
    (status, json)
}

/// Percent-encode a form value.
pub fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
