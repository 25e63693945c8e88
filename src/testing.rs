//! Fixtures shared by unit tests.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value as JsonValue, json};

use crate::claims::{
    CONTEXT_CLAIM, DEPLOYMENT_ID_CLAIM, MESSAGE_TYPE_CLAIM, RESOURCE_LINK_CLAIM,
    RESOURCE_LINK_REQUEST, ROLES_CLAIM, VERSION_CLAIM,
};
use crate::registration::PlatformRegistration;

pub(crate) const ISSUER: &str = "https://platform.example";
pub(crate) const CLIENT_ID: &str = "known-id";
pub(crate) const DEPLOYMENT_ID: &str = "deployment-1";
pub(crate) const PLATFORM_KID: &str = "platform-key-1";
/// Loopback port with nothing listening: fetches fail fast.
pub(crate) const UNREACHABLE_JWKS_URI: &str = "http://127.0.0.1:9/jwks";

pub(crate) const LEARNER: &str = "http://purl.imsglobal.org/vocab/lis/v2/membership#Learner";
pub(crate) const INSTRUCTOR: &str = "http://purl.imsglobal.org/vocab/lis/v2/membership#Instructor";

const PLATFORM_PRIVATE_PEM: &str = include_str!("../tests/fixtures/platform_rsa_private.pem");
const ROGUE_PRIVATE_PEM: &str = include_str!("../tests/fixtures/rogue_rsa_private.pem");
const PLATFORM_MODULUS: &str = concat!(
    "6MMmdAhmfxIVFfJgp6B3fp_Ik7qjeBHn-F3pXrKaCcLCYFdM7eU_MbpfHcP9KXU6kSuEmeTpkI0AlM2k",
    "PP6mcxu28kfU4ruqb68j0ADQn04wF9RnGq0oGK5uQ7m8AN_04TfvQ9SzaLjYMntFlS8EhIxd16i1lP4K",
    "ckIYh3s_tnExDcFIRxjzCdzVDvcuIcu9wSrMhAoZsAuVSiUzHe-rswx9-KimhNh43UFGrzOSthOgoz4e",
    "R3oUhlmdyueKavjVQ33NpcKX0Pa1jN4oA33GSGlZ2_1IIDpnQbE9JrVe1UTn6VUsI99Bs5Fylb76148Z",
    "hA4--yB0YJJ4eHW1RC2UyQ",
);

pub(crate) fn registration() -> PlatformRegistration {
    PlatformRegistration::new(
        ISSUER,
        CLIENT_ID,
        DEPLOYMENT_ID,
        "https://platform.example/auth".parse().unwrap(),
        UNREACHABLE_JWKS_URI.parse().unwrap(),
    )
}

pub(crate) fn platform_jwk_set(kid: &str) -> JwkSet {
    serde_json::from_value(json!({
        "keys": [{
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "alg": "RS256",
            "n": PLATFORM_MODULUS,
            "e": "AQAB"
        }]
    }))
    .unwrap()
}

pub(crate) fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// A complete, valid LTI resource-link launch payload.
pub(crate) fn launch_claims(nonce: &str, roles: &[&str]) -> JsonValue {
    json!({
        "iss": ISSUER,
        "aud": CLIENT_ID,
        "sub": "u1",
        "iat": now(),
        "exp": now() + 300,
        "nonce": nonce,
        "name": "Ada Lovelace",
        "email": "ada@example.edu",
        MESSAGE_TYPE_CLAIM: RESOURCE_LINK_REQUEST,
        VERSION_CLAIM: "1.3.0",
        DEPLOYMENT_ID_CLAIM: DEPLOYMENT_ID,
        ROLES_CLAIM: roles,
        CONTEXT_CLAIM: { "id": "course-42", "label": "MATH101", "title": "Algebra" },
        RESOURCE_LINK_CLAIM: { "id": "link-7", "title": "Unit pathway" }
    })
}

pub(crate) fn sign(claims: &JsonValue, kid: &str) -> String {
    sign_with(PLATFORM_PRIVATE_PEM, claims, kid)
}

pub(crate) fn sign_with_rogue_key(claims: &JsonValue, kid: &str) -> String {
    sign_with(ROGUE_PRIVATE_PEM, claims, kid)
}

fn sign_with(pem: &str, claims: &JsonValue, kid: &str) -> String {
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &key).unwrap()
}
