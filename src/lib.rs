#![doc = include_str!("../README.md")]

pub mod claims;
pub mod error;
pub mod jwks;
pub mod middleware;
pub mod nonce;
pub mod progress;
pub mod registration;
pub mod roles;
pub mod session;
pub mod token;
pub mod types;
pub mod well_known;
#[cfg(feature = "wordpress")]
pub mod wordpress;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use claims::{ClaimError, CourseContext, LaunchClaims, ResourceLink};
pub use error::Error;
pub use jwks::KeySetCache;
pub use nonce::{generate_nonce, generate_state};
pub use registration::{
    AuthorizationRequest, LoginInitiation, LookupError, PlatformRegistration, PlatformRegistry,
};
pub use roles::{RoleClass, classify_role, classify_roles};
pub use token::{
    IdTokenVerifier, TokenExpectations, VerificationError, VerifiedClaims, extract_kid_from_token,
};
pub use types::{KeyId, SessionId};
pub use well_known::ToolKeySet;
