//! Axum integration: LTI login/launch routes, session handling, and the
//! student progress API.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use lti_tool::middleware::{ToolConfig, app};
//! use lti_tool::session::MemorySessionStore;
//! use lti_tool::wordpress::WordPressGateway;
//!
//! let config = ToolConfig::from_env()?;
//! let router = app(
//!     config,
//!     Arc::new(MemorySessionStore::new()),
//!     Arc::new(WordPressGateway::from_env()?),
//! );
//! ```

mod api;
mod config;
mod cookies;
mod error;
mod extractor;
mod launch;
mod routes;
mod state;
mod traits;
mod types;

pub use config::ToolConfig;
pub use error::LtiError;
pub use extractor::AuthUser;
pub use launch::{LaunchForm, validate_launch};
pub use routes::app;
pub use state::AppState;
pub use traits::{ProgressGateway, SessionStore};
pub use types::{AuthenticatedSession, LaunchSession, SessionData, SessionUpdate};

/// Re-export cookie key type for builder API.
pub use axum_extra::extract::cookie::Key as CookieKey;
