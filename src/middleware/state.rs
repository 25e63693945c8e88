use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use super::config::ToolSettings;
use super::traits::{ProgressGateway, SessionStore};
use crate::registration::PlatformRegistry;
use crate::token::IdTokenVerifier;

/// Shared state for the LTI routes and APIs.
pub struct AppState<S, G> {
    pub(super) registry: Arc<PlatformRegistry>,
    pub(super) verifier: IdTokenVerifier,
    pub(super) sessions: Arc<S>,
    pub(super) gateway: Arc<G>,
    pub(super) settings: Arc<ToolSettings>,
}

// Manual Clone: avoid derive adding `S: Clone, G: Clone` bounds.
impl<S, G> Clone for AppState<S, G> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            verifier: self.verifier.clone(),
            sessions: self.sessions.clone(),
            gateway: self.gateway.clone(),
            settings: self.settings.clone(),
        }
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl<S: SessionStore, G: ProgressGateway> FromRef<AppState<S, G>> for Key {
    fn from_ref(state: &AppState<S, G>) -> Self {
        state.settings.cookie_key.clone()
    }
}
