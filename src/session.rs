//! In-process session store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::middleware::{LaunchSession, SessionData, SessionStore, SessionUpdate};
use crate::types::SessionId;

/// Default lifetime of a session.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// Default lifetime of a session that only holds a pending launch.
pub const DEFAULT_LAUNCH_TTL: Duration = Duration::from_secs(10 * 60);

struct Entry {
    data: SessionData,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// [`SessionStore`] backed by a map in process memory.
///
/// Authenticated sessions expire `ttl` after their last update. A session
/// that only holds a pending launch expires after `launch_ttl`, so abandoned
/// logins do not linger for a full session lifetime. Expired entries are
/// invisible immediately and reclaimed by [`purge_expired`](Self::purge_expired).
/// Contents do not survive a restart.
pub struct MemorySessionStore {
    ttl: Duration,
    launch_ttl: Duration,
    entries: RwLock<HashMap<SessionId, Entry>>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ttl: DEFAULT_SESSION_TTL,
            launch_ttl: DEFAULT_LAUNCH_TTL,
            entries: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_launch_ttl(mut self, launch_ttl: Duration) -> Self {
        self.launch_ttl = launch_ttl;
        self
    }

    /// Drop expired sessions. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = entries.len(), "Purged expired sessions");
        }
        removed
    }

    /// Number of stored sessions, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl SessionStore for MemorySessionStore {
    async fn get(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionData>, Box<dyn std::error::Error + Send + Sync>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(session_id)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.data.clone()))
    }

    async fn set(
        &self,
        session_id: &SessionId,
        update: SessionUpdate,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let entry = entries.entry(session_id.clone()).or_insert_with(|| Entry {
            data: SessionData::default(),
            expires_at: now,
        });
        if !entry.is_live(now) {
            entry.data = SessionData::default();
        }
        match update {
            SessionUpdate::BeginLaunch(launch) => entry.data.launch = Some(launch),
            SessionUpdate::Authenticate(user) => entry.data.user = Some(user),
        }
        let ttl = if entry.data.user.is_some() {
            self.ttl
        } else {
            self.launch_ttl
        };
        entry.expires_at = now + ttl;
        Ok(())
    }

    async fn take_launch(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<LaunchSession>, Box<dyn std::error::Error + Send + Sync>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Ok(entries
            .get_mut(session_id)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.data.launch.take()))
    }

    async fn destroy(
        &self,
        session_id: &SessionId,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.entries.write().await.remove(session_id);
        Ok(())
    }
}

impl std::fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySessionStore")
            .field("ttl", &self.ttl)
            .field("launch_ttl", &self.launch_ttl)
            .finish_non_exhaustive()
    }
}
