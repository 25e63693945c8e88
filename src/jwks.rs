//! Platform JWKS fetching and caching.
//!
//! Keys are cached per `jwks_uri` and indexed by `kid`:
//!
//! - A cached key set is served for its TTL (default 10 minutes).
//! - A `kid` missing from a fresh key set triggers one refetch, to follow key
//!   rotation. Refetches for the same URI are spaced at least 10 seconds apart.
//! - Any fetch or parse failure is a verification failure (fail closed).
//!
//! No lock is held across the network call. Concurrent misses for the same URI
//! may fetch twice; the last writer wins.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{JwkSet, PublicKeyUse};
use tokio::sync::RwLock;

use crate::token::VerificationError;
use crate::types::KeyId;

/// Default TTL for cached key sets.
pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(600);

/// Timeout for outbound platform calls (connect + response).
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default minimum spacing between kid-miss refetches for one URI.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

struct CachedKeySet {
    keys_by_kid: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

impl CachedKeySet {
    /// Keys without a `kid` or marked for encryption are skipped.
    fn from_jwk_set(key_set: &JwkSet) -> Self {
        let mut keys_by_kid = HashMap::new();
        for jwk in &key_set.keys {
            let Some(kid) = &jwk.common.key_id else {
                continue;
            };
            if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
                continue;
            }
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => {
                    keys_by_kid.insert(kid.clone(), key);
                }
                Err(e) => {
                    tracing::debug!(kid = %kid, error = %e, "Skipping unusable JWK");
                }
            }
        }
        Self {
            keys_by_kid,
            fetched_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

enum Lookup {
    Hit(DecodingKey),
    KidMiss,
    Stale,
}

/// Shared cache of platform signing keys.
pub struct KeySetCache {
    http: reqwest::Client,
    ttl: Duration,
    min_refresh_interval: Duration,
    entries: RwLock<HashMap<String, CachedKeySet>>,
    refresh_attempts: RwLock<HashMap<String, Instant>>,
}

impl KeySetCache {
    /// Create an empty cache. Pass a client built with [`FETCH_TIMEOUT`].
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            ttl: DEFAULT_JWKS_TTL,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            entries: RwLock::new(HashMap::new()),
            refresh_attempts: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Space kid-miss refetches for the same URI at least `interval` apart.
    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Seed the cache with an already known key set. Returns the number of usable keys.
    pub async fn prime(&self, jwks_uri: &str, key_set: &JwkSet) -> usize {
        let entry = CachedKeySet::from_jwk_set(key_set);
        let count = entry.keys_by_kid.len();
        self.entries.write().await.insert(jwks_uri.to_string(), entry);
        count
    }

    /// Drop the cached key set for `jwks_uri`.
    pub async fn invalidate(&self, jwks_uri: &str) {
        self.entries.write().await.remove(jwks_uri);
        tracing::debug!(jwks_uri = %jwks_uri, "JWKS cache entry invalidated");
    }

    /// Resolve the decoding key for `kid`, fetching the key set when needed.
    ///
    /// # Errors
    ///
    /// - [`VerificationError::KeySetUnavailable`] if the key set cannot be fetched or parsed.
    /// - [`VerificationError::UnknownKid`] if the key set has no usable key for `kid`.
    pub async fn decoding_key(
        &self,
        jwks_uri: &str,
        kid: &KeyId,
    ) -> Result<DecodingKey, VerificationError> {
        match self.lookup(jwks_uri, kid).await {
            Lookup::Hit(key) => {
                tracing::debug!(jwks_uri = %jwks_uri, kid = %kid, "JWKS cache hit");
                return Ok(key);
            }
            Lookup::KidMiss => {
                if !self.begin_refresh(jwks_uri).await {
                    tracing::warn!(
                        jwks_uri = %jwks_uri,
                        kid = %kid,
                        "Unknown kid and JWKS refresh rate limited"
                    );
                    return Err(VerificationError::UnknownKid(kid.clone()));
                }
                tracing::info!(jwks_uri = %jwks_uri, kid = %kid, "Unknown kid, refreshing JWKS");
            }
            Lookup::Stale => {
                self.refresh_attempts
                    .write()
                    .await
                    .insert(jwks_uri.to_string(), Instant::now());
            }
        }

        let entry = self.fetch(jwks_uri).await?;
        let key = entry.keys_by_kid.get(kid.0.as_str()).cloned();
        self.entries.write().await.insert(jwks_uri.to_string(), entry);

        key.ok_or_else(|| {
            tracing::warn!(jwks_uri = %jwks_uri, kid = %kid, "kid not present in platform JWKS");
            VerificationError::UnknownKid(kid.clone())
        })
    }

    async fn lookup(&self, jwks_uri: &str, kid: &KeyId) -> Lookup {
        let entries = self.entries.read().await;
        match entries.get(jwks_uri) {
            Some(entry) if entry.is_fresh(self.ttl) => entry
                .keys_by_kid
                .get(kid.0.as_str())
                .cloned()
                .map_or(Lookup::KidMiss, Lookup::Hit),
            _ => Lookup::Stale,
        }
    }

    /// Records a refresh attempt unless one happened within the minimum interval.
    async fn begin_refresh(&self, jwks_uri: &str) -> bool {
        let mut attempts = self.refresh_attempts.write().await;
        let now = Instant::now();
        match attempts.get(jwks_uri) {
            Some(last) if now.duration_since(*last) < self.min_refresh_interval => false,
            _ => {
                attempts.insert(jwks_uri.to_string(), now);
                true
            }
        }
    }

    async fn fetch(&self, jwks_uri: &str) -> Result<CachedKeySet, VerificationError> {
        tracing::info!(jwks_uri = %jwks_uri, "Fetching platform JWKS");

        let response = self.http.get(jwks_uri).send().await.map_err(|e| {
            tracing::error!(jwks_uri = %jwks_uri, error = %e, "JWKS fetch failed");
            VerificationError::KeySetUnavailable(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                jwks_uri = %jwks_uri,
                status = %status,
                "JWKS endpoint returned error status"
            );
            return Err(VerificationError::KeySetUnavailable(format!(
                "JWKS endpoint returned status {status}"
            )));
        }

        let key_set: JwkSet = response.json().await.map_err(|e| {
            tracing::error!(jwks_uri = %jwks_uri, error = %e, "Invalid JWKS document");
            VerificationError::KeySetUnavailable(format!("invalid JWKS document: {e}"))
        })?;

        let entry = CachedKeySet::from_jwk_set(&key_set);
        tracing::info!(
            jwks_uri = %jwks_uri,
            key_count = entry.keys_by_kid.len(),
            "Fetched platform JWKS"
        );
        Ok(entry)
    }
}

impl std::fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetCache")
            .field("ttl", &self.ttl)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .finish_non_exhaustive()
    }
}
