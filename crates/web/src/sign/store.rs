use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::trace;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("app {app} not exist")]
    NotFound { app: String },

    #[error("secret store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl SecretError {
    pub fn not_found<S: ToString>(app: S) -> Self {
        Self::NotFound { app: app.to_string() }
    }

    pub fn unavailable<S: ToString>(reason: S) -> Self {
        Self::Unavailable { reason: reason.to_string() }
    }
}

/// Where the shared secret of a calling application comes from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn app_secret(&self, app: &str) -> Result<String, SecretError>;
}

/// Secrets held in memory, e.g. loaded from configuration at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, String>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_secret(mut self, app: impl Into<String>, secret: impl Into<String>) -> Self {
        self.secrets.insert(app.into(), secret.into());
        self
    }
}

impl<A: Into<String>, S: Into<String>> FromIterator<(A, S)> for StaticSecretStore {
    fn from_iter<T: IntoIterator<Item = (A, S)>>(iter: T) -> Self {
        Self { secrets: iter.into_iter().map(|(app, secret)| (app.into(), secret.into())).collect() }
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn app_secret(&self, app: &str) -> Result<String, SecretError> {
        self.secrets.get(app).cloned().ok_or_else(|| SecretError::not_found(app))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub capacity: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(60), capacity: 1024 }
    }
}

/// Keeps found secrets for `ttl`, at most `capacity` of them. Failed lookups are not kept.
#[derive(Debug)]
pub struct CachedSecretStore<S> {
    inner: S,
    policy: CachePolicy,
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl<S: SecretStore> CachedSecretStore<S> {
    pub fn new(inner: S, policy: CachePolicy) -> Self {
        Self { inner, policy, entries: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl<S: SecretStore> SecretStore for CachedSecretStore<S> {
    async fn app_secret(&self, app: &str) -> Result<String, SecretError> {
        let now = Instant::now();
        if let Some((secret, stored_at)) = self.entries.lock().await.get(app) {
            if now.duration_since(*stored_at) < self.policy.ttl {
                trace!(app, "secret cache hit");
                return Ok(secret.clone());
            }
        }

        let secret = self.inner.app_secret(app).await?;
        if self.policy.capacity == 0 {
            return Ok(secret);
        }

        let mut entries = self.entries.lock().await;
        if entries.len() >= self.policy.capacity && !entries.contains_key(app) {
            let ttl = self.policy.ttl;
            entries.retain(|_, (_, stored_at)| now.duration_since(*stored_at) < ttl);
            if entries.len() >= self.policy.capacity {
                let oldest = entries.iter().min_by_key(|(_, (_, stored_at))| *stored_at).map(|(app, _)| app.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(app.to_string(), (secret.clone(), Instant::now()));
        Ok(secret)
    }
}
