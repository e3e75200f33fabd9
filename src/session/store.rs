//! Session backend trait and the facade the orchestrator talks to

use super::{MemorySessionStore, RedisSessionStore, SessionRecord};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage backend for session records.
///
/// `load` returns `Ok(None)` for an absent or TTL-expired id; it never
/// resurrects an expired record.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn load(&self, id: &str) -> StoreResult<Option<SessionRecord>>;
    async fn save(&self, id: &str, record: &SessionRecord) -> StoreResult<()>;
    async fn clear(&self, id: &str) -> StoreResult<()>;
    /// All live session ids. Diagnostic only.
    async fn list_ids(&self) -> StoreResult<Vec<String>>;
}

/// Handle on the configured session backend.
///
/// `load` swallows backend failures: the dialogue must always be able to
/// proceed, so a broken backend reads as "no session found". Writes
/// propagate errors so callers can log them.
#[derive(Clone)]
pub struct Sessions {
    backend: Arc<dyn SessionBackend>,
}

impl Sessions {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self { backend }
    }

    /// Select a backend from the environment.
    ///
    /// `CLINIC_USE_REDIS=true` enables the networked backend
    /// (`CLINIC_REDIS_URL`, default `redis://localhost:6379/0`). If Redis
    /// fails to initialize the store falls back to the in-process map for
    /// the rest of the process lifetime; there is no per-call retry.
    pub async fn from_env() -> Self {
        let use_redis = std::env::var("CLINIC_USE_REDIS")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if use_redis {
            let url = std::env::var("CLINIC_REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/0".to_string());
            match RedisSessionStore::connect(&url).await {
                Ok(store) => {
                    tracing::info!("Using Redis session store");
                    return Self::new(Arc::new(store));
                }
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        "Redis init failed, falling back to in-memory session store"
                    );
                }
            }
        } else {
            tracing::info!("Using in-memory session store");
        }

        Self::new(Arc::new(MemorySessionStore::new()))
    }

    /// Load the record for `id`, or a fresh `INIT` record if the id is
    /// unknown, expired, or the backend errored.
    pub async fn load(&self, id: &str) -> SessionRecord {
        match self.backend.load(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(session_id = %id, "no session found, starting fresh");
                SessionRecord::default()
            }
            Err(err) => {
                tracing::warn!(session_id = %id, error = %err, "session load failed, starting fresh");
                SessionRecord::default()
            }
        }
    }

    pub async fn save(&self, id: &str, record: &SessionRecord) -> StoreResult<()> {
        self.backend.save(id, record).await
    }

    pub async fn clear(&self, id: &str) -> StoreResult<()> {
        self.backend.clear(id).await
    }

    pub async fn list_ids(&self) -> StoreResult<Vec<String>> {
        self.backend.list_ids().await
    }
}
