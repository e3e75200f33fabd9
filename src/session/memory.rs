//! In-process session backend (default)

use super::{SessionBackend, SessionRecord, StoreResult, SESSION_TTL};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Volatile map of session records with lazy TTL expiry.
///
/// Expiry is checked on `load` only; an expired-but-unread record is not
/// reclaimed until its key is next read. There is no background sweep.
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, SessionRecord>>,
    ttl: chrono::Duration,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_ttl(SESSION_TTL)
    }

    /// Build a store with a custom TTL. Used by tests to exercise expiry
    /// without waiting out the production window.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionBackend for MemorySessionStore {
    async fn load(&self, id: &str) -> StoreResult<Option<SessionRecord>> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get(id) {
            None => Ok(None),
            Some(record) => {
                if Utc::now().signed_duration_since(record.last_touched) > self.ttl {
                    sessions.remove(id);
                    Ok(None)
                } else {
                    Ok(Some(record.clone()))
                }
            }
        }
    }

    async fn save(&self, id: &str, record: &SessionRecord) -> StoreResult<()> {
        self.sessions
            .lock()
            .unwrap()
            .insert(id.to_string(), record.clone());
        Ok(())
    }

    async fn clear(&self, id: &str) -> StoreResult<()> {
        self.sessions.lock().unwrap().remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> StoreResult<Vec<String>> {
        Ok(self.sessions.lock().unwrap().keys().cloned().collect())
    }
}
