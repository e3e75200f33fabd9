//! Redis-backed session backend

use super::{SessionBackend, SessionRecord, StoreResult, SESSION_TTL};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

const KEY_PREFIX: &str = "session:";

/// Networked session backend.
///
/// Records are stored as JSON under `session:<id>` with the TTL applied on
/// every save, so expiry is enforced by the server itself.
pub struct RedisSessionStore {
    conn: MultiplexedConnection,
}

impl RedisSessionStore {
    /// Connect and verify the server responds.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        tracing::info!(url = %url, "Connected to Redis for session storage");
        Ok(Self { conn })
    }

    fn key(id: &str) -> String {
        format!("{KEY_PREFIX}{id}")
    }
}

#[async_trait]
impl SessionBackend for RedisSessionStore {
    async fn load(&self, id: &str) -> StoreResult<Option<SessionRecord>> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(Self::key(id)).await?;
        match data {
            None => Ok(None),
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        }
    }

    async fn save(&self, id: &str, record: &SessionRecord) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(record)?;
        let () = conn.set_ex(Self::key(id), json, SESSION_TTL.as_secs()).await?;
        Ok(())
    }

    async fn clear(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let () = conn.del(Self::key(id)).await?;
        Ok(())
    }

    async fn list_ids(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(format!("{KEY_PREFIX}*")).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(KEY_PREFIX).map(String::from))
            .collect())
    }
}
