//! Redis-backed session store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::fmt;
use std::time::Duration;
use tracing::info;

use super::SessionStore;

/// Session store over a Redis deployment shared by all nodes.
///
/// `put_if_absent` maps to `SET NX EX`, Redis's native conditional set, so
/// the login reservation is atomic without scripts or transactions.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisStore {
    /// Connect and hand back a store wrapping a self-reconnecting
    /// connection manager.
    ///
    /// # Errors
    ///
    /// Fails if the URL is invalid or the initial connection cannot be
    /// established.
    pub async fn new(redis_url: &str) -> Result<Self> {
        info!("connecting to session store at {redis_url}");
        let client = redis::Client::open(redis_url).context("failed to create redis client")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("failed to connect to redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .context("redis SET NX EX failed")?;
        Ok(reply.is_some())
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn
            .set_ex(key, value, ttl.as_secs())
            .await
            .context("redis SETEX failed")?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.context("redis GET failed")
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn.del(key).await.context("redis DEL failed")?;
        Ok(())
    }
}
