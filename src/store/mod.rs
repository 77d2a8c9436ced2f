//! Session store interface.
//!
//! The store is the single source of truth for "which session id is live
//! for principal X". It is a plain key/value store with per-key expiry plus
//! one atomic primitive: set-if-absent-with-TTL, which is what makes the
//! login reservation race-free across nodes.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Key/value store with TTLs, consumed by the session coordinator.
///
/// Implementations must make [`put_if_absent`](SessionStore::put_if_absent)
/// single-shot atomic: two concurrent calls for the same absent key must
/// not both return `true`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store `value` under `key` only if `key` holds no unexpired entry.
    /// Returns whether the write happened.
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Store `value` under `key` unconditionally.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Fetch the unexpired value under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
