//! In-memory session store for tests and single-node deployments.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{hash_map::Entry, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::SessionStore;

struct Slot {
    value: String,
    expires_at: Instant,
}

impl Slot {
    fn expired(&self) -> bool {
        self.expires_at <= Instant::now()
    }
}

/// Mutex-guarded map with lazy expiry. Atomicity of `put_if_absent` falls
/// out of holding the lock across the check and the insert.
#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut slots = self.slots.lock().await;
        slots.retain(|_, slot| !slot.expired());
        match slots.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    value: value.to_string(),
                    expires_at: Instant::now() + ttl,
                });
                Ok(true)
            }
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut slots = self.slots.lock().await;
        slots.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let slots = self.slots.lock().await;
        Ok(slots
            .get(key)
            .filter(|slot| !slot.expired())
            .map(|slot| slot.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut slots = self.slots.lock().await;
        slots.remove(key);
        Ok(())
    }
}
