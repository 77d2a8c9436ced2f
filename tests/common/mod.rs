//! Shared fixtures for integration tests: a static in-memory directory and
//! a fully wired service with capturing audit sink.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

use vigilo::{
    AuthConfig, AuthService, DeviceRecord, Directory, HumanRecord, MemorySink, MemoryStore,
    PrincipalKind, PuzzleVerifier,
};

pub const MASTER_SECRET: &str = "integration master secret";

static TRACING: Once = Once::new();

/// Route spans to the test writer, filtered by `RUST_LOG`. Once per binary.
fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vigilo=debug")),
            )
            .with_test_writer()
            .init();
    });
}

/// Directory fake backed by maps; read-only like the real one.
#[derive(Default)]
pub struct StaticDirectory {
    humans: HashMap<(PrincipalKind, i64), HumanRecord>,
    devices: HashMap<i64, DeviceRecord>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_human(mut self, kind: PrincipalKind, record: HumanRecord) -> Self {
        self.humans.insert((kind, record.id), record);
        self
    }

    #[must_use]
    pub fn with_device(mut self, record: DeviceRecord) -> Self {
        self.devices.insert(record.id, record);
        self
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn find_human_by_email(
        &self,
        kind: PrincipalKind,
        email: &str,
    ) -> anyhow::Result<Option<HumanRecord>> {
        Ok(self
            .humans
            .iter()
            .find(|((k, _), record)| *k == kind && record.email == email)
            .map(|(_, record)| record.clone()))
    }

    async fn find_human(
        &self,
        kind: PrincipalKind,
        id: i64,
    ) -> anyhow::Result<Option<HumanRecord>> {
        Ok(self.humans.get(&(kind, id)).cloned())
    }

    async fn find_device(&self, id: i64) -> anyhow::Result<Option<DeviceRecord>> {
        Ok(self.devices.get(&id).cloned())
    }
}

pub fn human(id: i64, email: &str, password: &str) -> HumanRecord {
    HumanRecord {
        id,
        email: email.to_string(),
        password_hash: Some(vigilo::password::hash_password(password).unwrap()),
        active: true,
    }
}

pub fn device(id: i64, key: &[u8], api_key: &str) -> DeviceRecord {
    DeviceRecord {
        id,
        key: Some(key.to_vec()),
        api_key: Some(api_key.to_string()),
        active: true,
    }
}

pub struct Harness {
    pub service: Arc<AuthService>,
    pub audit: Arc<MemorySink>,
    /// Stands in for device firmware when tests need to solve puzzles.
    pub solver: PuzzleVerifier,
}

pub fn harness(directory: StaticDirectory) -> Harness {
    init_tracing();
    let config = AuthConfig::new(MASTER_SECRET.to_string().into());
    let audit = Arc::new(MemorySink::new());
    let solver = PuzzleVerifier::new(config.master_secret());
    let service = Arc::new(AuthService::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(directory),
        audit.clone(),
    ));
    Harness {
        service,
        audit,
        solver,
    }
}
