//! Fire-and-forget audit events for login, rejected login, and logout.
//!
//! Durable persistence is someone else's job; this module only defines the
//! event model, the sink interface, and a tracing-backed sink. Sinks must
//! never fail the calling operation.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use ulid::Ulid;

use crate::principal::PrincipalKind;
use crate::token::unix_now;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Login,
    LoginRejected,
    Logout,
}

/// One auth lifecycle event.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub id: String,
    pub at: i64,
    pub kind: AuditKind,
    pub principal: PrincipalKind,
    pub principal_id: i64,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    fn base(kind: AuditKind, principal: PrincipalKind, principal_id: i64, subject: &str) -> Self {
        Self {
            id: Ulid::new().to_string(),
            at: unix_now(),
            kind,
            principal,
            principal_id,
            subject: subject.to_string(),
            session_id: None,
            reason: None,
        }
    }

    #[must_use]
    pub fn login(
        principal: PrincipalKind,
        principal_id: i64,
        subject: &str,
        session_id: &str,
    ) -> Self {
        let mut event = Self::base(AuditKind::Login, principal, principal_id, subject);
        event.session_id = Some(session_id.to_string());
        event
    }

    #[must_use]
    pub fn login_rejected(
        principal: PrincipalKind,
        principal_id: i64,
        subject: &str,
        reason: &str,
    ) -> Self {
        let mut event = Self::base(AuditKind::LoginRejected, principal, principal_id, subject);
        event.reason = Some(reason.to_string());
        event
    }

    #[must_use]
    pub fn logout(
        principal: PrincipalKind,
        principal_id: i64,
        subject: &str,
        session_id: &str,
    ) -> Self {
        let mut event = Self::base(AuditKind::Logout, principal, principal_id, subject);
        event.session_id = Some(session_id.to_string());
        event
    }
}

/// Receives auth lifecycle events. Implementations swallow their own
/// failures; recording is best-effort by contract.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Sink that emits structured log events, for deployments where the log
/// pipeline is the audit trail.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl AuditSink for TracingSink {
    async fn record(&self, event: AuditEvent) {
        match event.kind {
            AuditKind::Login => info!(
                id = %event.id,
                principal = %event.principal,
                principal_id = event.principal_id,
                session_id = event.session_id.as_deref().unwrap_or(""),
                "login"
            ),
            AuditKind::LoginRejected => warn!(
                id = %event.id,
                principal = %event.principal,
                principal_id = event.principal_id,
                reason = event.reason.as_deref().unwrap_or(""),
                "login rejected"
            ),
            AuditKind::Logout => info!(
                id = %event.id,
                principal = %event.principal,
                principal_id = event.principal_id,
                session_id = event.session_id.as_deref().unwrap_or(""),
                "logout"
            ),
        }
    }
}

/// Capturing sink for tests.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().await.push(event);
    }
}
