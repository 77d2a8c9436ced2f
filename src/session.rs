//! Single-active-session coordination.
//!
//! Per principal the state machine is NoSession → Active on login and back
//! on logout or TTL expiry. Active → Active is refused: a second login must
//! fail with [`Error::SessionConflict`] instead of silently replacing the
//! first. The reservation step rides on the store's atomic
//! set-if-absent-with-TTL, so two racing logins cannot both pass.
//!
//! Every store call is bounded by a timeout and fails closed: an
//! unreachable store yields [`Error::StoreUnavailable`], never a skipped
//! check.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::error::Error;
use crate::principal::PrincipalKind;
use crate::store::SessionStore;

/// Placeholder stored between `try_acquire` and `record`. It never equals a
/// real session id, so `validate` treats a half-finished login as inactive.
const RESERVED: &str = "__reserved__";

/// Coordinates session records in the store on behalf of login, logout, and
/// token validation.
pub struct SessionCoordinator {
    store: Arc<dyn SessionStore>,
    timeout: Duration,
}

impl SessionCoordinator {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Atomically reserve the session slot for a login attempt.
    ///
    /// # Errors
    ///
    /// [`Error::SessionConflict`] if an unexpired session (or a concurrent
    /// reservation) exists; [`Error::StoreUnavailable`] on store failure.
    pub async fn try_acquire(
        &self,
        kind: PrincipalKind,
        id: i64,
        ttl: Duration,
    ) -> Result<(), Error> {
        let key = kind.session_key(id);
        let reserved = self
            .fail_closed(self.store.put_if_absent(&key, RESERVED, ttl))
            .await?;
        if reserved {
            Ok(())
        } else {
            Err(Error::SessionConflict)
        }
    }

    /// Store the session id minted for a successful login.
    ///
    /// # Errors
    ///
    /// [`Error::StoreUnavailable`] on store failure.
    pub async fn record(
        &self,
        kind: PrincipalKind,
        id: i64,
        session_id: &str,
        ttl: Duration,
    ) -> Result<(), Error> {
        let key = kind.session_key(id);
        self.fail_closed(self.store.put(&key, session_id, ttl)).await
    }

    /// Whether `session_id` is the currently stored session for the
    /// principal. Absence and mismatch are both `false`.
    ///
    /// # Errors
    ///
    /// [`Error::StoreUnavailable`] on store failure.
    pub async fn validate(
        &self,
        kind: PrincipalKind,
        id: i64,
        session_id: &str,
    ) -> Result<bool, Error> {
        let key = kind.session_key(id);
        let stored = self.fail_closed(self.store.get(&key)).await?;
        Ok(stored.as_deref() == Some(session_id))
    }

    /// Drop the session record unconditionally. Idempotent.
    ///
    /// # Errors
    ///
    /// [`Error::StoreUnavailable`] on store failure.
    pub async fn invalidate(&self, kind: PrincipalKind, id: i64) -> Result<(), Error> {
        let key = kind.session_key(id);
        self.fail_closed(self.store.delete(&key)).await
    }

    async fn fail_closed<T>(
        &self,
        op: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, Error> {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                error!("session store operation failed: {err:#}");
                Err(Error::StoreUnavailable)
            }
            Err(_) => {
                error!(timeout = ?self.timeout, "session store operation timed out");
                Err(Error::StoreUnavailable)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SessionCoordinator;
    use crate::error::Error;
    use crate::principal::PrincipalKind;
    use crate::store::{MemoryStore, SessionStore};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(60);

    fn coordinator() -> SessionCoordinator {
        SessionCoordinator::new(Arc::new(MemoryStore::new()), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn second_acquire_conflicts_until_invalidated() {
        let sessions = coordinator();
        sessions.try_acquire(PrincipalKind::User, 7, TTL).await.unwrap();
        assert_eq!(
            sessions.try_acquire(PrincipalKind::User, 7, TTL).await,
            Err(Error::SessionConflict)
        );
        sessions.invalidate(PrincipalKind::User, 7).await.unwrap();
        sessions.try_acquire(PrincipalKind::User, 7, TTL).await.unwrap();
    }

    #[tokio::test]
    async fn acquisition_is_principal_scoped() {
        let sessions = coordinator();
        sessions.try_acquire(PrincipalKind::User, 7, TTL).await.unwrap();
        sessions.try_acquire(PrincipalKind::Admin, 7, TTL).await.unwrap();
        sessions.try_acquire(PrincipalKind::User, 8, TTL).await.unwrap();
    }

    #[tokio::test]
    async fn reservation_is_not_a_valid_session() {
        let sessions = coordinator();
        sessions.try_acquire(PrincipalKind::User, 7, TTL).await.unwrap();
        assert!(!sessions
            .validate(PrincipalKind::User, 7, "anything")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn validate_matches_only_recorded_id() {
        let sessions = coordinator();
        sessions.try_acquire(PrincipalKind::Device, 3, TTL).await.unwrap();
        sessions.record(PrincipalKind::Device, 3, "s1", TTL).await.unwrap();
        assert!(sessions.validate(PrincipalKind::Device, 3, "s1").await.unwrap());
        assert!(!sessions.validate(PrincipalKind::Device, 3, "s2").await.unwrap());
    }

    #[tokio::test]
    async fn invalidate_revokes_immediately_and_is_idempotent() {
        let sessions = coordinator();
        sessions.try_acquire(PrincipalKind::User, 7, TTL).await.unwrap();
        sessions.record(PrincipalKind::User, 7, "s1", TTL).await.unwrap();
        sessions.invalidate(PrincipalKind::User, 7).await.unwrap();
        assert!(!sessions.validate(PrincipalKind::User, 7, "s1").await.unwrap());
        sessions.invalidate(PrincipalKind::User, 7).await.unwrap();
    }

    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn put_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool> {
            bail!("connection refused")
        }
        async fn put(&self, _: &str, _: &str, _: Duration) -> Result<()> {
            bail!("connection refused")
        }
        async fn get(&self, _: &str) -> Result<Option<String>> {
            bail!("connection refused")
        }
        async fn delete(&self, _: &str) -> Result<()> {
            bail!("connection refused")
        }
    }

    struct StalledStore;

    #[async_trait]
    impl SessionStore for StalledStore {
        async fn put_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(true)
        }
        async fn put(&self, _: &str, _: &str, _: Duration) -> Result<()> {
            Ok(())
        }
        async fn get(&self, _: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn delete(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn store_errors_fail_closed() {
        let sessions = SessionCoordinator::new(Arc::new(BrokenStore), Duration::from_secs(1));
        assert_eq!(
            sessions.try_acquire(PrincipalKind::User, 7, TTL).await,
            Err(Error::StoreUnavailable)
        );
        assert_eq!(
            sessions.validate(PrincipalKind::User, 7, "s1").await,
            Err(Error::StoreUnavailable)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn store_timeouts_fail_closed() {
        let sessions = SessionCoordinator::new(Arc::new(StalledStore), Duration::from_millis(100));
        assert_eq!(
            sessions.try_acquire(PrincipalKind::User, 7, TTL).await,
            Err(Error::StoreUnavailable)
        );
    }
}
