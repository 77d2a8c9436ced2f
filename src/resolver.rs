//! Decoded-token → principal entity resolution.
//!
//! Dispatches on the claim's principal kind, fetches the entity through the
//! directory, and applies liveness checks. Every internal distinction
//! (missing row, deactivated account, no credential on record) collapses to
//! the same opaque [`Error::AuthenticationFailure`] so callers cannot probe
//! which accounts exist.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::directory::{DeviceRecord, Directory, HumanRecord};
use crate::error::Error;
use crate::principal::PrincipalKind;
use crate::token::Claims;

/// A live, session-validated principal with its entity data.
#[derive(Clone, Debug)]
pub enum ResolvedPrincipal {
    User(HumanRecord),
    Admin(HumanRecord),
    Manager(HumanRecord),
    Device(DeviceRecord),
}

impl ResolvedPrincipal {
    #[must_use]
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Self::User(_) => PrincipalKind::User,
            Self::Admin(_) => PrincipalKind::Admin,
            Self::Manager(_) => PrincipalKind::Manager,
            Self::Device(_) => PrincipalKind::Device,
        }
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        match self {
            Self::User(record) | Self::Admin(record) | Self::Manager(record) => record.id,
            Self::Device(record) => record.id,
        }
    }
}

/// Resolves decoded claims into entities, with directory calls bounded by a
/// timeout that fails closed.
pub struct PrincipalResolver {
    directory: Arc<dyn Directory>,
    timeout: Duration,
}

impl PrincipalResolver {
    #[must_use]
    pub fn new(directory: Arc<dyn Directory>, timeout: Duration) -> Self {
        Self { directory, timeout }
    }

    /// Resolve session-validated claims to a live principal.
    ///
    /// # Errors
    ///
    /// [`Error::AuthenticationFailure`] for any principal that is missing,
    /// deactivated, or unprovisioned; [`Error::StoreUnavailable`] if the
    /// directory is unreachable.
    pub async fn resolve(&self, claims: &Claims) -> Result<ResolvedPrincipal, Error> {
        match claims.kind {
            PrincipalKind::User => {
                let record = self.live_human(claims).await?;
                Ok(ResolvedPrincipal::User(record))
            }
            PrincipalKind::Admin => {
                let record = self.live_human(claims).await?;
                Ok(ResolvedPrincipal::Admin(record))
            }
            PrincipalKind::Manager => {
                let record = self.live_human(claims).await?;
                Ok(ResolvedPrincipal::Manager(record))
            }
            PrincipalKind::Device => {
                let record = self
                    .fail_closed(self.directory.find_device(claims.id))
                    .await?;
                let Some(record) = record else {
                    debug!(id = claims.id, "token references a missing device");
                    return Err(Error::AuthenticationFailure);
                };
                if !record.active {
                    debug!(id = claims.id, "token references a deactivated device");
                    return Err(Error::AuthenticationFailure);
                }
                if record.key.is_none() {
                    debug!(id = claims.id, "token references an unprovisioned device");
                    return Err(Error::AuthenticationFailure);
                }
                Ok(ResolvedPrincipal::Device(record))
            }
        }
    }

    async fn live_human(&self, claims: &Claims) -> Result<HumanRecord, Error> {
        let record = self
            .fail_closed(self.directory.find_human(claims.kind, claims.id))
            .await?;
        let Some(record) = record else {
            debug!(kind = %claims.kind, id = claims.id, "token references a missing principal");
            return Err(Error::AuthenticationFailure);
        };
        if !record.active {
            debug!(kind = %claims.kind, id = claims.id, "token references a deactivated principal");
            return Err(Error::AuthenticationFailure);
        }
        if record.password_hash.is_none() {
            debug!(kind = %claims.kind, id = claims.id, "principal has no credential record");
            return Err(Error::AuthenticationFailure);
        }
        Ok(record)
    }

    async fn fail_closed<T>(
        &self,
        op: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, Error> {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                error!("directory lookup failed: {err:#}");
                Err(Error::StoreUnavailable)
            }
            Err(_) => {
                error!(timeout = ?self.timeout, "directory lookup timed out");
                Err(Error::StoreUnavailable)
            }
        }
    }
}
