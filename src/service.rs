//! Login, logout, and authenticated-request orchestration.
//!
//! Login: credential or puzzle check, atomic session reservation, token
//! issuance, session record, audit event. Authenticated request: token
//! decode, session-id match against the store, principal resolution.
//! Logout: token decode, unconditional invalidation, audit event.

use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::audit::{AuditEvent, AuditSink};
use crate::config::AuthConfig;
use crate::directory::Directory;
use crate::error::Error;
use crate::password::verify_password;
use crate::principal::PrincipalKind;
use crate::puzzle::{PuzzleResponse, PuzzleVerifier};
use crate::resolver::{PrincipalResolver, ResolvedPrincipal};
use crate::session::SessionCoordinator;
use crate::store::SessionStore;
use crate::token::{Claims, TokenCodec};

/// The payload a successful login returns.
#[derive(Clone, Debug)]
pub struct LoginGrant {
    pub token: String,
    pub session_id: String,
    pub expires_at: i64,
}

/// The authentication subsystem's front door. Holds injected collaborators;
/// safe to share behind an [`Arc`] across request handlers.
pub struct AuthService {
    config: AuthConfig,
    codec: TokenCodec,
    puzzle: PuzzleVerifier,
    sessions: SessionCoordinator,
    resolver: PrincipalResolver,
    directory: Arc<dyn Directory>,
    audit: Arc<dyn AuditSink>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn SessionStore>,
        directory: Arc<dyn Directory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let codec = TokenCodec::new(config.master_secret().clone());
        let puzzle = PuzzleVerifier::new(config.master_secret());
        let sessions = SessionCoordinator::new(store, config.store_timeout());
        let resolver = PrincipalResolver::new(directory.clone(), config.store_timeout());
        Self {
            config,
            codec,
            puzzle,
            sessions,
            resolver,
            directory,
            audit,
        }
    }

    /// Password login for users, admins, and managers.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedRequest`] for [`PrincipalKind::Device`];
    /// [`Error::AuthenticationFailure`] for unknown email, wrong password,
    /// or a deactivated account (indistinguishable by design);
    /// [`Error::SessionConflict`] while a prior session is live;
    /// [`Error::StoreUnavailable`] on infrastructure failure.
    pub async fn login_human(
        &self,
        kind: PrincipalKind,
        email: &str,
        password: &str,
    ) -> Result<LoginGrant, Error> {
        if !kind.is_human() {
            return Err(Error::MalformedRequest);
        }
        let email = normalize_email(email);

        let record = self
            .fail_closed(self.directory.find_human_by_email(kind, &email))
            .await?;
        let Some(record) = record else {
            debug!(%kind, "login for unknown email");
            return Err(Error::AuthenticationFailure);
        };
        let Some(stored_hash) = record.password_hash.as_deref() else {
            debug!(%kind, id = record.id, "principal has no credential record");
            return Err(Error::AuthenticationFailure);
        };
        if !verify_password(password, stored_hash) {
            debug!(%kind, id = record.id, "password mismatch");
            return Err(Error::AuthenticationFailure);
        }
        if !record.active {
            debug!(%kind, id = record.id, "login for deactivated principal");
            return Err(Error::AuthenticationFailure);
        }

        self.grant(kind, record.id, &email).await
    }

    /// Puzzle login for devices: API key gate first, then the
    /// challenge-response proof, then the session reservation.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedRequest`] if the payload's device id disagrees
    /// with `device_id`; otherwise the kinds documented on
    /// [`PuzzleVerifier::verify`], plus [`Error::SessionConflict`] and
    /// [`Error::StoreUnavailable`].
    pub async fn login_device(
        &self,
        device_id: i64,
        api_key: &str,
        response: &PuzzleResponse,
    ) -> Result<LoginGrant, Error> {
        if response.device_id != device_id {
            debug!(device_id, claimed = response.device_id, "puzzle id mismatch");
            return Err(Error::MalformedRequest);
        }

        let record = self
            .fail_closed(self.directory.find_device(device_id))
            .await?;
        let Some(record) = record else {
            debug!(device_id, "login for unknown device");
            return Err(Error::AuthenticationFailure);
        };
        let Some(stored_api_key) = record.api_key.as_deref() else {
            debug!(device_id, "device has no api key on record");
            return Err(Error::AuthenticationFailure);
        };
        if !bool::from(stored_api_key.as_bytes().ct_eq(api_key.as_bytes())) {
            debug!(device_id, "api key mismatch");
            return Err(Error::AuthenticationFailure);
        }
        if !record.active {
            debug!(device_id, "login for deactivated device");
            return Err(Error::AuthenticationFailure);
        }

        let device_key = record.key.as_deref().ok_or_else(|| {
            debug!(device_id, "device has no encryption key");
            Error::DeviceKeyMissing
        })?;
        self.puzzle.verify(device_key, response)?;

        self.grant(PrincipalKind::Device, device_id, &device_id.to_string())
            .await
    }

    /// Validate a bearer token and resolve its principal.
    ///
    /// # Errors
    ///
    /// [`Error::TokenInvalid`] for malformed/forged/expired tokens;
    /// [`Error::TokenRevoked`] when the embedded session id is no longer
    /// the stored one; [`Error::AuthenticationFailure`] when the principal
    /// is gone or deactivated; [`Error::StoreUnavailable`] on
    /// infrastructure failure.
    pub async fn authenticate(&self, token: &str) -> Result<ResolvedPrincipal, Error> {
        let claims = self.codec.decode(token)?;
        if !self
            .sessions
            .validate(claims.kind, claims.id, &claims.jti)
            .await?
        {
            debug!(kind = %claims.kind, id = claims.id, "token session no longer current");
            return Err(Error::TokenRevoked);
        }
        self.resolver.resolve(&claims).await
    }

    /// Invalidate the token's session. Idempotent: logging out an already
    /// logged-out principal succeeds.
    ///
    /// # Errors
    ///
    /// [`Error::TokenInvalid`] if the token does not decode;
    /// [`Error::StoreUnavailable`] on infrastructure failure.
    pub async fn logout(&self, token: &str) -> Result<(), Error> {
        let claims = self.codec.decode(token)?;
        self.sessions.invalidate(claims.kind, claims.id).await?;
        self.audit
            .record(AuditEvent::logout(
                claims.kind,
                claims.id,
                &claims.sub,
                &claims.jti,
            ))
            .await;
        Ok(())
    }

    /// Decode a token without touching the store. For diagnostics only;
    /// request handling must go through [`authenticate`](Self::authenticate).
    ///
    /// # Errors
    ///
    /// [`Error::TokenInvalid`] on any decode failure.
    pub fn peek_claims(&self, token: &str) -> Result<Claims, Error> {
        self.codec.decode(token)
    }

    /// Shared tail of both login flows: reserve the slot, mint the token,
    /// record the session id, emit the audit event.
    async fn grant(
        &self,
        kind: PrincipalKind,
        id: i64,
        subject: &str,
    ) -> Result<LoginGrant, Error> {
        let ttl_seconds = self.config.ttl_seconds(kind);
        let ttl = Duration::from_secs(ttl_seconds.max(0).unsigned_abs());

        if let Err(err) = self.sessions.try_acquire(kind, id, ttl).await {
            if err == Error::SessionConflict {
                self.audit
                    .record(AuditEvent::login_rejected(kind, id, subject, err.kind()))
                    .await;
            }
            return Err(err);
        }

        let issued = self.codec.issue(kind, id, subject, ttl_seconds)?;
        self.sessions
            .record(kind, id, &issued.claims.jti, ttl)
            .await?;
        self.audit
            .record(AuditEvent::login(kind, id, subject, &issued.claims.jti))
            .await;

        Ok(LoginGrant {
            token: issued.token,
            session_id: issued.claims.jti,
            expires_at: issued.claims.exp,
        })
    }

    async fn fail_closed<T>(
        &self,
        op: impl std::future::Future<Output = anyhow::Result<T>>,
    ) -> Result<T, Error> {
        match tokio::time::timeout(self.config.store_timeout(), op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                tracing::error!("directory lookup failed: {err:#}");
                Err(Error::StoreUnavailable)
            }
            Err(_) => {
                tracing::error!(timeout = ?self.config.store_timeout(), "directory lookup timed out");
                Err(Error::StoreUnavailable)
            }
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
