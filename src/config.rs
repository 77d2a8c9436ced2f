//! Subsystem configuration: token lifetimes, store timeout, master secret.

use secrecy::SecretString;
use std::time::Duration;

use crate::principal::PrincipalKind;

/// Interactive human sessions expire after an hour.
const DEFAULT_HUMAN_TTL_SECONDS: i64 = 60 * 60;
/// Unattended devices long-poll; they get a full day per login.
const DEFAULT_DEVICE_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the authentication subsystem.
///
/// The master secret feeds both token signing and the puzzle server key;
/// it is held behind [`SecretString`] so it never shows up in debug output.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    master_secret: SecretString,
    human_ttl_seconds: i64,
    device_ttl_seconds: i64,
    store_timeout: Duration,
}

impl AuthConfig {
    #[must_use]
    pub fn new(master_secret: SecretString) -> Self {
        Self {
            master_secret,
            human_ttl_seconds: DEFAULT_HUMAN_TTL_SECONDS,
            device_ttl_seconds: DEFAULT_DEVICE_TTL_SECONDS,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_human_ttl_seconds(mut self, seconds: i64) -> Self {
        self.human_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_device_ttl_seconds(mut self, seconds: i64) -> Self {
        self.device_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn master_secret(&self) -> &SecretString {
        &self.master_secret
    }

    /// Token and session lifetime for the given principal kind.
    #[must_use]
    pub fn ttl_seconds(&self, kind: PrincipalKind) -> i64 {
        if kind.is_human() {
            self.human_ttl_seconds
        } else {
            self.device_ttl_seconds
        }
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }
}
