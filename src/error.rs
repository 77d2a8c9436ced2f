//! Error taxonomy for the authentication subsystem.
//!
//! Every fallible operation returns exactly one of these kinds. Messages are
//! intentionally generic: internal detail (which lookup failed, why a
//! decrypt rejected) goes to logs and the audit sink, never to the caller.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Bad credentials, failed puzzle, or a principal that no longer exists
    /// or is deactivated. Deliberately indistinguishable cases.
    #[error("authentication failed")]
    AuthenticationFailure,
    /// An unexpired session already exists for this principal. The only
    /// expected business rejection; callers should suggest logging out first.
    #[error("an active session already exists for this principal")]
    SessionConflict,
    /// Malformed, forged, or expired token.
    #[error("invalid or expired token")]
    TokenInvalid,
    /// Token decodes fine but its session id is no longer the stored one.
    #[error("session is no longer active")]
    TokenRevoked,
    /// Device has no provisioned key, or the key is not exactly 32 bytes.
    #[error("device key is missing or unusable")]
    DeviceKeyMissing,
    /// Decrypt or padding failure while checking a puzzle response.
    #[error("cryptographic verification failed")]
    CryptoFailure,
    /// Session store or directory unreachable or timed out. Always a hard
    /// failure of the operation; never degrades to "check skipped".
    #[error("session store unavailable")]
    StoreUnavailable,
    /// Required fields missing or structurally invalid input.
    #[error("malformed request")]
    MalformedRequest,
}

impl Error {
    /// Stable identifier used in logs and audit events.
    #[must_use]
    pub fn kind(self) -> &'static str {
        match self {
            Self::AuthenticationFailure => "authentication_failure",
            Self::SessionConflict => "session_conflict",
            Self::TokenInvalid => "token_invalid",
            Self::TokenRevoked => "token_revoked",
            Self::DeviceKeyMissing => "device_key_missing",
            Self::CryptoFailure => "crypto_failure",
            Self::StoreUnavailable => "store_unavailable",
            Self::MalformedRequest => "malformed_request",
        }
    }
}
