//! # Vigilo (Authentication & Single-Session Authority)
//!
//! `vigilo` authenticates four principal kinds (users, admins, managers,
//! and unattended devices) and enforces that each principal holds at most
//! one live session at a time.
//!
//! ## Authentication
//!
//! Humans present a password checked against an Argon2id hash. Devices
//! prove possession of a provisioned 32-byte symmetric key through a
//! challenge–response puzzle ([`puzzle`]); the key itself never crosses the
//! wire.
//!
//! ## Sessions
//!
//! Every login mints a signed token ([`token`]) carrying a fresh session
//! id. The session store holds the one live session id per principal under
//! `session:{kind}:{id}`; a token is only honored while its embedded id
//! matches the stored one, which is what makes logout effective for
//! otherwise stateless tokens. Login reservations use the store's atomic
//! set-if-absent, so concurrent logins for one principal cannot both
//! succeed ([`session`]).
//!
//! ## Failure policy
//!
//! Store or directory trouble always fails the operation closed
//! ([`Error::StoreUnavailable`]); authentication rejections are opaque by
//! kind so callers cannot enumerate accounts.

pub mod audit;
pub mod config;
pub mod directory;
pub mod error;
pub mod password;
pub mod principal;
pub mod puzzle;
pub mod resolver;
pub mod service;
pub mod session;
pub mod store;
pub mod token;

pub use audit::{AuditEvent, AuditKind, AuditSink, MemorySink, TracingSink};
pub use config::AuthConfig;
pub use directory::{DeviceRecord, Directory, HumanRecord, PgDirectory};
pub use error::Error;
pub use principal::PrincipalKind;
pub use puzzle::{PuzzleResponse, PuzzleVerifier};
pub use resolver::{PrincipalResolver, ResolvedPrincipal};
pub use service::{AuthService, LoginGrant};
pub use session::SessionCoordinator;
pub use store::{MemoryStore, RedisStore, SessionStore};
pub use token::{Claims, TokenCodec};
