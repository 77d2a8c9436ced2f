//! Argon2id password verification for human principals.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::warn;

use crate::error::Error;

// Parameters carried over from the deployed credential records: 100 MiB
// memory, 2 iterations, 8 lanes. Stored hashes embed their own parameters,
// so verification keeps working if these change.
const MEMORY_KIB: u32 = 100 * 1024;
const ITERATIONS: u32 = 2;
const PARALLELISM: u32 = 8;

fn hasher() -> Result<Argon2<'static>, Error> {
    let params = Params::new(MEMORY_KIB, ITERATIONS, PARALLELISM, None).map_err(|err| {
        warn!("invalid argon2 parameters: {err}");
        Error::CryptoFailure
    })?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password into a PHC string for storage.
///
/// Provisioning-side helper; the verifier below is the hot path.
///
/// # Errors
///
/// Returns [`Error::CryptoFailure`] if hashing fails.
pub fn hash_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| {
            warn!("password hashing failed: {err}");
            Error::CryptoFailure
        })?;
    Ok(hash.to_string())
}

/// Check a submitted password against a stored PHC hash.
///
/// Any parse or verification failure is `false`; the distinction is logged,
/// never surfaced.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("stored password hash is unparseable: {err}");
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
