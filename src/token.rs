//! Signed-token issuance and validation.
//!
//! Compact HS256 tokens carrying the principal identity and a per-login
//! session id (`jti`). The codec is deliberately store-blind: whether the
//! `jti` is still the live session is the coordinator's call, which keeps
//! this module side-effect free and independently testable.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use tracing::debug;
use uuid::Uuid;

use crate::error::Error;
use crate::principal::PrincipalKind;

type HmacSha256 = Hmac<Sha256>;

const ALG: &str = "HS256";
const TYP: &str = "JWT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Header {
    alg: String,
    typ: String,
}

/// Signature-protected claim set.
///
/// Field names match the deployed token format: `type` is the principal
/// kind and `jti` is the session identifier mirrored in the session store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "type")]
    pub kind: PrincipalKind,
    pub id: i64,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly issued token together with its decoded claims.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Issues and validates HS256 tokens under a single symmetric key.
pub struct TokenCodec {
    key: SecretString,
}

impl TokenCodec {
    #[must_use]
    pub fn new(key: SecretString) -> Self {
        Self { key }
    }

    /// Issue a token with a fresh random session id.
    ///
    /// A negative `ttl_seconds` produces an already-expired token, which is
    /// occasionally useful for exercising expiry handling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CryptoFailure`] if claims cannot be encoded.
    pub fn issue(
        &self,
        kind: PrincipalKind,
        id: i64,
        subject: &str,
        ttl_seconds: i64,
    ) -> Result<IssuedToken, Error> {
        let now = unix_now();
        let claims = Claims {
            sub: subject.to_string(),
            kind,
            id,
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + ttl_seconds,
        };
        let header = Header {
            alg: ALG.to_string(),
            typ: TYP.to_string(),
        };
        let signing_input = format!("{}.{}", encode_json(&header)?, encode_json(&claims)?);
        let signature = self.sign(signing_input.as_bytes());
        let token = format!(
            "{signing_input}.{}",
            Base64UrlUnpadded::encode_string(&signature)
        );
        Ok(IssuedToken { token, claims })
    }

    /// Verify structure, signature, and expiry, returning the claims.
    ///
    /// # Errors
    ///
    /// Every failure collapses to [`Error::TokenInvalid`]; the specific
    /// cause is logged at debug level only.
    pub fn decode(&self, token: &str) -> Result<Claims, Error> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            debug!("token does not have three segments");
            return Err(Error::TokenInvalid);
        };

        let header: Header = decode_json(header_b64)?;
        if header.alg != ALG || header.typ != TYP {
            debug!(alg = %header.alg, "unsupported token header");
            return Err(Error::TokenInvalid);
        }

        let signature =
            Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| Error::TokenInvalid)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        let expected = self.sign(signing_input.as_bytes());
        if !bool::from(expected.ct_eq(&signature)) {
            debug!("token signature mismatch");
            return Err(Error::TokenInvalid);
        }

        let claims: Claims = decode_json(claims_b64)?;
        if claims.exp <= unix_now() {
            debug!(jti = %claims.jti, "token expired");
            return Err(Error::TokenInvalid);
        }
        Ok(claims)
    }

    fn sign(&self, input: &[u8]) -> Vec<u8> {
        // HMAC accepts keys of any length; this cannot fail.
        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret().as_bytes())
            .unwrap_or_else(|_| unreachable!());
        mac.update(input);
        mac.finalize().into_bytes().to_vec()
    }
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value).map_err(|_| Error::CryptoFailure)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn decode_json<T: for<'de> Deserialize<'de>>(encoded: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(encoded).map_err(|_| Error::TokenInvalid)?;
    serde_json::from_slice(&bytes).map_err(|_| Error::TokenInvalid)
}

/// Current unix time in seconds.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}
