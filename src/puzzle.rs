//! Device challenge–response puzzle.
//!
//! A device proves possession of its 32-byte key `Kd` without transmitting
//! it. The server holds a deployment-wide key `Ks` derived once from the
//! master secret, so no per-device server state is needed:
//!
//! ```text
//! Ks = SHA-256(master_secret || "puzzle_v1")
//! P  = HMAC-SHA256(Kd || Ks, R)          R: fresh 32-byte device nonce
//! C  = AES-256-CBC(Kd, IV, pad(P))       IV: fresh random 16 bytes
//! ```
//!
//! The device submits `{deviceId, R, C, IV}`; the server recomputes `P`,
//! decrypts `C`, and compares in constant time. Only a holder of `Kd` can
//! both produce `C` and predict `P`.
//!
//! Known gap: nonces are not tracked, so a captured valid `{R, C, IV}`
//! triple can be replayed until the session-conflict window closes.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64ct::{Base64, Encoding};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::error::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Domain separation for the server key derivation. Changing this breaks
/// every provisioned device; it is part of the wire protocol.
const SERVER_KEY_DOMAIN: &[u8] = b"puzzle_v1";

pub const DEVICE_KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 32;
pub const IV_LEN: usize = 16;

/// Current wire schema version.
pub const WIRE_VERSION: u8 = 1;

/// Encrypted identity parameter: AES-256-CBC ciphertext plus its IV.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedParam {
    pub ciphertext: String,
    pub iv: String,
}

/// The puzzle payload a device submits at login. All byte fields are
/// standard base64.
///
/// Legacy deployments used Spanish field names; those are accepted as
/// deprecated aliases for one migration window.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleResponse {
    #[serde(rename = "v", default = "wire_version")]
    pub version: u8,
    #[serde(alias = "id_origen")]
    pub device_id: i64,
    #[serde(alias = "Random dispositivo")]
    pub nonce: String,
    #[serde(alias = "Parametro de identidad cifrado")]
    pub identity_param: EncryptedParam,
}

fn wire_version() -> u8 {
    WIRE_VERSION
}

impl PuzzleResponse {
    /// Parse a puzzle payload, warning when legacy field names are seen.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRequest`] on missing fields or an
    /// unsupported schema version.
    pub fn parse(value: serde_json::Value) -> Result<Self, Error> {
        if value.get("id_origen").is_some() || value.get("Random dispositivo").is_some() {
            warn!("puzzle payload uses deprecated field names; migrate to wire schema v1");
        }
        let response: Self = serde_json::from_value(value).map_err(|err| {
            debug!("unparseable puzzle payload: {err}");
            Error::MalformedRequest
        })?;
        if response.version != WIRE_VERSION {
            debug!(version = response.version, "unsupported puzzle wire version");
            return Err(Error::MalformedRequest);
        }
        Ok(response)
    }
}

/// Server-side verifier for puzzle responses. Stateless: holds only `Ks`.
pub struct PuzzleVerifier {
    server_key: [u8; 32],
}

impl PuzzleVerifier {
    #[must_use]
    pub fn new(master_secret: &SecretString) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(master_secret.expose_secret().as_bytes());
        hasher.update(SERVER_KEY_DOMAIN);
        Self {
            server_key: hasher.finalize().into(),
        }
    }

    /// Verify a puzzle response against the device's registered key.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceKeyMissing`] if `device_key` is not exactly 32 bytes.
    /// - [`Error::MalformedRequest`] on bad base64 or wrong nonce/IV length.
    /// - [`Error::CryptoFailure`] if the ciphertext does not decrypt to a
    ///   validly padded block.
    /// - [`Error::AuthenticationFailure`] if the decrypted parameter does
    ///   not match the recomputed one.
    pub fn verify(&self, device_key: &[u8], response: &PuzzleResponse) -> Result<(), Error> {
        let device_key: &[u8; DEVICE_KEY_LEN] = device_key.try_into().map_err(|_| {
            debug!(device_id = response.device_id, "device key has wrong length");
            Error::DeviceKeyMissing
        })?;

        let nonce = decode_exact(&response.nonce, NONCE_LEN)?;
        let iv = decode_exact(&response.identity_param.iv, IV_LEN)?;
        let ciphertext = Base64::decode_vec(&response.identity_param.ciphertext)
            .map_err(|_| Error::MalformedRequest)?;

        let expected = self.identity_param(device_key, &nonce)?;

        let decrypted = Aes256CbcDec::new_from_slices(device_key, &iv)
            .map_err(|_| Error::CryptoFailure)?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| {
                debug!(device_id = response.device_id, "puzzle ciphertext failed to decrypt");
                Error::CryptoFailure
            })?;

        if expected.as_slice().ct_eq(&decrypted).into() {
            Ok(())
        } else {
            debug!(device_id = response.device_id, "puzzle identity parameter mismatch");
            Err(Error::AuthenticationFailure)
        }
    }

    /// Build a valid response for a device key, as the device firmware
    /// would. Used by provisioning tooling and tests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CryptoFailure`] if the system RNG fails.
    pub fn build_response(
        &self,
        device_id: i64,
        device_key: &[u8; DEVICE_KEY_LEN],
    ) -> Result<PuzzleResponse, Error> {
        let mut nonce = [0u8; NONCE_LEN];
        let mut iv = [0u8; IV_LEN];
        OsRng.try_fill_bytes(&mut nonce).map_err(|_| Error::CryptoFailure)?;
        OsRng.try_fill_bytes(&mut iv).map_err(|_| Error::CryptoFailure)?;

        let param = self.identity_param(device_key, &nonce)?;
        let ciphertext = Aes256CbcEnc::new_from_slices(device_key, &iv)
            .map_err(|_| Error::CryptoFailure)?
            .encrypt_padded_vec_mut::<Pkcs7>(&param);

        Ok(PuzzleResponse {
            version: WIRE_VERSION,
            device_id,
            nonce: Base64::encode_string(&nonce),
            identity_param: EncryptedParam {
                ciphertext: Base64::encode_string(&ciphertext),
                iv: Base64::encode_string(&iv),
            },
        })
    }

    // The MAC key is the raw concatenation Kd || Ks; the deployed protocol
    // fixes this layout. A future wire version should feed both inputs
    // through a KDF instead.
    fn identity_param(
        &self,
        device_key: &[u8; DEVICE_KEY_LEN],
        nonce: &[u8],
    ) -> Result<[u8; 32], Error> {
        let mut mac_key = [0u8; 64];
        mac_key[..32].copy_from_slice(device_key);
        mac_key[32..].copy_from_slice(&self.server_key);
        let mut mac = HmacSha256::new_from_slice(&mac_key).map_err(|_| Error::CryptoFailure)?;
        mac.update(nonce);
        Ok(mac.finalize().into_bytes().into())
    }
}

fn decode_exact(encoded: &str, expected_len: usize) -> Result<Vec<u8>, Error> {
    let bytes = Base64::decode_vec(encoded).map_err(|_| Error::MalformedRequest)?;
    if bytes.len() == expected_len {
        Ok(bytes)
    } else {
        Err(Error::MalformedRequest)
    }
}

#[cfg(test)]
mod tests {
    use super::{EncryptedParam, PuzzleResponse, PuzzleVerifier, WIRE_VERSION};
    use crate::error::Error;
    use base64ct::{Base64, Encoding};
    use serde_json::json;

    fn verifier() -> PuzzleVerifier {
        PuzzleVerifier::new(&"test master secret".to_string().into())
    }

    #[test]
    fn valid_response_verifies() {
        let verifier = verifier();
        let key = [7u8; 32];
        let response = verifier.build_response(3, &key).unwrap();
        assert_eq!(verifier.verify(&key, &response), Ok(()));
    }

    #[test]
    fn short_key_is_rejected_before_any_crypto() {
        let verifier = verifier();
        let key = [7u8; 32];
        let response = verifier.build_response(3, &key).unwrap();
        assert_eq!(
            verifier.verify(&[7u8; 31], &response),
            Err(Error::DeviceKeyMissing)
        );
    }

    #[test]
    fn wrong_key_never_verifies() {
        let verifier = verifier();
        let response = verifier.build_response(3, &[7u8; 32]).unwrap();
        let err = verifier.verify(&[8u8; 32], &response).unwrap_err();
        assert!(matches!(
            err,
            Error::CryptoFailure | Error::AuthenticationFailure
        ));
    }

    #[test]
    fn nonce_bit_flip_fails() {
        let verifier = verifier();
        let key = [1u8; 32];
        let mut response = verifier.build_response(3, &key).unwrap();
        let mut nonce = Base64::decode_vec(&response.nonce).unwrap();
        nonce[0] ^= 0x01;
        response.nonce = Base64::encode_string(&nonce);
        assert_eq!(
            verifier.verify(&key, &response),
            Err(Error::AuthenticationFailure)
        );
    }

    #[test]
    fn ciphertext_bit_flip_fails() {
        let verifier = verifier();
        let key = [1u8; 32];
        let mut response = verifier.build_response(3, &key).unwrap();
        let mut ciphertext = Base64::decode_vec(&response.identity_param.ciphertext).unwrap();
        ciphertext[0] ^= 0x01;
        response.identity_param.ciphertext = Base64::encode_string(&ciphertext);
        let err = verifier.verify(&key, &response).unwrap_err();
        assert!(matches!(
            err,
            Error::CryptoFailure | Error::AuthenticationFailure
        ));
    }

    #[test]
    fn iv_bit_flip_fails() {
        let verifier = verifier();
        let key = [1u8; 32];
        let mut response = verifier.build_response(3, &key).unwrap();
        let mut iv = Base64::decode_vec(&response.identity_param.iv).unwrap();
        iv[0] ^= 0x01;
        response.identity_param.iv = Base64::encode_string(&iv);
        let err = verifier.verify(&key, &response).unwrap_err();
        assert!(matches!(
            err,
            Error::CryptoFailure | Error::AuthenticationFailure
        ));
    }

    #[test]
    fn distinct_master_secrets_do_not_cross_verify() {
        let first = PuzzleVerifier::new(&"one".to_string().into());
        let second = PuzzleVerifier::new(&"two".to_string().into());
        let key = [9u8; 32];
        let response = first.build_response(5, &key).unwrap();
        assert_eq!(
            second.verify(&key, &response),
            Err(Error::AuthenticationFailure)
        );
    }

    #[test]
    fn parse_accepts_v1_field_names() {
        let verifier = verifier();
        let built = verifier.build_response(3, &[2u8; 32]).unwrap();
        let value = serde_json::to_value(&built).unwrap();
        assert!(value.get("deviceId").is_some());
        assert!(value.get("identityParam").is_some());
        let parsed = PuzzleResponse::parse(value).unwrap();
        assert_eq!(parsed, built);
    }

    #[test]
    fn parse_accepts_deprecated_aliases() {
        let verifier = verifier();
        let key = [4u8; 32];
        let built = verifier.build_response(3, &key).unwrap();
        let legacy = json!({
            "id_origen": built.device_id,
            "Random dispositivo": built.nonce,
            "Parametro de identidad cifrado": {
                "ciphertext": built.identity_param.ciphertext,
                "iv": built.identity_param.iv,
            },
        });
        let parsed = PuzzleResponse::parse(legacy).unwrap();
        assert_eq!(parsed.version, WIRE_VERSION);
        assert_eq!(verifier.verify(&key, &parsed), Ok(()));
    }

    #[test]
    fn parse_rejects_missing_fields_and_bad_version() {
        assert_eq!(
            PuzzleResponse::parse(json!({ "deviceId": 1 })),
            Err(Error::MalformedRequest)
        );
        let response = PuzzleResponse {
            version: 2,
            device_id: 1,
            nonce: String::new(),
            identity_param: EncryptedParam {
                ciphertext: String::new(),
                iv: String::new(),
            },
        };
        assert_eq!(
            PuzzleResponse::parse(serde_json::to_value(response).unwrap()),
            Err(Error::MalformedRequest)
        );
    }

    #[test]
    fn malformed_base64_is_a_malformed_request() {
        let verifier = verifier();
        let response = PuzzleResponse {
            version: WIRE_VERSION,
            device_id: 1,
            nonce: "!!not base64!!".to_string(),
            identity_param: EncryptedParam {
                ciphertext: String::new(),
                iv: String::new(),
            },
        };
        assert_eq!(
            verifier.verify(&[0u8; 32], &response),
            Err(Error::MalformedRequest)
        );
    }
}
