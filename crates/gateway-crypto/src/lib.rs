//! Symmetric authenticated encryption of provider credentials at rest
//! (spec.md §4.5 "Credential encryption", §9 "Credential fan-in").
//!
//! A provider's `credential_blob` column stores the output of
//! [`CredentialCipher::encrypt`]: a random 96-bit nonce followed by the
//! AES-256-GCM ciphertext (including its 128-bit tag). The process-wide key
//! is loaded once at startup from [`CredentialCipher::from_base64_key`] and
//! never touches durable storage in plaintext.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::collections::HashMap;

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("credential key must decode to exactly 32 bytes, got {0}")]
    BadKeyLength(usize),
    #[error("invalid base64 credential key: {0}")]
    BadKeyEncoding(#[from] base64::DecodeError),
    #[error("ciphertext is too short to contain a nonce")]
    CiphertextTooShort,
    #[error("authenticated decryption failed (wrong key or corrupted blob)")]
    DecryptionFailed,
    #[error("credential payload is not valid JSON: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

/// A provider type's decrypted credential mapping (spec.md §4.5: "a JSON
/// string→string mapping specific to the provider type").
pub type CredentialMap = HashMap<String, String>;

/// Holds the process-wide 32-byte credential key and performs envelope
/// encryption/decryption of provider credential blobs.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    /// Loads the key from a base64-encoded 32-byte secret (the deployment's
    /// `GATEWAY_CREDENTIAL_KEY`, per SPEC_FULL.md §6).
    pub fn from_base64_key(encoded: &str) -> Result<Self, CryptoError> {
        let raw = BASE64.decode(encoded.trim())?;
        if raw.len() != 32 {
            return Err(CryptoError::BadKeyLength(raw.len()));
        }
        let key = Key::<Aes256Gcm>::from_slice(&raw);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypts a credential mapping into an opaque blob suitable for the
    /// `providers.credential_blob` column. An empty map is valid input (spec.md
    /// §4.5: "or empty to use ambient credentials") and still round-trips.
    pub fn encrypt(&self, credentials: &CredentialMap) -> Result<Vec<u8>, CryptoError> {
        let plaintext = serde_json::to_vec(credentials)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypts a blob produced by [`Self::encrypt`]. An empty blob decrypts
    /// to an empty credential mapping (ambient-credential providers).
    pub fn decrypt(&self, blob: &[u8]) -> Result<CredentialMap, CryptoError> {
        if blob.is_empty() {
            return Ok(CredentialMap::new());
        }
        if blob.len() < NONCE_LEN {
            return Err(CryptoError::CiphertextTooShort);
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> CredentialCipher {
        let raw = [7u8; 32];
        CredentialCipher::from_base64_key(&BASE64.encode(raw)).unwrap()
    }

    #[test]
    fn round_trips_a_credential_map() {
        let cipher = test_cipher();
        let mut creds = CredentialMap::new();
        creds.insert("api_key".to_string(), "sk-test-123".to_string());

        let blob = cipher.encrypt(&creds).unwrap();
        let decrypted = cipher.decrypt(&blob).unwrap();
        assert_eq!(decrypted, creds);
    }

    #[test]
    fn empty_blob_decrypts_to_empty_map() {
        let cipher = test_cipher();
        let decrypted = cipher.decrypt(&[]).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn empty_map_still_round_trips_through_a_nonempty_blob() {
        let cipher = test_cipher();
        let blob = cipher.encrypt(&CredentialMap::new()).unwrap();
        assert!(!blob.is_empty());
        assert!(cipher.decrypt(&blob).unwrap().is_empty());
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let cipher = test_cipher();
        let mut creds = CredentialMap::new();
        creds.insert("region".to_string(), "us-east-1".to_string());
        let mut blob = cipher.encrypt(&creds).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        assert!(matches!(
            cipher.decrypt(&blob),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn rejects_a_key_of_the_wrong_length() {
        let short = BASE64.encode([1u8; 16]);
        assert!(matches!(
            CredentialCipher::from_base64_key(&short),
            Err(CryptoError::BadKeyLength(16))
        ));
    }
}
