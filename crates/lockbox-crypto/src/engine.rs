//! CipherEngine: encrypt and decrypt single secret fields.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::aead;
use crate::armor::{self, TokenVersion};
use crate::error::{AuthFailure, CryptoError};
use crate::legacy;
use crate::manager::KeyManager;

/// Associated data bound into every v1 token.
const FIELD_AAD_V1: &[u8] = b"lockbox-field-v1";

/// On-disk form of a secret. Opaque outside this crate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedField(String);

impl EncryptedField {
    /// Wrap a token read back from storage. No validation happens here;
    /// `decrypt_field` is the only interpreter.
    pub fn from_stored(token: String) -> Self {
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedField({} bytes)", self.0.len())
    }
}

#[derive(Clone, Debug)]
pub struct CipherEngine {
    keys: KeyManager,
}

impl CipherEngine {
    pub fn new(keys: KeyManager) -> Self {
        Self { keys }
    }

    pub fn key_manager(&self) -> &KeyManager {
        &self.keys
    }

    /// Encrypt with the current version under a fresh nonce.
    pub async fn encrypt_field(&self, plaintext: &str) -> Result<EncryptedField, CryptoError> {
        let key = self.keys.get_or_create_key().await?;
        let sealed = aead::seal(key, plaintext.as_bytes(), FIELD_AAD_V1)?;
        Ok(EncryptedField(armor::wrap_v1(&sealed)))
    }

    /// Verify and decrypt a stored token. Fails closed with
    /// `AuthenticationFailed` on any tag mismatch or unrecognised format,
    /// including the legacy hash-tagged format.
    pub async fn decrypt_field(&self, token: &EncryptedField) -> Result<String, CryptoError> {
        let armored = armor::parse(token.as_str())?;
        match armored.version {
            TokenVersion::V1 => {
                let sealed = armor::decode_v1(armored.payload)?;
                let key = self.keys.get_or_create_key().await?;
                let plaintext = aead::open(key, &sealed, FIELD_AAD_V1)?;
                into_string(plaintext)
            }
        }
    }

    /// Verify a raw value in the source application's hash-tagged format.
    /// For the import path only: the tag is not keyed by the master key, so
    /// the result must be re-encrypted before it is stored.
    pub fn open_legacy(&self, raw: &str) -> Result<String, CryptoError> {
        legacy::open(raw)
    }
}

fn into_string(bytes: Zeroizing<Vec<u8>>) -> Result<String, CryptoError> {
    std::str::from_utf8(&bytes)
        .map(str::to_owned)
        .map_err(|_| CryptoError::AuthenticationFailed(AuthFailure::InvalidUtf8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyslot::FileKeySlot;
    use tempfile::{tempdir, TempDir};

    fn engine() -> (TempDir, CipherEngine) {
        let dir = tempdir().unwrap();
        let keys = KeyManager::new(FileKeySlot::new(dir.path().join("master.key")));
        (dir, CipherEngine::new(keys))
    }

    #[tokio::test]
    async fn round_trip_edge_inputs() {
        let (_dir, engine) = engine();
        let long = "x".repeat(10_000);
        for p in ["", "Tr0ub4dor&3", "nul\0inside", "пароль 🔐 密码", long.as_str()] {
            let token = engine.encrypt_field(p).await.unwrap();
            assert_eq!(engine.decrypt_field(&token).await.unwrap(), p);
        }
    }

    #[tokio::test]
    async fn same_plaintext_gives_distinct_tokens() {
        let (_dir, engine) = engine();
        let a = engine.encrypt_field("same").await.unwrap();
        let b = engine.encrypt_field("same").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn token_does_not_contain_plaintext() {
        let (_dir, engine) = engine();
        let token = engine.encrypt_field("Tr0ub4dor&3").await.unwrap();
        assert!(!token.as_str().contains("Tr0ub4dor&3"));
        assert!(token.as_str().starts_with("lockbox1:"));
    }

    #[tokio::test]
    async fn every_single_bit_flip_fails_closed() {
        let (_dir, engine) = engine();
        let token = engine.encrypt_field("Tr0ub4dor&3").await.unwrap();
        let bytes = token.as_str().as_bytes().to_vec();
        for i in 0..bytes.len() {
            for bit in 0..8 {
                let mut flipped = bytes.clone();
                flipped[i] ^= 1 << bit;
                let Ok(text) = String::from_utf8(flipped) else {
                    continue;
                };
                let result = engine
                    .decrypt_field(&EncryptedField::from_stored(text))
                    .await;
                assert!(
                    matches!(result, Err(CryptoError::AuthenticationFailed(_))),
                    "byte {i} bit {bit} was accepted"
                );
            }
        }
    }

    #[tokio::test]
    async fn sealed_payload_bit_flips_are_tag_mismatches() {
        let (_dir, engine) = engine();
        let token = engine.encrypt_field("hunter2").await.unwrap();
        let armored = armor::parse(token.as_str()).unwrap();
        let sealed = armor::decode_v1(armored.payload).unwrap();
        for i in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[i] ^= 0x01;
            let forged = EncryptedField::from_stored(armor::wrap_v1(&tampered));
            assert!(matches!(
                engine.decrypt_field(&forged).await,
                Err(CryptoError::AuthenticationFailed(AuthFailure::TagMismatch))
            ));
        }
    }

    #[tokio::test]
    async fn token_from_other_key_is_rejected() {
        let (_d1, first) = engine();
        let (_d2, second) = engine();
        let token = first.encrypt_field("secret").await.unwrap();
        assert!(second.decrypt_field(&token).await.is_err());
    }

    #[tokio::test]
    async fn legacy_values_open_only_on_the_import_path() {
        let (_dir, engine) = engine();
        assert_eq!(
            engine.open_legacy("aHVudGVyMg==.e974d5c29af4b3c8").unwrap(),
            "hunter2"
        );
        assert!(engine.open_legacy("aHVudGVyMg==.e974d5c29af4b3c9").is_err());

        let stored = EncryptedField::from_stored(format!("lockbox0:{}", legacy::encode("forged")));
        assert!(matches!(
            engine.decrypt_field(&stored).await,
            Err(CryptoError::AuthenticationFailed(AuthFailure::UnsupportedVersion))
        ));
    }

    #[tokio::test]
    async fn untagged_text_is_never_passed_through() {
        let (_dir, engine) = engine();
        let raw = EncryptedField::from_stored("plain-password".into());
        assert!(matches!(
            engine.decrypt_field(&raw).await,
            Err(CryptoError::AuthenticationFailed(AuthFailure::Malformed))
        ));
    }
}
