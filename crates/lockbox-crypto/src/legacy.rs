//! Verification path for the source application's hash-tagged secrets.
//!
//! Layout: `base64(plaintext) "." hex(sha256(APP_CONSTANT || plaintext))[..16]`.
//! The base64 body carries one byte per UTF-16 code unit (latin-1), which is
//! what the source produced. The tag is keyed only by a constant compiled into
//! the source application, so it detects tampering and corruption but gives no
//! confidentiality. Values are accepted here only to be re-encrypted.

use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{AuthFailure, CryptoError};

const APP_CONSTANT: &str = "password-manager-key-2024";
const TAG_HEX_LEN: usize = 16;

fn tag_for(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(APP_CONSTANT.as_bytes());
    hasher.update(plaintext.as_bytes());
    let mut tag = hex::encode(hasher.finalize());
    tag.truncate(TAG_HEX_LEN);
    tag
}

/// Verify and decode a raw hash-tagged value.
pub fn open(raw: &str) -> Result<String, CryptoError> {
    let (body, tag) = raw
        .split_once('.')
        .ok_or(CryptoError::AuthenticationFailed(AuthFailure::Malformed))?;
    if tag.len() != TAG_HEX_LEN {
        return Err(CryptoError::AuthenticationFailed(AuthFailure::Malformed));
    }
    let bytes = Zeroizing::new(
        general_purpose::STANDARD
            .decode(body)
            .map_err(|_| CryptoError::AuthenticationFailed(AuthFailure::Malformed))?,
    );
    let plaintext: String = bytes.iter().map(|&b| char::from(b)).collect();

    let expected = tag_for(&plaintext);
    if bool::from(expected.as_bytes().ct_eq(tag.as_bytes())) {
        Ok(plaintext)
    } else {
        Err(CryptoError::AuthenticationFailed(AuthFailure::TagMismatch))
    }
}

/// Produce a value in the source application's format. Only latin-1 input
/// round-trips, as in the source.
pub fn encode(plaintext: &str) -> String {
    let bytes: Vec<u8> = plaintext.chars().map(|c| c as u32 as u8).collect();
    format!("{}.{}", general_purpose::STANDARD.encode(bytes), tag_for(plaintext))
}
