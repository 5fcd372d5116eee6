//! Authenticated encryption for single fields.
//!
//! XChaCha20-Poly1305. Key: 32 bytes. Nonce: 24 bytes (random). Tag: 16 bytes.
//!
//! Sealed layout:
//!   [ nonce (24 bytes) | ciphertext | tag (16 bytes) ]

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng, Payload},
    XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroizing;

use crate::error::{AuthFailure, CryptoError};
use crate::key::MasterKey;

pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

/// Seal `plaintext` under `key`, prepending a fresh random nonce.
pub fn seal(key: &MasterKey, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::Encrypt)?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut AeadOsRng);

    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::Encrypt)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open `nonce || ciphertext || tag`. The tag is checked before any
/// plaintext is released.
pub fn open(key: &MasterKey, sealed: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::AuthenticationFailed(AuthFailure::Malformed));
    }
    let (nonce_bytes, ct) = sealed.split_at(NONCE_LEN);
    let nonce = XNonce::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::AuthenticationFailed(AuthFailure::Malformed))?;

    let plaintext = cipher
        .decrypt(nonce, Payload { msg: ct, aad })
        .map_err(|_| CryptoError::AuthenticationFailed(AuthFailure::TagMismatch))?;

    Ok(Zeroizing::new(plaintext))
}
