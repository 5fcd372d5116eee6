use std::fmt;

use thiserror::Error;

/// Why a token was refused. Every variant is reported as
/// [`CryptoError::AuthenticationFailed`]; the reason is diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// The AEAD tag (or the legacy hash tag) did not verify.
    TagMismatch,
    /// The token names a format version this build does not accept.
    UnsupportedVersion,
    /// Prefix, encoding or length is not a valid token.
    Malformed,
    /// The tag verified but the plaintext is not UTF-8.
    InvalidUtf8,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthFailure::TagMismatch => "tag mismatch (possible tampering)",
            AuthFailure::UnsupportedVersion => "unsupported token version",
            AuthFailure::Malformed => "malformed token",
            AuthFailure::InvalidUtf8 => "plaintext is not valid UTF-8",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Master key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(AuthFailure),

    #[error("AEAD encryption failed")]
    Encrypt,

    #[error("Password generator: {0}")]
    Generator(String),
}

impl CryptoError {
    pub(crate) fn key_unavailable(msg: impl fmt::Display) -> Self {
        CryptoError::KeyUnavailable(msg.to_string())
    }
}
