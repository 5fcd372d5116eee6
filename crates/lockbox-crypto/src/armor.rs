//! Versioned text armor for encrypted fields.
//!
//! Every token is `lockbox<version>:<payload>`. The version selects the
//! decryption routine; nothing is inferred from the payload.
//!
//! - `lockbox1:` current, payload is unpadded base64url of the sealed AEAD bytes
//!
//! Legacy hash-tagged values are never stored under a prefix. They are opened
//! only on the import path, so `lockbox0:` and any other unknown version are
//! refused here.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::error::{AuthFailure, CryptoError};

const MAGIC_PREFIX: &str = "lockbox";
const V1_MAGIC: &str = "lockbox1:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenVersion {
    /// XChaCha20-Poly1305.
    V1,
}

impl TokenVersion {
    /// Versions `decrypt_field` accepts for stored tokens, newest first.
    pub const ACCEPTED: &'static [TokenVersion] = &[TokenVersion::V1];

    fn magic(self) -> &'static str {
        match self {
            TokenVersion::V1 => V1_MAGIC,
        }
    }
}

/// A token split into its version and still-encoded payload.
#[derive(Debug, PartialEq, Eq)]
pub struct Armored<'a> {
    pub version: TokenVersion,
    pub payload: &'a str,
}

pub fn parse(token: &str) -> Result<Armored<'_>, CryptoError> {
    for version in TokenVersion::ACCEPTED {
        if let Some(payload) = token.strip_prefix(version.magic()) {
            return Ok(Armored {
                version: *version,
                payload,
            });
        }
    }
    if token.starts_with(MAGIC_PREFIX) {
        Err(CryptoError::AuthenticationFailed(AuthFailure::UnsupportedVersion))
    } else {
        Err(CryptoError::AuthenticationFailed(AuthFailure::Malformed))
    }
}

/// Armor sealed v1 bytes.
pub fn wrap_v1(sealed: &[u8]) -> String {
    format!("{}{}", V1_MAGIC, URL_SAFE_NO_PAD.encode(sealed))
}

/// Decode a v1 payload back to sealed bytes.
pub fn decode_v1(payload: &str) -> Result<Vec<u8>, CryptoError> {
    URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| CryptoError::AuthenticationFailed(AuthFailure::Malformed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_is_url_and_shell_safe() {
        let armored = wrap_v1(&[0xFF; 64]);
        assert!(armored.starts_with("lockbox1:"));
        let body = &armored["lockbox1:".len()..];
        assert!(!body.contains('+') && !body.contains('/') && !body.contains('='));
        assert!(!armored.contains(char::is_whitespace));
    }

    #[test]
    fn parse_dispatches_on_prefix() {
        assert_eq!(parse("lockbox1:AAAA").unwrap().version, TokenVersion::V1);
        assert_eq!(parse("lockbox1:AAAA").unwrap().payload, "AAAA");
    }

    #[test]
    fn legacy_marker_is_not_a_stored_version() {
        assert!(matches!(
            parse("lockbox0:aHVudGVyMg==.e974d5c29af4b3c8"),
            Err(CryptoError::AuthenticationFailed(AuthFailure::UnsupportedVersion))
        ));
    }

    #[test]
    fn future_version_is_unsupported() {
        let err = parse("lockbox9:AAAA").unwrap_err();
        assert!(matches!(
            err,
            CryptoError::AuthenticationFailed(AuthFailure::UnsupportedVersion)
        ));
    }

    #[test]
    fn unknown_text_is_malformed() {
        let err = parse("aGVsbG8=.0123456789abcdef").unwrap_err();
        assert!(matches!(
            err,
            CryptoError::AuthenticationFailed(AuthFailure::Malformed)
        ));
    }

    #[test]
    fn bad_base64_is_malformed() {
        assert!(decode_v1("bad$$").is_err());
    }
}
