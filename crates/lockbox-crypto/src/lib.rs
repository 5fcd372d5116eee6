//! lockbox-crypto: master key management and field-level encryption.
//!
//! # Design principles
//! - No custom crypto; the AEAD is XChaCha20-Poly1305 from `chacha20poly1305`.
//! - The master key is generated once from the OS RNG and persisted through a
//!   [`keyslot::KeySlot`]. There is no derived or hardcoded fallback key.
//! - Every encrypted field is a versioned token; decryption dispatches on the
//!   version prefix and fails closed.
//!
//! # Module layout
//! - `key`: `MasterKey` newtype (zeroized on drop)
//! - `keyslot`: file and OS keyring persistence backends
//! - `manager`: `KeyManager`, single-flight get-or-create
//! - `aead`: seal/open helpers
//! - `armor`: `lockbox<version>:` token framing
//! - `legacy`: verification of the source application's hash-tagged values
//! - `engine`: `CipherEngine` and `EncryptedField`
//! - `generator`: CSPRNG password generator and strength score
//! - `error`: `CryptoError`

pub mod aead;
pub mod armor;
pub mod engine;
pub mod error;
pub mod generator;
pub mod key;
pub mod keyslot;
pub mod legacy;
pub mod manager;

pub use engine::{CipherEngine, EncryptedField};
pub use error::{AuthFailure, CryptoError};
pub use key::MasterKey;
pub use keyslot::{FileKeySlot, KeySlot, KeyringKeySlot};
pub use manager::KeyManager;
