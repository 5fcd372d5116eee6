//! Durable homes for the master key.
//!
//! A slot only stores and loads. Generation, caching and the single-flight
//! guard live in [`crate::manager::KeyManager`].

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use keyring::Entry;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::key::MasterKey;

const KEYRING_SERVICE: &str = "lockbox";
const KEYRING_ENTRY: &str = "master-key";

pub trait KeySlot: Send + Sync + 'static {
    /// Read the persisted key, `None` when the slot is empty.
    fn load(&self) -> Result<Option<MasterKey>, CryptoError>;

    /// Persist `key` unless a key is already there. Returns whichever key
    /// the slot holds afterwards, so racing creators agree on one value.
    fn store_if_absent(&self, key: &MasterKey) -> Result<MasterKey, CryptoError>;

    fn describe(&self) -> String;
}

// ── File ─────────────────────────────────────────────────────────────────────

/// Hex-encoded key in a single file, mode 0600 on unix.
#[derive(Debug, Clone)]
pub struct FileKeySlot {
    path: PathBuf,
}

impl FileKeySlot {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeySlot for FileKeySlot {
    fn load(&self) -> Result<Option<MasterKey>, CryptoError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(s) => Zeroizing::new(s),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CryptoError::key_unavailable(format!(
                    "read {}: {e}",
                    self.path.display()
                )))
            }
        };
        let bytes = Zeroizing::new(hex::decode(contents.trim()).map_err(|e| {
            CryptoError::key_unavailable(format!("key file {} is corrupt: {e}", self.path.display()))
        })?);
        MasterKey::from_slice(&bytes).map(Some)
    }

    fn store_if_absent(&self, key: &MasterKey) -> Result<MasterKey, CryptoError> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .map_err(|e| CryptoError::key_unavailable(format!("create {}: {e}", parent.display())))?;

        let mut staged = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| CryptoError::key_unavailable(format!("stage key file: {e}")))?;
        restrict_permissions(staged.path());
        let encoded = Zeroizing::new(hex::encode(key.as_bytes()));
        staged
            .write_all(encoded.as_bytes())
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|e| CryptoError::key_unavailable(format!("write key file: {e}")))?;

        match staged.persist_noclobber(&self.path) {
            Ok(_) => {
                debug!(path = %self.path.display(), "master key persisted");
                Ok(key.clone())
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %self.path.display(), "lost key creation race, reading winner");
                self.load()?.ok_or_else(|| {
                    CryptoError::key_unavailable("key file disappeared after creation race")
                })
            }
            Err(e) => Err(CryptoError::key_unavailable(format!(
                "persist {}: {}",
                self.path.display(),
                e.error
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!("cannot restrict permissions on {}: {}", path.display(), e);
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

// ── OS keyring ───────────────────────────────────────────────────────────────

/// Base64 key in the OS credential store.
///
/// Check-then-set is not atomic across processes; the single-writer-per-device
/// model makes the in-process single-flight guard sufficient.
#[derive(Debug, Clone)]
pub struct KeyringKeySlot {
    service: String,
    entry: String,
}

impl KeyringKeySlot {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
            entry: KEYRING_ENTRY.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry, CryptoError> {
        Entry::new(&self.service, &self.entry)
            .map_err(|e| CryptoError::key_unavailable(format!("keyring init: {e}")))
    }
}

impl Default for KeyringKeySlot {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySlot for KeyringKeySlot {
    fn load(&self) -> Result<Option<MasterKey>, CryptoError> {
        let encoded = match self.entry()?.get_password() {
            Ok(s) => Zeroizing::new(s),
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(CryptoError::key_unavailable(format!("load key: {e}"))),
        };
        let bytes = Zeroizing::new(
            general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| CryptoError::key_unavailable(format!("decode key: {e}")))?,
        );
        MasterKey::from_slice(&bytes).map(Some)
    }

    fn store_if_absent(&self, key: &MasterKey) -> Result<MasterKey, CryptoError> {
        if let Some(existing) = self.load()? {
            return Ok(existing);
        }
        let encoded = Zeroizing::new(general_purpose::STANDARD.encode(key.as_bytes()));
        self.entry()?
            .set_password(&encoded)
            .map_err(|e| CryptoError::key_unavailable(format!("store key: {e}")))?;
        Ok(key.clone())
    }

    fn describe(&self) -> String {
        format!("keyring:{}/{}", self.service, self.entry)
    }
}
