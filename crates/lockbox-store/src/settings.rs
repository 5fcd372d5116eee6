//! `lockbox.json`: per-install settings kept in the data directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lockbox_crypto::{FileKeySlot, KeySlot, KeyringKeySlot};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::access::DEFAULT_AUTO_LOCK_MINUTES;
use crate::error::StoreError;
use crate::migration::LegacySecretFormat;
use crate::paths::{write_atomic, MASTER_KEY_FILE, SETTINGS_FILE};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyBackend {
    /// `master.key` in the data directory.
    #[default]
    File,
    /// OS credential store.
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacySettings {
    /// Relative paths resolve against the data directory.
    pub file: PathBuf,
    pub secret_format: LegacySecretFormat,
}

impl Default for LegacySettings {
    fn default() -> Self {
        Self {
            file: PathBuf::from("legacy-storage.json"),
            secret_format: LegacySecretFormat::HashTagged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub key_backend: KeyBackend,
    pub database_file: PathBuf,
    /// 0 disables auto-lock.
    pub auto_lock_minutes: u64,
    pub legacy: LegacySettings,
    /// `tracing` filter directive; `RUST_LOG` wins when set.
    pub log_filter: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            key_backend: KeyBackend::File,
            database_file: PathBuf::from("lockbox.db"),
            auto_lock_minutes: DEFAULT_AUTO_LOCK_MINUTES,
            legacy: LegacySettings::default(),
            log_filter: None,
        }
    }
}

impl Settings {
    /// Read `lockbox.json` from `data_dir`, falling back to defaults when the
    /// file does not exist.
    pub fn load(data_dir: &Path) -> Result<Self, StoreError> {
        let path = data_dir.join(SETTINGS_FILE);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, data_dir: &Path) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(self)?;
        write_atomic(&data_dir.join(SETTINGS_FILE), &body)
    }

    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.database_file)
    }

    pub fn legacy_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.legacy.file)
    }

    pub fn key_slot(&self, data_dir: &Path) -> Arc<dyn KeySlot> {
        match self.key_backend {
            KeyBackend::File => Arc::new(FileKeySlot::new(data_dir.join(MASTER_KEY_FILE))),
            KeyBackend::Keyring => Arc::new(KeyringKeySlot::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.auto_lock_minutes, 5);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{ "key_backend": "keyring", "legacy": { "secret_format": "plaintext" } }"#,
        )
        .unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert_eq!(settings.key_backend, KeyBackend::Keyring);
        assert_eq!(settings.legacy.secret_format, LegacySecretFormat::Plaintext);
        assert_eq!(settings.legacy.file, PathBuf::from("legacy-storage.json"));
        assert_eq!(settings.database_file, PathBuf::from("lockbox.db"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let settings = Settings {
            auto_lock_minutes: 0,
            log_filter: Some("lockbox_store=debug".into()),
            ..Settings::default()
        };
        settings.save(dir.path()).unwrap();
        assert_eq!(Settings::load(dir.path()).unwrap(), settings);
    }

    #[cfg(unix)]
    #[test]
    fn absolute_paths_are_kept() {
        let settings = Settings {
            database_file: PathBuf::from("/srv/lockbox/vault.db"),
            ..Settings::default()
        };
        assert_eq!(
            settings.database_path(Path::new("/home/me/.local/share/lockbox")),
            PathBuf::from("/srv/lockbox/vault.db")
        );
    }
}
